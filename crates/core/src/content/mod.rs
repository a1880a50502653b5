//! Content script side: filters page messages, forwards them to the
//! background over the intercom and posts replies to the page origin.

pub mod page;
pub mod router;

pub use page::PageMessage;
pub use router::{ContentScriptRouter, PageMessageEvent, PageWindow};
