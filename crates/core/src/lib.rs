//! Platform-agnostic core of the Temple DApp bridge.
//!
//! Pages talk to the wallet through the content script ([`content`]), which
//! forwards requests over the [`intercom`] channel to the background
//! ([`background`]). Requests needing the user open a confirmation popup
//! that answers through [`popup`]. Browser specifics live in the extension
//! crate; everything here runs natively under tokio for tests.

pub mod background;
pub mod config;
pub mod content;
pub mod error;
pub mod intercom;
pub mod popup;
pub mod telemetry;
pub mod timer;
pub mod types;

pub use background::{BackgroundContext, Collaborators};
pub use config::BridgeConfig;
pub use content::{ContentScriptRouter, PageMessageEvent, PageWindow};
pub use error::{DAppError, IntercomError};
pub use intercom::{IntercomClient, IntercomServer, Subscription};
pub use popup::ConfirmationClient;
