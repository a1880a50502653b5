//! Request/response channel between the extension contexts.
//!
//! The background hosts an [`IntercomServer`]; content scripts and popups
//! hold an [`IntercomClient`]. Frames travel as JSON bytes over
//! [`PortEnd`]s so the same code runs over browser runtime ports and
//! in-process channels.

pub mod client;
pub mod frame;
pub mod port;
pub mod server;
pub mod subscription;

pub use client::IntercomClient;
pub use frame::Frame;
pub use port::{channel, PortEnd, PortId, PortSender};
pub use server::{IntercomServer, RequestHandler};
pub use subscription::Subscription;
