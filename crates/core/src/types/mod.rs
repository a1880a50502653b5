pub mod address;
pub mod confirmation;
pub mod dapp;
pub mod messages;
pub mod network;
pub mod session;

pub use address::{is_address_valid, is_hex_payload};
pub use confirmation::{ConfirmationDecision, ConfirmationPayload, SignPreview};
pub use dapp::{AppMetadata, DAppPermission, DAppRequest, DAppResponse};
pub use messages::{ChainType, ExtensionNotification, ExtensionRequest, ExtensionResponse};
pub use network::Network;
pub use session::DAppSession;
