/*!
External collaborators of the background context.

Everything the bridge does not own itself (persistence, key management, the
Tezos node, browser windows) is reached through these traits. The wasm glue
implements them on top of browser APIs; tests use in-memory mocks.
*/
use crate::error::{StoreError, VaultError, WindowError};
use crate::types::DAppSession;
use async_trait::async_trait;
use futures::stream::LocalBoxStream;
use serde_json::Value;

pub type WindowId = i64;

/// Position and size of a browser window, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

/// Everything needed to open the confirmation popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupSpec {
    pub url: String,
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Per-origin permission records.
#[async_trait(?Send)]
pub trait PermissionStore {
    async fn get(&self, origin: &str) -> Result<Option<DAppSession>, StoreError>;

    /// Must only return once the record is durable.
    async fn set(&self, origin: &str, session: DAppSession) -> Result<(), StoreError>;

    async fn remove(&self, origins: &[String]) -> Result<(), StoreError>;

    async fn all(&self) -> Result<Vec<(String, DAppSession)>, StoreError>;
}

/// Key management. Never exposes key material, only results.
#[async_trait(?Send)]
pub trait Vault {
    /// Forges, signs and injects `op_params` from `source_pkh`; returns the
    /// operation hash.
    async fn send_operations(
        &self,
        source_pkh: &str,
        rpc: &str,
        op_params: &[Value],
    ) -> Result<String, VaultError>;

    /// Signs hex `bytes` and returns a prefixed signature.
    async fn sign(&self, source_pkh: &str, bytes: &str) -> Result<String, VaultError>;
}

#[async_trait(?Send)]
pub trait NodeClient {
    /// Injects an already signed operation; returns its hash.
    async fn inject_operation(
        &self,
        rpc: &str,
        signed_op_bytes: &str,
    ) -> Result<String, VaultError>;
}

#[async_trait(?Send)]
pub trait WindowManager {
    /// Bounds of the window the user last interacted with, if known.
    async fn last_focused_bounds(&self) -> Option<WindowBounds>;

    async fn create_popup(&self, spec: &PopupSpec) -> Result<WindowId, WindowError>;

    async fn remove(&self, id: WindowId) -> Result<(), WindowError>;

    /// Ids of windows as they get closed. Dropping the stream unsubscribes.
    fn subscribe_removed(&self) -> LocalBoxStream<'static, WindowId>;
}

#[async_trait(?Send)]
pub trait OperationParser {
    /// Best-effort decode of forged operation bytes (hex, no watermark).
    /// `None` when the bytes are not a valid operation group.
    async fn parse_forged(&self, bytes: &str, rpc: &str) -> Option<Value>;
}

/// Beacon peer-to-peer encryption, keyed by the page origin.
#[async_trait(?Send)]
pub trait BeaconCrypto {
    async fn decrypt(&self, origin: &str, payload: &str) -> Result<String, String>;

    async fn encrypt(&self, origin: &str, payload: &str) -> Result<String, String>;
}
