use serde::{Deserialize, Serialize};

/// Prefix carried by every node-level failure so callers can tell a rejected
/// transaction apart from a user decline.
pub const BROADCAST_ERROR_PREFIX: &str = "TEZOS_OPERATION";

/// Errors surfaced to a DApp. This is the only error type that crosses the
/// background -> content script -> page boundary, so it serializes as
/// `{ "code": ..., "message": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DAppError {
    #[error("INVALID_PARAMS")]
    InvalidParams,

    #[error("NOT_GRANTED")]
    NotGranted,

    #[error("NOT_FOUND")]
    NotFound,

    #[serde(rename = "TEZOS_OPERATION")]
    #[error("TEZOS_OPERATION: {0}")]
    Broadcast(String),

    #[serde(rename = "UNKNOWN_ERROR")]
    #[error("UNKNOWN_ERROR: {0}")]
    Unknown(String),
}

impl DAppError {
    /// Wire code, as seen by the page.
    pub fn code(&self) -> &'static str {
        match self {
            DAppError::InvalidParams => "INVALID_PARAMS",
            DAppError::NotGranted => "NOT_GRANTED",
            DAppError::NotFound => "NOT_FOUND",
            DAppError::Broadcast(_) => BROADCAST_ERROR_PREFIX,
            DAppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Extra detail for the page, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            DAppError::Broadcast(msg) | DAppError::Unknown(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        DAppError::Unknown(msg.into())
    }
}

/// Message channel failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntercomError {
    #[error("port disconnected")]
    Disconnected,

    #[error("no handler accepted the request")]
    Unhandled,

    #[error("frame serialization failed: {0}")]
    Serialization(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Remote(#[from] DAppError),
}

impl From<serde_json::Error> for IntercomError {
    fn from(e: serde_json::Error) -> Self {
        IntercomError::Serialization(e.to_string())
    }
}

impl From<IntercomError> for DAppError {
    fn from(e: IntercomError) -> Self {
        match e {
            IntercomError::Remote(inner) => inner,
            other => DAppError::Unknown(other.to_string()),
        }
    }
}

/// Permission store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt permission record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for DAppError {
    fn from(e: StoreError) -> Self {
        DAppError::Unknown(e.to_string())
    }
}

/// Failures reported by the key-management collaborator.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("wallet is locked")]
    Locked,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The node rejected or failed to process the operation.
    #[error("{0}")]
    Node(String),

    #[error("{0}")]
    Other(String),
}

impl From<VaultError> for DAppError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Node(msg) => DAppError::Broadcast(msg),
            other => DAppError::Unknown(other.to_string()),
        }
    }
}

/// Browser windowing failures.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("failed to create popup window: {0}")]
    Create(String),

    #[error("failed to remove window {0}: {1}")]
    Remove(i64, String),
}

impl From<WindowError> for DAppError {
    fn from(e: WindowError) -> Self {
        DAppError::Unknown(e.to_string())
    }
}
