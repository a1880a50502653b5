use crate::error::{DAppError, IntercomError};
use crate::types::{ExtensionNotification, ExtensionRequest, ExtensionResponse};
use serde::{Deserialize, Serialize};

/// Unit of transfer on a port. Requests carry a per-port `req_id` that the
/// reply echoes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Request {
        req_id: u64,
        request: ExtensionRequest,
    },
    Response {
        req_id: u64,
        response: ExtensionResponse,
    },
    Error {
        req_id: u64,
        error: DAppError,
    },
    Notify {
        notification: ExtensionNotification,
    },
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, IntercomError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IntercomError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
