use super::network::Network;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
}

/// Requests a page can make through the native (non-Beacon) protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DAppRequest {
    GetCurrentPermissionRequest,

    #[serde(rename_all = "camelCase")]
    PermissionRequest {
        network: Network,
        app_meta: AppMetadata,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        force: Option<bool>,
    },

    #[serde(rename_all = "camelCase")]
    OperationRequest {
        source_pkh: String,
        op_params: Vec<Value>,
    },

    #[serde(rename_all = "camelCase")]
    SignRequest { source_pkh: String, payload: String },

    #[serde(rename_all = "camelCase")]
    BroadcastRequest { signed_op_bytes: String },

    DisconnectRequest,
}

impl DAppRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            DAppRequest::GetCurrentPermissionRequest => "get_current_permission",
            DAppRequest::PermissionRequest { .. } => "permission",
            DAppRequest::OperationRequest { .. } => "operation",
            DAppRequest::SignRequest { .. } => "sign",
            DAppRequest::BroadcastRequest { .. } => "broadcast",
            DAppRequest::DisconnectRequest => "disconnect",
        }
    }
}

/// What the page gets back for an existing or new grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppPermission {
    pub pkh: String,
    pub public_key: String,
    pub rpc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DAppResponse {
    GetCurrentPermissionResponse { permission: Option<DAppPermission> },

    #[serde(rename_all = "camelCase")]
    PermissionResponse {
        pkh: String,
        public_key: String,
        rpc: String,
    },

    #[serde(rename_all = "camelCase")]
    OperationResponse { op_hash: String },

    SignResponse { signature: String },

    #[serde(rename_all = "camelCase")]
    BroadcastResponse { op_hash: String },

    DisconnectResponse,
}

impl From<DAppPermission> for DAppResponse {
    fn from(p: DAppPermission) -> Self {
        DAppResponse::PermissionResponse {
            pkh: p.pkh,
            public_key: p.public_key,
            rpc: p.rpc,
        }
    }
}
