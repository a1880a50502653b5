use super::dapp::AppMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the confirmation popup renders. Built once by a handler and handed
/// out unchanged for every payload fetch of its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfirmationPayload {
    #[serde(rename_all = "camelCase")]
    Connect {
        origin: String,
        network_rpc: String,
        app_meta: AppMetadata,
    },

    #[serde(rename_all = "camelCase")]
    ConfirmOperations {
        origin: String,
        network_rpc: String,
        app_meta: AppMetadata,
        source_pkh: String,
        source_public_key: String,
        op_params: Vec<Value>,
    },

    #[serde(rename_all = "camelCase")]
    Sign {
        origin: String,
        network_rpc: String,
        app_meta: AppMetadata,
        source_pkh: String,
        source_public_key: String,
        payload: String,
        preview: Option<SignPreview>,
    },
}

impl ConfirmationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfirmationPayload::Connect { .. } => "connect",
            ConfirmationPayload::ConfirmOperations { .. } => "confirm_operations",
            ConfirmationPayload::Sign { .. } => "sign",
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            ConfirmationPayload::Connect { origin, .. }
            | ConfirmationPayload::ConfirmOperations { origin, .. }
            | ConfirmationPayload::Sign { origin, .. } => origin,
        }
    }
}

/// Best-effort decoding of the bytes a DApp asks to sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SignPreview {
    /// Decoded operation group (`{ branch, contents: [...] }`).
    Operations(Value),
    /// Human readable Micheline string, e.g. "Tezos Signed Message: ...".
    Message(String),
}

/// The user's answer as sent back by the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Generic {
        confirmed: bool,
    },
    Permission {
        confirmed: bool,
        account_public_key_hash: Option<String>,
        account_public_key: Option<String>,
    },
    Operations {
        confirmed: bool,
        modified_total_fee: Option<u64>,
        modified_storage_limit: Option<u64>,
    },
    Sign {
        confirmed: bool,
    },
}

impl ConfirmationDecision {
    pub fn confirmed(&self) -> bool {
        match self {
            ConfirmationDecision::Generic { confirmed }
            | ConfirmationDecision::Permission { confirmed, .. }
            | ConfirmationDecision::Operations { confirmed, .. }
            | ConfirmationDecision::Sign { confirmed } => *confirmed,
        }
    }
}
