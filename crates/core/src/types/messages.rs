use super::confirmation::{ConfirmationDecision, ConfirmationPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Tezos,
    Evm,
}

/// Requests exchanged between extension contexts (content script -> background,
/// popup -> background).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionRequest {
    #[serde(rename_all = "camelCase")]
    PageRequest {
        origin: String,
        payload: Value,
        #[serde(default)]
        beacon: bool,
        #[serde(default)]
        encrypted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain_type: Option<ChainType>,
    },

    GetPayloadRequest {
        id: String,
    },

    ConfirmationRequest {
        id: String,
        confirmed: bool,
    },

    #[serde(rename_all = "camelCase")]
    PermConfirmationRequest {
        id: String,
        confirmed: bool,
        #[serde(default)]
        account_public_key_hash: Option<String>,
        #[serde(default)]
        account_public_key: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    OpsConfirmationRequest {
        id: String,
        confirmed: bool,
        #[serde(default)]
        modified_total_fee: Option<u64>,
        #[serde(default)]
        modified_storage_limit: Option<u64>,
    },

    SignConfirmationRequest {
        id: String,
        confirmed: bool,
    },
}

impl ExtensionRequest {
    /// Splits a popup decision into its correlation id and the decision.
    /// `None` for anything that is not a decision.
    pub fn as_decision(&self) -> Option<(&str, ConfirmationDecision)> {
        match self {
            ExtensionRequest::ConfirmationRequest { id, confirmed } => Some((
                id,
                ConfirmationDecision::Generic {
                    confirmed: *confirmed,
                },
            )),
            ExtensionRequest::PermConfirmationRequest {
                id,
                confirmed,
                account_public_key_hash,
                account_public_key,
            } => Some((
                id,
                ConfirmationDecision::Permission {
                    confirmed: *confirmed,
                    account_public_key_hash: account_public_key_hash.clone(),
                    account_public_key: account_public_key.clone(),
                },
            )),
            ExtensionRequest::OpsConfirmationRequest {
                id,
                confirmed,
                modified_total_fee,
                modified_storage_limit,
            } => Some((
                id,
                ConfirmationDecision::Operations {
                    confirmed: *confirmed,
                    modified_total_fee: *modified_total_fee,
                    modified_storage_limit: *modified_storage_limit,
                },
            )),
            ExtensionRequest::SignConfirmationRequest { id, confirmed } => Some((
                id,
                ConfirmationDecision::Sign {
                    confirmed: *confirmed,
                },
            )),
            ExtensionRequest::PageRequest { .. } | ExtensionRequest::GetPayloadRequest { .. } => {
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionResponse {
    PageResponse { payload: Value },
    GetPayloadResponse { payload: ConfirmationPayload },
    ConfirmationResponse,
}

/// Background -> content script events that are not replies to anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionNotification {
    #[serde(rename = "DAPPS_DISCONNECTED")]
    DAppsDisconnected { origins: Vec<String> },

    #[serde(rename_all = "camelCase")]
    ChainSwitched { origin: String, chain_id: String },
}
