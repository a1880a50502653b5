//! Wire shapes of `window.postMessage` traffic between the page and the
//! content script.

use crate::error::DAppError;
use crate::types::ChainType;
use serde_json::{json, Value};

pub const PAGE_REQUEST: &str = "TEMPLE_PAGE_REQUEST";
pub const PAGE_RESPONSE: &str = "TEMPLE_PAGE_RESPONSE";
pub const PAGE_ERROR_RESPONSE: &str = "TEMPLE_PAGE_ERROR_RESPONSE";
pub const DAPP_DISCONNECTED: &str = "TEMPLE_DAPP_DISCONNECTED";
pub const EVM_CHAIN_SWITCHED: &str = "TEMPLE_EVM_CHAIN_SWITCHED";

pub const BEACON_TO_EXTENSION: &str = "toExtension";
pub const BEACON_TO_PAGE: &str = "toPage";
pub const BEACON_PING: &str = "ping";
pub const BEACON_PONG: &str = "pong";

/// A page message the content script acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    /// Native wallet-page request; `req_id` is echoed back untouched.
    Request {
        req_id: Value,
        payload: Value,
        chain_id: Option<String>,
        chain_type: Option<ChainType>,
    },
    BeaconPing,
    Beacon { payload: String, encrypted: bool },
}

impl PageMessage {
    /// `None` for anything not addressed to this extension.
    pub fn parse(data: &Value, sender_id: &str) -> Option<Self> {
        if data.get("type").and_then(Value::as_str) == Some(PAGE_REQUEST) {
            return Some(PageMessage::Request {
                req_id: data.get("reqId").cloned().unwrap_or(Value::Null),
                payload: data.get("payload").cloned().unwrap_or(Value::Null),
                chain_id: data.get("chainId").and_then(Value::as_str).map(str::to_string),
                chain_type: data
                    .get("chainType")
                    .and_then(|v| serde_json::from_value(v.clone()).ok()),
            });
        }

        if data.get("target").and_then(Value::as_str) != Some(BEACON_TO_EXTENSION) {
            return None;
        }
        if let Some(target_id) = data.get("targetId").and_then(Value::as_str) {
            if target_id != sender_id {
                return None;
            }
        }

        if let Some(encrypted) = data.get("encryptedPayload").and_then(Value::as_str) {
            return Some(PageMessage::Beacon {
                payload: encrypted.to_string(),
                encrypted: true,
            });
        }
        match data.get("payload").and_then(Value::as_str)? {
            BEACON_PING => Some(PageMessage::BeaconPing),
            payload => Some(PageMessage::Beacon {
                payload: payload.to_string(),
                encrypted: false,
            }),
        }
    }
}

pub fn response(req_id: Value, payload: Value) -> Value {
    json!({ "type": PAGE_RESPONSE, "payload": payload, "reqId": req_id })
}

pub fn error_response(req_id: Value, error: &DAppError) -> Value {
    json!({
        "type": PAGE_ERROR_RESPONSE,
        "errorPayload": { "code": error.code(), "message": error.message() },
        "reqId": req_id,
    })
}

pub fn beacon_envelope(sender_id: &str, payload: &str, encrypted: bool) -> Value {
    let mut message = serde_json::Map::new();
    message.insert("target".into(), BEACON_TO_PAGE.into());
    let field = if encrypted { "encryptedPayload" } else { "payload" };
    message.insert(field.into(), payload.into());
    json!({
        "message": message,
        "sender": { "id": sender_id },
    })
}

pub fn beacon_pong(sender_id: &str) -> Value {
    beacon_envelope(sender_id, BEACON_PONG, false)
}

pub fn dapp_disconnected() -> Value {
    json!({ "type": DAPP_DISCONNECTED })
}

pub fn chain_switched(chain_id: &str) -> Value {
    json!({ "type": EVM_CHAIN_SWITCHED, "chainId": chain_id })
}
