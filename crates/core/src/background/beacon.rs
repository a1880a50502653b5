/*!
Beacon compatibility layer.

Beacon peers exchange base58check-encoded JSON messages. Incoming Beacon
requests are translated into the native [`DAppRequest`] vocabulary, handled
by the same code path as native page requests, and the outcome (success or
error) is translated back into a Beacon message for the page.
*/
use super::dapp;
use super::BackgroundContext;
use crate::error::DAppError;
use crate::types::{AppMetadata, DAppRequest, DAppResponse, Network};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const BEACON_VERSION: &str = "2";
const DEFAULT_SCOPES: [&str; 2] = ["operation_request", "sign"];
const DEFAULT_SIGNING_TYPE: &str = "raw";

/// Operation fields Beacon spells the RPC way, with their wallet names.
const BEACON_OP_FIELDS: [(&str, &str); 3] = [
    ("gas_limit", "gasLimit"),
    ("storage_limit", "storageLimit"),
    ("parameters", "parameter"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconNetwork {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl BeaconNetwork {
    fn to_network(&self) -> Result<Network, DAppError> {
        if self.kind == "custom" {
            let rpc = self.rpc_url.clone().ok_or(DAppError::InvalidParams)?;
            let name = self.name.clone().unwrap_or_else(|| self.kind.clone());
            Ok(Network::custom(name, rpc))
        } else {
            Ok(Network::named(self.kind.clone()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconAppMetadata {
    #[serde(default)]
    pub sender_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BeaconRequestBody {
    #[serde(rename_all = "camelCase")]
    PermissionRequest {
        app_metadata: BeaconAppMetadata,
        network: BeaconNetwork,
        #[serde(default)]
        scopes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    OperationRequest {
        network: BeaconNetwork,
        operation_details: Vec<Value>,
        source_address: String,
    },
    #[serde(rename_all = "camelCase")]
    SignPayloadRequest {
        #[serde(default)]
        signing_type: Option<String>,
        payload: String,
        source_address: String,
    },
    #[serde(rename_all = "camelCase")]
    BroadcastRequest {
        network: BeaconNetwork,
        signed_transaction: String,
    },
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconRequest {
    pub version: String,
    pub id: String,
    pub sender_id: String,
    #[serde(flatten)]
    pub body: BeaconRequestBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeaconErrorType {
    ParametersInvalidError,
    AbortedError,
    NoAddressError,
    BroadcastError,
    UnknownError,
}

impl From<&DAppError> for BeaconErrorType {
    fn from(e: &DAppError) -> Self {
        match e {
            DAppError::InvalidParams => BeaconErrorType::ParametersInvalidError,
            DAppError::NotGranted => BeaconErrorType::AbortedError,
            DAppError::NotFound => BeaconErrorType::NoAddressError,
            DAppError::Broadcast(_) => BeaconErrorType::BroadcastError,
            DAppError::Unknown(_) => BeaconErrorType::UnknownError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BeaconResponseBody {
    #[serde(rename_all = "camelCase")]
    PermissionResponse {
        public_key: String,
        network: BeaconNetwork,
        scopes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    OperationResponse { transaction_hash: String },
    #[serde(rename_all = "camelCase")]
    SignPayloadResponse {
        signature: String,
        signing_type: String,
    },
    #[serde(rename_all = "camelCase")]
    BroadcastResponse { transaction_hash: String },
    Acknowledge,
    #[serde(rename_all = "camelCase")]
    Error { error_type: BeaconErrorType },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconResponse {
    pub version: String,
    pub id: String,
    pub sender_id: String,
    #[serde(flatten)]
    pub body: BeaconResponseBody,
}

impl BeaconResponse {
    /// Error reply for a request that could not even be read; `id` is empty.
    pub fn error(sender_id: &str, id: &str, error: &DAppError) -> Self {
        Self {
            version: BEACON_VERSION.to_string(),
            id: id.to_string(),
            sender_id: sender_id.to_string(),
            body: BeaconResponseBody::Error {
                error_type: error.into(),
            },
        }
    }
}

pub fn encode_message<T: Serialize>(message: &T) -> Result<String, DAppError> {
    let json = serde_json::to_vec(message).map_err(|e| DAppError::unknown(e.to_string()))?;
    Ok(bs58::encode(json).with_check().into_string())
}

pub fn decode_message<T: DeserializeOwned>(encoded: &str) -> Result<T, DAppError> {
    let bytes = bs58::decode(encoded)
        .with_check(None)
        .into_vec()
        .map_err(|e| {
            debug!("[beacon] payload is not base58check: {}", e);
            DAppError::InvalidParams
        })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        debug!("[beacon] payload is not a beacon message: {}", e);
        DAppError::InvalidParams
    })
}

/// Native request equivalent of a Beacon request.
pub fn to_dapp_request(request: &BeaconRequest) -> Result<DAppRequest, DAppError> {
    Ok(match &request.body {
        BeaconRequestBody::PermissionRequest {
            app_metadata,
            network,
            ..
        } => DAppRequest::PermissionRequest {
            network: network.to_network()?,
            app_meta: AppMetadata {
                name: app_metadata.name.clone(),
            },
            force: None,
        },
        BeaconRequestBody::OperationRequest {
            operation_details,
            source_address,
            ..
        } => DAppRequest::OperationRequest {
            source_pkh: source_address.clone(),
            op_params: operation_details.iter().map(to_native_op).collect(),
        },
        BeaconRequestBody::SignPayloadRequest {
            payload,
            source_address,
            ..
        } => DAppRequest::SignRequest {
            source_pkh: source_address.clone(),
            payload: payload.clone(),
        },
        BeaconRequestBody::BroadcastRequest {
            signed_transaction,
            ..
        } => DAppRequest::BroadcastRequest {
            signed_op_bytes: signed_transaction.clone(),
        },
        BeaconRequestBody::Disconnect => DAppRequest::DisconnectRequest,
    })
}

/// Renames Beacon operation fields to the wallet's vocabulary. The Beacon
/// spelling wins if a detail carries both.
fn to_native_op(details: &Value) -> Value {
    let Value::Object(fields) = details else {
        return details.clone();
    };
    let mut native = fields.clone();
    for (beacon, wallet) in BEACON_OP_FIELDS {
        if let Some(value) = native.remove(beacon) {
            native.insert(wallet.to_string(), value);
        }
    }
    Value::Object(native)
}

/// Beacon reply for `request` given the native handler outcome.
pub fn to_beacon_response(
    sender_id: &str,
    request: &BeaconRequest,
    outcome: Result<DAppResponse, DAppError>,
) -> BeaconResponse {
    let body = match (outcome, &request.body) {
        (
            Ok(DAppResponse::PermissionResponse { public_key, .. }),
            BeaconRequestBody::PermissionRequest {
                network, scopes, ..
            },
        ) => BeaconResponseBody::PermissionResponse {
            public_key,
            network: network.clone(),
            scopes: if scopes.is_empty() {
                DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
            } else {
                scopes.clone()
            },
        },
        (Ok(DAppResponse::OperationResponse { op_hash }), _) => {
            BeaconResponseBody::OperationResponse {
                transaction_hash: op_hash,
            }
        }
        (
            Ok(DAppResponse::SignResponse { signature }),
            BeaconRequestBody::SignPayloadRequest { signing_type, .. },
        ) => BeaconResponseBody::SignPayloadResponse {
            signature,
            signing_type: signing_type
                .clone()
                .unwrap_or_else(|| DEFAULT_SIGNING_TYPE.to_string()),
        },
        (Ok(DAppResponse::BroadcastResponse { op_hash }), _) => {
            BeaconResponseBody::BroadcastResponse {
                transaction_hash: op_hash,
            }
        }
        (Ok(DAppResponse::DisconnectResponse), _) => BeaconResponseBody::Acknowledge,
        (Ok(other), _) => {
            warn!("[beacon] no beacon form for {:?}", other);
            BeaconResponseBody::Error {
                error_type: BeaconErrorType::UnknownError,
            }
        }
        (Err(e), _) => BeaconResponseBody::Error {
            error_type: (&e).into(),
        },
    };

    BeaconResponse {
        version: request.version.clone(),
        id: request.id.clone(),
        sender_id: sender_id.to_string(),
        body,
    }
}

/// Handles one Beacon page request end to end. DApp-level failures are
/// delivered as Beacon error messages; only transport problems (crypto,
/// encoding) surface as `Err`.
pub async fn handle_beacon_payload(
    ctx: &BackgroundContext,
    origin: &str,
    payload: Value,
    encrypted: bool,
) -> Result<Value, DAppError> {
    let Value::String(raw) = payload else {
        return Err(DAppError::InvalidParams);
    };
    let sender_id = ctx.config.sender_id.as_str();

    let encoded = if encrypted {
        let crypto = ctx
            .beacon_crypto
            .as_ref()
            .ok_or_else(|| DAppError::unknown("encrypted beacon payloads are not supported"))?;
        crypto
            .decrypt(origin, &raw)
            .await
            .map_err(DAppError::unknown)?
    } else {
        raw
    };

    let response = match decode_message::<BeaconRequest>(&encoded) {
        Ok(request) => {
            debug!("[beacon] {} request {} from {}", request.version, request.id, origin);
            let outcome = match to_dapp_request(&request) {
                Ok(native) => dapp::dispatch(ctx, origin, native).await,
                Err(e) => Err(e),
            };
            to_beacon_response(sender_id, &request, outcome)
        }
        Err(e) => BeaconResponse::error(sender_id, "", &e),
    };

    let encoded = encode_message(&response)?;
    let out = match (&ctx.beacon_crypto, encrypted) {
        (Some(crypto), true) => crypto
            .encrypt(origin, &encoded)
            .await
            .map_err(DAppError::unknown)?,
        _ => encoded,
    };
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> BeaconRequest {
        let mut v = json!({ "version": "2", "id": "req-1", "senderId": "peer" });
        if let (Value::Object(base), Value::Object(extra)) = (&mut v, body) {
            base.extend(extra);
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_codec_roundtrip_and_bad_checksum() {
        let req = request(json!({ "type": "disconnect" }));
        let encoded = encode_message(&req).unwrap();
        let back: BeaconRequest = decode_message(&encoded).unwrap();
        assert_eq!(back, req);

        let mut corrupted = encoded.clone();
        corrupted.pop();
        corrupted.push(if encoded.ends_with('1') { '2' } else { '1' });
        assert_eq!(
            decode_message::<BeaconRequest>(&corrupted),
            Err(DAppError::InvalidParams)
        );
    }

    #[test]
    fn test_permission_translation() {
        let req = request(json!({
            "type": "permission_request",
            "appMetadata": { "senderId": "peer", "name": "Foo" },
            "network": { "type": "custom", "name": "local", "rpcUrl": "http://localhost:8732" },
            "scopes": ["sign"]
        }));
        assert_eq!(
            to_dapp_request(&req).unwrap(),
            DAppRequest::PermissionRequest {
                network: Network::custom("local", "http://localhost:8732"),
                app_meta: AppMetadata { name: "Foo".into() },
                force: None,
            }
        );

        let resp = to_beacon_response(
            "temple",
            &req,
            Ok(DAppResponse::PermissionResponse {
                pkh: "tz1".into(),
                public_key: "edpk".into(),
                rpc: "http://localhost:8732".into(),
            }),
        );
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["type"], "permission_response");
        assert_eq!(v["id"], "req-1");
        assert_eq!(v["senderId"], "temple");
        assert_eq!(v["publicKey"], "edpk");
        assert_eq!(v["scopes"], json!(["sign"]));
    }

    #[test]
    fn test_custom_network_needs_rpc() {
        let req = request(json!({
            "type": "permission_request",
            "appMetadata": { "name": "Foo" },
            "network": { "type": "custom" }
        }));
        assert_eq!(to_dapp_request(&req), Err(DAppError::InvalidParams));
    }

    #[test]
    fn test_error_mapping() {
        let req = request(json!({
            "type": "sign_payload_request",
            "payload": "05",
            "sourceAddress": "tz1"
        }));
        let cases = [
            (DAppError::InvalidParams, "PARAMETERS_INVALID_ERROR"),
            (DAppError::NotGranted, "ABORTED_ERROR"),
            (DAppError::NotFound, "NO_ADDRESS_ERROR"),
            (DAppError::Broadcast("x".into()), "BROADCAST_ERROR"),
            (DAppError::unknown("x"), "UNKNOWN_ERROR"),
        ];
        for (err, code) in cases {
            let v = serde_json::to_value(to_beacon_response("temple", &req, Err(err))).unwrap();
            assert_eq!(v["type"], "error");
            assert_eq!(v["errorType"], code);
        }
    }

    #[test]
    fn test_operation_details_use_wallet_field_names() {
        let req = request(json!({
            "type": "operation_request",
            "network": { "type": "mainnet" },
            "sourceAddress": "tz1",
            "operationDetails": [{
                "kind": "transaction",
                "amount": "1000",
                "gas_limit": "1500",
                "storage_limit": "100",
                "storageLimit": "7",
                "parameters": { "entrypoint": "default", "value": { "prim": "Unit" } }
            }]
        }));
        let DAppRequest::OperationRequest { op_params, .. } = to_dapp_request(&req).unwrap() else {
            panic!("expected an operation request");
        };
        assert_eq!(
            op_params,
            vec![json!({
                "kind": "transaction",
                "amount": "1000",
                "gasLimit": "1500",
                "storageLimit": "100",
                "parameter": { "entrypoint": "default", "value": { "prim": "Unit" } }
            })]
        );
    }

    #[test]
    fn test_disconnect_is_acknowledged() {
        let req = request(json!({ "type": "disconnect" }));
        assert_eq!(to_dapp_request(&req).unwrap(), DAppRequest::DisconnectRequest);
        let resp = to_beacon_response("temple", &req, Ok(DAppResponse::DisconnectResponse));
        assert_eq!(resp.body, BeaconResponseBody::Acknowledge);
    }
}
