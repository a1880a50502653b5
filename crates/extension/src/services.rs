//! Collaborators backed by the extension's JS entry point.
//!
//! The background script provides a single `callWallet(op, payload)` that
//! returns a Promise, plus `onWindowRemoved(listener)`. Everything browser or
//! vault specific stays on the JS side.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use js_sys::Promise;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use temple_bridge_core::background::{
    BeaconCrypto, NodeClient, OperationParser, PermissionStore, PopupSpec, Vault, WindowBounds,
    WindowId, WindowManager,
};
use temple_bridge_core::error::{StoreError, VaultError, WindowError};
use temple_bridge_core::types::DAppSession;
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = callWallet)]
    fn call_wallet(op: &str, payload: JsValue) -> Promise;

    #[wasm_bindgen(js_name = onWindowRemoved)]
    fn on_window_removed(listener: &js_sys::Function);
}

/// Rejections are reported by JS as `{ nodeError?: string, message: string }`
/// or a plain string.
#[derive(Debug)]
struct JsCallError {
    node: bool,
    message: String,
}

async fn call<T: DeserializeOwned>(op: &str, payload: Value) -> Result<T, JsCallError> {
    let js_payload = payload
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsCallError {
            node: false,
            message: e.to_string(),
        })?;

    let result = JsFuture::from(call_wallet(op, js_payload))
        .await
        .map_err(|e| rejection(op, e))?;

    serde_wasm_bindgen::from_value(result).map_err(|e| JsCallError {
        node: false,
        message: format!("{op}: unexpected result: {e}"),
    })
}

fn rejection(op: &str, e: JsValue) -> JsCallError {
    if let Some(message) = e.as_string() {
        return JsCallError { node: false, message };
    }
    let node = js_sys::Reflect::get(&e, &"nodeError".into())
        .ok()
        .and_then(|v| v.as_string());
    match node {
        Some(message) => JsCallError {
            node: true,
            message,
        },
        None => JsCallError {
            node: false,
            message: js_sys::Reflect::get(&e, &"message".into())
                .ok()
                .and_then(|v| v.as_string())
                .unwrap_or_else(|| format!("{op} failed")),
        },
    }
}

impl From<JsCallError> for VaultError {
    fn from(e: JsCallError) -> Self {
        if e.node {
            VaultError::Node(e.message)
        } else {
            VaultError::Other(e.message)
        }
    }
}

impl From<JsCallError> for StoreError {
    fn from(e: JsCallError) -> Self {
        StoreError::Backend(e.message)
    }
}

/// `browser.windows.Window` geometry; all four fields must be present.
fn window_bounds(window: &Value) -> Option<WindowBounds> {
    let field = |name: &str| window.get(name)?.as_f64().map(|v| v as i32);
    Some(WindowBounds {
        left: field("left")?,
        top: field("top")?,
        width: field("width")?,
        height: field("height")?,
    })
}

pub struct JsServices {
    removed_listeners: Rc<RefCell<Vec<mpsc::UnboundedSender<WindowId>>>>,
}

impl JsServices {
    pub fn new() -> Rc<Self> {
        let removed_listeners: Rc<RefCell<Vec<mpsc::UnboundedSender<WindowId>>>> =
            Rc::new(RefCell::new(Vec::new()));

        let listeners = removed_listeners.clone();
        let closure = Closure::wrap(Box::new(move |id: f64| {
            listeners
                .borrow_mut()
                .retain(|tx| tx.unbounded_send(id as WindowId).is_ok());
        }) as Box<dyn FnMut(f64)>);
        on_window_removed(closure.as_ref().unchecked_ref());
        closure.forget();

        Rc::new(Self { removed_listeners })
    }
}

#[async_trait(?Send)]
impl PermissionStore for JsServices {
    async fn get(&self, origin: &str) -> Result<Option<DAppSession>, StoreError> {
        Ok(call("getDAppSession", json!({ "origin": origin })).await?)
    }

    async fn set(&self, origin: &str, session: DAppSession) -> Result<(), StoreError> {
        let payload = json!({ "origin": origin, "session": session });
        let _: Value = call("setDAppSession", payload).await?;
        Ok(())
    }

    async fn remove(&self, origins: &[String]) -> Result<(), StoreError> {
        let _: Value = call("removeDAppSessions", json!({ "origins": origins })).await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(String, DAppSession)>, StoreError> {
        Ok(call("getAllDAppSessions", Value::Null).await?)
    }
}

#[async_trait(?Send)]
impl Vault for JsServices {
    async fn send_operations(
        &self,
        source_pkh: &str,
        rpc: &str,
        op_params: &[Value],
    ) -> Result<String, VaultError> {
        Ok(call(
            "sendOperations",
            json!({ "sourcePkh": source_pkh, "rpc": rpc, "opParams": op_params }),
        )
        .await?)
    }

    async fn sign(&self, source_pkh: &str, bytes: &str) -> Result<String, VaultError> {
        Ok(call("sign", json!({ "sourcePkh": source_pkh, "bytes": bytes })).await?)
    }
}

#[async_trait(?Send)]
impl NodeClient for JsServices {
    async fn inject_operation(
        &self,
        rpc: &str,
        signed_op_bytes: &str,
    ) -> Result<String, VaultError> {
        Ok(call(
            "injectOperation",
            json!({ "rpc": rpc, "signedOpBytes": signed_op_bytes }),
        )
        .await?)
    }
}

#[async_trait(?Send)]
impl WindowManager for JsServices {
    async fn last_focused_bounds(&self) -> Option<WindowBounds> {
        let bounds: Value = call("getLastFocusedBounds", Value::Null).await.ok()?;
        window_bounds(&bounds)
    }

    async fn create_popup(&self, spec: &PopupSpec) -> Result<WindowId, WindowError> {
        let id: f64 = call(
            "createPopup",
            json!({
                "url": spec.url,
                "left": spec.left,
                "top": spec.top,
                "width": spec.width,
                "height": spec.height,
            }),
        )
        .await
        .map_err(|e| WindowError::Create(e.message))?;
        Ok(id as WindowId)
    }

    async fn remove(&self, id: WindowId) -> Result<(), WindowError> {
        let _: Value = call("removeWindow", json!({ "id": id }))
            .await
            .map_err(|e| WindowError::Remove(id, e.message))?;
        Ok(())
    }

    fn subscribe_removed(&self) -> LocalBoxStream<'static, WindowId> {
        let (tx, rx) = mpsc::unbounded();
        self.removed_listeners.borrow_mut().push(tx);
        rx.boxed_local()
    }
}

#[async_trait(?Send)]
impl OperationParser for JsServices {
    async fn parse_forged(&self, bytes: &str, rpc: &str) -> Option<Value> {
        match call::<Value>("parseForgedOperation", json!({ "bytes": bytes, "rpc": rpc })).await {
            Ok(Value::Null) => None,
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("[dapp] forged bytes did not parse: {}", e.message);
                None
            }
        }
    }
}

#[async_trait(?Send)]
impl BeaconCrypto for JsServices {
    async fn decrypt(&self, origin: &str, payload: &str) -> Result<String, String> {
        call("beaconDecrypt", json!({ "origin": origin, "payload": payload }))
            .await
            .map_err(|e| e.message)
    }

    async fn encrypt(&self, origin: &str, payload: &str) -> Result<String, String> {
        call("beaconEncrypt", json!({ "origin": origin, "payload": payload }))
            .await
            .map_err(|e| e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use temple_bridge_core::error::BROADCAST_ERROR_PREFIX;
    use temple_bridge_core::DAppError;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn js_object(fields: &[(&str, &str)]) -> JsValue {
        let obj = js_sys::Object::new();
        for (key, value) in fields {
            js_sys::Reflect::set(&obj, &(*key).into(), &(*value).into()).unwrap();
        }
        obj.into()
    }

    #[wasm_bindgen_test]
    fn test_node_rejection_becomes_broadcast_error() {
        let e = rejection(
            "sendOperations",
            js_object(&[("nodeError", "counter_in_the_past"), ("message", "ignored")]),
        );
        assert!(e.node);
        assert_eq!(e.message, "counter_in_the_past");

        let err: DAppError = VaultError::from(e).into();
        assert_eq!(err, DAppError::Broadcast("counter_in_the_past".into()));
        assert!(err.to_string().starts_with(BROADCAST_ERROR_PREFIX));
    }

    #[wasm_bindgen_test]
    fn test_other_rejections_are_unknown() {
        let e = rejection("sign", JsValue::from_str("wallet is locked"));
        assert!(!e.node);
        assert_eq!(e.message, "wallet is locked");

        let e = rejection("sign", js_object(&[("message", "user closed vault")]));
        assert!(!e.node);
        let err: DAppError = VaultError::from(e).into();
        assert_eq!(err, DAppError::Unknown("user closed vault".into()));

        let e = rejection("sign", js_sys::Object::new().into());
        assert_eq!(e.message, "sign failed");

        let e = rejection("getDAppSession", JsValue::UNDEFINED);
        assert!(matches!(
            StoreError::from(e),
            StoreError::Backend(ref m) if m == "getDAppSession failed"
        ));
    }

    #[wasm_bindgen_test]
    fn test_window_bounds_parsing() {
        assert_eq!(
            window_bounds(&json!({
                "left": 10,
                "top": 20.0,
                "width": 1280,
                "height": 800,
                "id": 3
            })),
            Some(WindowBounds {
                left: 10,
                top: 20,
                width: 1280,
                height: 800
            })
        );
        assert_eq!(window_bounds(&json!({ "left": 10, "top": 20, "width": 1280 })), None);
        let textual = json!({ "left": "10", "top": 0, "width": 1, "height": 1 });
        assert_eq!(window_bounds(&textual), None);
        assert_eq!(window_bounds(&Value::Null), None);
    }
}
