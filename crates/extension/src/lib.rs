//! Browser glue for the DApp bridge.
//!
//! Three entry points, one per extension context:
//! - [`Background`] owns permissions and confirmations and serves runtime ports
//! - [`start_content_script`] relays between the tab and the background
//! - [`Popup`] answers a single pending confirmation

use serde::Serialize;
use std::rc::Rc;
use temple_bridge_core::background::{BackgroundContext, Collaborators};
use temple_bridge_core::intercom::{IntercomClient, IntercomServer, Subscription};
use temple_bridge_core::types::ExtensionNotification;
use temple_bridge_core::{BridgeConfig, ConfirmationClient, ContentScriptRouter, DAppError};
use tracing::{error, info, Level};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

mod page;
mod port;
mod services;
mod telemetry;

pub use port::RuntimePort;
use services::JsServices;

#[wasm_bindgen]
pub struct Background {
    ctx: Rc<BackgroundContext>,
    // Handler registrations live as long as the background does.
    _subscriptions: Vec<Subscription>,
}

#[wasm_bindgen]
impl Background {
    /// new(configJson?). Falls back to the built-in defaults when no config
    /// is given.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<Background, JsValue> {
        telemetry::init(Level::INFO, Some("background"));

        let config = match config_json {
            Some(json) => BridgeConfig::from_json(&json)
                .map_err(|e| js_err(&format!("invalid config: {e}")))?,
            None => BridgeConfig::default(),
        };
        config.validate().map_err(|e| js_err(&e))?;

        let js = JsServices::new();
        let collaborators = Collaborators {
            store: js.clone(),
            vault: js.clone(),
            node: js.clone(),
            windows: js.clone(),
            parser: js.clone(),
            beacon_crypto: Some(js),
        };

        let server = IntercomServer::new();
        let ctx = BackgroundContext::new(config, server.clone(), collaborators);
        let subscriptions = ctx.start();

        spawn_local(async move {
            server.serve().await;
            error!("[intercom] serve loop ended");
        });

        Ok(Background {
            ctx,
            _subscriptions: subscriptions,
        })
    }

    /// Hands a `runtime.onConnect` port to the intercom server.
    #[wasm_bindgen(js_name = "attachPort")]
    pub fn attach_port(&self, port: RuntimePort) -> f64 {
        let id = self.ctx.intercom.attach(port::bridge(port));
        id as f64
    }

    /// `[origin, session]` pairs for every connected DApp.
    #[wasm_bindgen(js_name = "getDAppSessions")]
    pub async fn dapp_sessions(&self) -> Result<JsValue, JsValue> {
        let sessions = self.ctx.dapp_sessions().await.map_err(dapp_err)?;
        to_js(&sessions)
    }

    /// Revokes the grants of the given origins and tells every tab.
    #[wasm_bindgen(js_name = "removeDApps")]
    pub async fn remove_dapps(&self, origins: Vec<String>) -> Result<(), JsValue> {
        self.ctx.remove_dapps(origins).await.map_err(dapp_err)
    }

    #[wasm_bindgen(js_name = "notifyChainSwitched")]
    pub fn notify_chain_switched(&self, origin: String, chain_id: String) {
        self.ctx
            .intercom
            .broadcast(ExtensionNotification::ChainSwitched { origin, chain_id });
    }
}

/// Content script entry: `port` is a fresh `runtime.connect()` port.
#[wasm_bindgen(js_name = "startContentScript")]
pub fn start_content_script(port: RuntimePort, sender_id: String) -> Result<(), JsValue> {
    telemetry::init(Level::INFO, Some("content"));

    let window = web_sys::window().ok_or_else(|| js_err("no window"))?;
    let client = Rc::new(IntercomClient::new(port::bridge(port)));
    let page: Rc<dyn temple_bridge_core::PageWindow> =
        Rc::new(page::BrowserPage::new(window.clone()));
    let router = Rc::new(ContentScriptRouter::new(page, client.clone(), sender_id));

    let relay = router.relay_notifications();
    spawn_local(async move {
        let _relay = relay;
        client.run().await;
        info!("[content] background port closed");
    });

    page::listen(&window, router)
}

#[wasm_bindgen]
pub struct Popup {
    confirmation: ConfirmationClient,
}

#[wasm_bindgen]
impl Popup {
    /// Builds the popup side from a fresh port and `location.hash`.
    #[wasm_bindgen(constructor)]
    pub fn new(port: RuntimePort) -> Result<Popup, JsValue> {
        telemetry::init(Level::INFO, Some("popup"));

        let hash = web_sys::window()
            .ok_or_else(|| js_err("no window"))?
            .location()
            .hash()?;
        let client = Rc::new(IntercomClient::new(port::bridge(port)));

        let runner = client.clone();
        spawn_local(async move { runner.run().await });

        let confirmation = ConfirmationClient::from_location_hash(client, &hash)
            .ok_or_else(|| js_err("missing confirmation id"))?;
        Ok(Popup { confirmation })
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> String {
        self.confirmation.id().to_string()
    }

    pub async fn payload(&self) -> Result<JsValue, JsValue> {
        let payload = self.confirmation.payload().await.map_err(dapp_err)?;
        to_js(&payload)
    }

    pub async fn confirm(&self, confirmed: bool) -> Result<(), JsValue> {
        self.confirmation.confirm(confirmed).await.map_err(dapp_err)
    }

    #[wasm_bindgen(js_name = "confirmPermission")]
    pub async fn confirm_permission(
        &self,
        confirmed: bool,
        account_public_key_hash: Option<String>,
        account_public_key: Option<String>,
    ) -> Result<(), JsValue> {
        self.confirmation
            .confirm_permission(confirmed, account_public_key_hash, account_public_key)
            .await
            .map_err(dapp_err)
    }

    /// Fee and storage overrides come from JS numbers; negative values are
    /// rejected.
    #[wasm_bindgen(js_name = "confirmOperations")]
    pub async fn confirm_operations(
        &self,
        confirmed: bool,
        modified_total_fee: Option<f64>,
        modified_storage_limit: Option<f64>,
    ) -> Result<(), JsValue> {
        let fee = modified_total_fee.map(to_u64).transpose()?;
        let storage = modified_storage_limit.map(to_u64).transpose()?;
        self.confirmation
            .confirm_operations(confirmed, fee, storage)
            .await
            .map_err(dapp_err)
    }

    #[wasm_bindgen(js_name = "confirmSign")]
    pub async fn confirm_sign(&self, confirmed: bool) -> Result<(), JsValue> {
        self.confirmation.confirm_sign(confirmed).await.map_err(dapp_err)
    }
}

fn to_u64(v: f64) -> Result<u64, JsValue> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
        Ok(v as u64)
    } else {
        Err(js_err(&format!("expected a non-negative integer, got {v}")))
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| js_err(&e.to_string()))
}

/// `{ code, message }` so JS callers can branch on the code.
fn dapp_err(e: DAppError) -> JsValue {
    to_js(&e).unwrap_or_else(|_| js_err(&e.to_string()))
}

fn js_err(msg: &str) -> JsValue {
    js_sys::Error::new(msg).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_js_numbers_to_overrides() {
        assert_eq!(to_u64(0.0).unwrap(), 0);
        assert_eq!(to_u64(1500.0).unwrap(), 1500);
        assert!(to_u64(-1.0).is_err());
        assert!(to_u64(2.5).is_err());
        assert!(to_u64(f64::NAN).is_err());
        assert!(to_u64(f64::INFINITY).is_err());
    }

    #[wasm_bindgen_test]
    fn test_errors_reach_js_as_code_and_message() {
        let js = dapp_err(DAppError::Broadcast("balance_too_low".into()));
        let code = js_sys::Reflect::get(&js, &"code".into()).unwrap();
        let message = js_sys::Reflect::get(&js, &"message".into()).unwrap();
        assert_eq!(code.as_string().as_deref(), Some("TEZOS_OPERATION"));
        assert_eq!(message.as_string().as_deref(), Some("balance_too_low"));

        let js = dapp_err(DAppError::NotGranted);
        let code = js_sys::Reflect::get(&js, &"code".into()).unwrap();
        assert_eq!(code.as_string().as_deref(), Some("NOT_GRANTED"));
    }
}
