use futures::channel::mpsc;
use futures::StreamExt;
use std::cell::RefCell;
use std::rc::Rc;
use temple_bridge_core::intercom::PortEnd;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

#[wasm_bindgen]
extern "C" {
    /// `runtime.Port` of the WebExtension API.
    #[derive(Clone)]
    pub type RuntimePort;

    #[wasm_bindgen(method, js_name = postMessage)]
    fn post_message(this: &RuntimePort, message: &JsValue);

    #[wasm_bindgen(method)]
    fn disconnect(this: &RuntimePort);

    #[wasm_bindgen(method, getter, js_name = onMessage)]
    fn on_message(this: &RuntimePort) -> RuntimeEvent;

    #[wasm_bindgen(method, getter, js_name = onDisconnect)]
    fn on_disconnect(this: &RuntimePort) -> RuntimeEvent;

    pub type RuntimeEvent;

    #[wasm_bindgen(method, js_name = addListener)]
    fn add_listener(this: &RuntimeEvent, listener: &js_sys::Function);
}

/// Turns a runtime port into a [`PortEnd`]. Frames travel as JSON text
/// since runtime ports only carry JSON-serializable values. Dropping the
/// returned end disconnects the port; a remote disconnect closes the end.
pub fn bridge(port: RuntimePort) -> PortEnd {
    let (in_tx, in_rx) = mpsc::unbounded::<Vec<u8>>();
    let (out_tx, mut out_rx) = mpsc::unbounded::<Vec<u8>>();
    let in_tx = Rc::new(RefCell::new(Some(in_tx)));

    let tx = in_tx.clone();
    let on_message = Closure::wrap(Box::new(move |message: JsValue| {
        let Some(text) = message.as_string() else {
            debug!("[intercom] ignoring non-text port message");
            return;
        };
        if let Some(tx) = tx.borrow().as_ref() {
            let _ = tx.unbounded_send(text.into_bytes());
        }
    }) as Box<dyn FnMut(JsValue)>);
    port.on_message()
        .add_listener(on_message.as_ref().unchecked_ref());
    on_message.forget();

    let on_disconnect = Closure::wrap(Box::new(move || {
        // Dropping the sender ends the inbound stream.
        in_tx.borrow_mut().take();
    }) as Box<dyn FnMut()>);
    port.on_disconnect()
        .add_listener(on_disconnect.as_ref().unchecked_ref());
    on_disconnect.forget();

    let outbound = port.clone();
    spawn_local(async move {
        while let Some(bytes) = out_rx.next().await {
            match String::from_utf8(bytes) {
                Ok(text) => outbound.post_message(&JsValue::from_str(&text)),
                Err(e) => warn!("[intercom] dropping non-utf8 frame: {}", e),
            }
        }
        outbound.disconnect();
    });

    PortEnd::from_parts(out_tx, in_rx)
}
