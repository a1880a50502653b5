use serde::Serialize;
use serde_json::Value;
use std::rc::Rc;
use temple_bridge_core::content::{ContentScriptRouter, PageMessageEvent, PageWindow};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{MessageEvent, Window};

/// The tab's window as seen from the content script.
pub struct BrowserPage {
    window: Window,
}

impl BrowserPage {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl PageWindow for BrowserPage {
    fn origin(&self) -> String {
        self.window.location().origin().unwrap_or_default()
    }

    fn post_message(&self, message: Value, target_origin: &str) {
        let js = match message.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
            Ok(js) => js,
            Err(e) => {
                warn!("[content] failed to convert reply: {}", e);
                return;
            }
        };
        if let Err(e) = self.window.post_message(&js, target_origin) {
            warn!("[content] postMessage failed: {:?}", e);
        }
    }
}

/// Feeds every `message` event of `window` into `router`.
pub fn listen(window: &Window, router: Rc<ContentScriptRouter>) -> Result<(), JsValue> {
    let own = window.clone();
    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        let from_own_window = event
            .source()
            .map(|source| js_sys::Object::is(&source, &own))
            .unwrap_or(false);
        // Anything that is not plain JSON cannot be ours.
        let Ok(data) = serde_wasm_bindgen::from_value::<Value>(event.data()) else {
            return;
        };
        let router = router.clone();
        let origin = event.origin();
        spawn_local(async move {
            router
                .handle_event(PageMessageEvent {
                    data,
                    origin,
                    from_own_window,
                })
                .await;
        });
    }) as Box<dyn FnMut(MessageEvent)>);

    window.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}
