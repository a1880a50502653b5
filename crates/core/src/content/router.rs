use super::page::{self, PageMessage};
use crate::background::beacon::{encode_message, BeaconResponse};
use crate::error::DAppError;
use crate::intercom::{IntercomClient, Subscription};
use crate::types::{ExtensionNotification, ExtensionRequest, ExtensionResponse};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, warn};

/// The page the content script is injected into.
pub trait PageWindow {
    fn origin(&self) -> String;

    fn post_message(&self, message: Value, target_origin: &str);
}

/// A `message` event as seen by the content script.
#[derive(Debug, Clone)]
pub struct PageMessageEvent {
    pub data: Value,
    pub origin: String,
    /// `event.source === window`.
    pub from_own_window: bool,
}

/// Bridges page messages to the background and posts the outcome back.
/// Every accepted request gets exactly one reply, success or error.
pub struct ContentScriptRouter {
    window: Rc<dyn PageWindow>,
    client: Rc<IntercomClient>,
    sender_id: String,
}

impl ContentScriptRouter {
    pub fn new(
        window: Rc<dyn PageWindow>,
        client: Rc<IntercomClient>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            window,
            client,
            sender_id: sender_id.into(),
        }
    }

    pub async fn handle_event(&self, event: PageMessageEvent) {
        if !event.from_own_window {
            debug!("[content] dropping message from foreign source ({})", event.origin);
            return;
        }
        let Some(message) = PageMessage::parse(&event.data, &self.sender_id) else {
            return;
        };

        match message {
            PageMessage::BeaconPing => {
                self.window
                    .post_message(page::beacon_pong(&self.sender_id), &event.origin);
            }
            PageMessage::Request {
                req_id,
                payload,
                chain_id,
                chain_type,
            } => {
                let request = ExtensionRequest::PageRequest {
                    origin: event.origin.clone(),
                    payload,
                    beacon: false,
                    encrypted: false,
                    chain_id,
                    chain_type,
                };
                let reply = match self.forward(request).await {
                    Ok(payload) => page::response(req_id, payload),
                    Err(e) => page::error_response(req_id, &e),
                };
                self.window.post_message(reply, &event.origin);
            }
            PageMessage::Beacon { payload, encrypted } => {
                let request = ExtensionRequest::PageRequest {
                    origin: event.origin.clone(),
                    payload: Value::String(payload),
                    beacon: true,
                    encrypted,
                    chain_id: None,
                    chain_type: None,
                };
                let reply = match self.forward(request).await {
                    Ok(Value::String(out)) => {
                        Some(page::beacon_envelope(&self.sender_id, &out, encrypted))
                    }
                    Ok(other) => {
                        warn!("[content] beacon reply is not a string: {}", other);
                        self.beacon_error(&DAppError::unknown("malformed beacon reply"))
                    }
                    Err(e) => self.beacon_error(&e),
                };
                if let Some(reply) = reply {
                    self.window.post_message(reply, &event.origin);
                }
            }
        }
    }

    /// Posts background events concerning this page.
    pub fn relay(&self, notification: &ExtensionNotification) {
        let page_origin = self.window.origin();
        match notification {
            ExtensionNotification::DAppsDisconnected { origins }
                if origins.contains(&page_origin) =>
            {
                self.window.post_message(page::dapp_disconnected(), &page_origin);
            }
            ExtensionNotification::ChainSwitched { origin, chain_id } if *origin == page_origin => {
                self.window
                    .post_message(page::chain_switched(chain_id), &page_origin);
            }
            other => debug!("[content] notification not for this page: {:?}", other),
        }
    }

    /// Relays notifications for as long as the returned subscription lives.
    pub fn relay_notifications(self: &Rc<Self>) -> Subscription {
        let router = Rc::downgrade(self);
        self.client.subscribe(move |notification| {
            if let Some(router) = router.upgrade() {
                router.relay(notification);
            }
        })
    }

    async fn forward(&self, request: ExtensionRequest) -> Result<Value, DAppError> {
        match self.client.request(request).await {
            Ok(ExtensionResponse::PageResponse { payload }) => Ok(payload),
            Ok(other) => Err(DAppError::unknown(format!("unexpected response {:?}", other))),
            Err(e) => {
                debug!("[content] page request failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Beacon error for failures the background could not put into a Beacon
    /// message itself. Carries no request id and is never encrypted.
    fn beacon_error(&self, error: &DAppError) -> Option<Value> {
        match encode_message(&BeaconResponse::error(&self.sender_id, "", error)) {
            Ok(encoded) => Some(page::beacon_envelope(&self.sender_id, &encoded, false)),
            Err(e) => {
                warn!("[content] could not encode beacon error: {}", e);
                None
            }
        }
    }
}
