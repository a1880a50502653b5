use super::geometry::popup_spec;
use super::BackgroundContext;
use crate::error::DAppError;
use crate::intercom::{PortId, RequestHandler, Subscription};
use crate::timer;
use crate::types::{
    ConfirmationDecision, ConfirmationPayload, ExtensionRequest, ExtensionResponse,
};
use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Ack = oneshot::Sender<Result<(), DAppError>>;
type DecisionSender = mpsc::UnboundedSender<(ConfirmationDecision, Ack)>;

struct PendingEntry {
    payload: ConfirmationPayload,
    decisions: DecisionSender,
}

/// Confirmations currently waiting on a popup, keyed by correlation id.
#[derive(Clone, Default)]
pub struct ConfirmationRegistry {
    pending: Rc<RefCell<FxHashMap<String, PendingEntry>>>,
}

impl ConfirmationRegistry {
    fn register(
        &self,
        id: &str,
        payload: ConfirmationPayload,
        decisions: DecisionSender,
    ) -> Subscription {
        self.pending
            .borrow_mut()
            .insert(id.to_string(), PendingEntry { payload, decisions });
        let pending = Rc::downgrade(&self.pending);
        let id = id.to_string();
        Subscription::new(move || {
            if let Some(pending) = pending.upgrade() {
                pending.borrow_mut().remove(&id);
            }
        })
    }

    pub fn payload(&self, id: &str) -> Option<ConfirmationPayload> {
        self.pending.borrow().get(id).map(|e| e.payload.clone())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Hands `decision` to the waiting confirmation and resolves once it has
    /// been acted upon. `NotFound` if `id` is unknown or already settled.
    pub async fn decide(&self, id: &str, decision: ConfirmationDecision) -> Result<(), DAppError> {
        let decisions = self
            .pending
            .borrow()
            .get(id)
            .map(|e| e.decisions.clone())
            .ok_or(DAppError::NotFound)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        decisions
            .unbounded_send((decision, ack_tx))
            .map_err(|_| DAppError::NotFound)?;

        // A dropped ack means the confirmation ended before looking at us.
        ack_rx.await.unwrap_or(Err(DAppError::NotFound))
    }
}

/// Answers the popup: payload fetches and user decisions.
pub struct ConfirmationHandler {
    registry: ConfirmationRegistry,
}

impl ConfirmationHandler {
    pub fn new(registry: ConfirmationRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait(?Send)]
impl RequestHandler for ConfirmationHandler {
    async fn handle(
        &self,
        _port: PortId,
        request: &ExtensionRequest,
    ) -> Option<Result<ExtensionResponse, DAppError>> {
        if let ExtensionRequest::GetPayloadRequest { id } = request {
            return Some(
                self.registry
                    .payload(id)
                    .map(|payload| ExtensionResponse::GetPayloadResponse { payload })
                    .ok_or(DAppError::NotFound),
            );
        }

        let (id, decision) = request.as_decision()?;
        Some(
            self.registry
                .decide(id, decision)
                .await
                .map(|()| ExtensionResponse::ConfirmationResponse),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmState {
    Created,
    AwaitingDecision,
    Approved,
    Declined,
    TimedOut,
    WindowClosed,
}

impl ConfirmState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConfirmState::Approved
                | ConfirmState::Declined
                | ConfirmState::TimedOut
                | ConfirmState::WindowClosed
        )
    }
}

struct Lifecycle {
    id: String,
    state: ConfirmState,
}

impl Lifecycle {
    fn new(id: String) -> Self {
        Self {
            id,
            state: ConfirmState::Created,
        }
    }

    fn transition(&mut self, next: ConfirmState) {
        use ConfirmState::*;
        let allowed = match (self.state, next) {
            (current, _) if current.is_terminal() => false,
            (Created, AwaitingDecision) => true,
            (AwaitingDecision, to) => to.is_terminal(),
            _ => false,
        };
        if allowed {
            debug!("[confirm] {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        } else {
            warn!("[confirm] {} rejected transition {:?} -> {:?}", self.id, self.state, next);
        }
    }
}

/// Opens the confirmation popup for `payload` and waits for exactly one of:
/// a user decision, the popup being closed, or `timeout`.
///
/// A confirmed decision is passed to `on_decision`, whose result becomes the
/// result of the call and is also reported back to the popup. Everything
/// else resolves to `NotGranted`. The popup is closed by the extension unless
/// the user already closed it.
pub async fn request_confirm<T, F, Fut>(
    ctx: &BackgroundContext,
    payload: ConfirmationPayload,
    timeout: Duration,
    on_decision: F,
) -> Result<T, DAppError>
where
    F: FnOnce(ConfirmationDecision) -> Fut,
    Fut: Future<Output = Result<T, DAppError>>,
{
    let id = Uuid::new_v4().to_string();
    let mut lifecycle = Lifecycle::new(id.clone());
    let kind = payload.kind();
    let origin = payload.origin().to_string();

    let (decision_tx, mut decisions) = mpsc::unbounded();
    let registration = ctx.confirmations.register(&id, payload, decision_tx);
    let mut removed = ctx.windows.subscribe_removed().fuse();

    let url = format!("{}#?id={}", ctx.config.popup.page, id);
    let bounds = ctx.windows.last_focused_bounds().await;
    let window = ctx
        .windows
        .create_popup(&popup_spec(url, bounds, &ctx.config.popup))
        .await?;

    lifecycle.transition(ConfirmState::AwaitingDecision);
    info!(
        "[confirm] {} ({} from {}) waiting in window {}, {} pending",
        id,
        kind,
        origin,
        window,
        ctx.confirmations.len()
    );

    let timer = timer::sleep(timeout).fuse();
    futures::pin_mut!(timer);

    let decided = loop {
        futures::select! {
            next = decisions.next() => match next {
                Some(decided) => break Some(decided),
                None => {
                    lifecycle.transition(ConfirmState::Declined);
                    break None;
                }
            },
            closed = removed.next() => {
                if closed == Some(window) {
                    lifecycle.transition(ConfirmState::WindowClosed);
                    break None;
                }
            },
            () = timer => {
                lifecycle.transition(ConfirmState::TimedOut);
                break None;
            },
        }
    };

    // Late decisions and window events are no longer observed past here.
    drop(removed);

    let (outcome, ack) = match decided {
        Some((decision, ack)) if decision.confirmed() => {
            lifecycle.transition(ConfirmState::Approved);
            (on_decision(decision).await, Some(ack))
        }
        Some((_, ack)) => {
            lifecycle.transition(ConfirmState::Declined);
            (Err(DAppError::NotGranted), Some(ack))
        }
        None => (Err(DAppError::NotGranted), None),
    };

    drop(registration);
    drop(decisions);

    if lifecycle.state != ConfirmState::WindowClosed {
        if let Err(e) = ctx.windows.remove(window).await {
            warn!("[confirm] {} failed to close window: {}", id, e);
        }
    }

    if let Some(ack) = ack {
        let reply = match &outcome {
            Ok(_) | Err(DAppError::NotGranted) => Ok(()),
            Err(e) => Err(e.clone()),
        };
        let _ = ack.send(reply);
    }

    info!("[confirm] {} settled as {:?}", id, lifecycle.state);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppMetadata;

    fn connect_payload() -> ConfirmationPayload {
        ConfirmationPayload::Connect {
            origin: "https://dapp.example".into(),
            network_rpc: "https://rpc".into(),
            app_meta: AppMetadata { name: "Foo".into() },
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut lc = Lifecycle::new("x".into());
        lc.transition(ConfirmState::Approved);
        assert_eq!(lc.state, ConfirmState::Created);

        lc.transition(ConfirmState::AwaitingDecision);
        lc.transition(ConfirmState::TimedOut);
        assert!(lc.state.is_terminal());

        lc.transition(ConfirmState::Approved);
        assert_eq!(lc.state, ConfirmState::TimedOut);
    }

    #[tokio::test]
    async fn test_registry_unknown_and_released_ids() {
        let registry = ConfirmationRegistry::default();
        assert_eq!(
            registry
                .decide("nope", ConfirmationDecision::Generic { confirmed: true })
                .await,
            Err(DAppError::NotFound)
        );

        let (tx, rx) = mpsc::unbounded();
        let sub = registry.register("abc", connect_payload(), tx);
        assert_eq!(registry.payload("abc"), Some(connect_payload()));
        assert_eq!(registry.len(), 1);

        drop(sub);
        drop(rx);
        assert!(registry.is_empty());
        assert_eq!(registry.payload("abc"), None);
    }

    #[tokio::test]
    async fn test_decision_for_closed_receiver_is_not_found() {
        let registry = ConfirmationRegistry::default();
        let (tx, rx) = mpsc::unbounded();
        let _sub = registry.register("abc", connect_payload(), tx);
        drop(rx);
        assert_eq!(
            registry
                .decide("abc", ConfirmationDecision::Sign { confirmed: true })
                .await,
            Err(DAppError::NotFound)
        );
    }
}
