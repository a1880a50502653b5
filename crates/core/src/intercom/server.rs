use super::client::IntercomClient;
use super::frame::Frame;
use super::port::{channel, PortEnd, PortId, PortSender};
use super::subscription::Subscription;
use crate::error::{DAppError, IntercomError};
use crate::types::{ExtensionNotification, ExtensionRequest, ExtensionResponse};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::future::LocalBoxFuture;
use futures::stream::{self, FuturesUnordered, LocalBoxStream, SelectAll};
use futures::{FutureExt, StreamExt};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Background-side request listener.
#[async_trait(?Send)]
pub trait RequestHandler {
    /// `None` means "not handled here, let the next listener decide".
    async fn handle(
        &self,
        port: PortId,
        request: &ExtensionRequest,
    ) -> Option<Result<ExtensionResponse, DAppError>>;
}

type HandlerEntry = (u64, Rc<dyn RequestHandler>);
type DisconnectEntry = (u64, PortId, Box<dyn FnOnce()>);

#[derive(Default)]
struct ServerState {
    next_id: u64,
    handlers: Vec<HandlerEntry>,
    disconnect_listeners: Vec<DisconnectEntry>,
    ports: FxHashMap<PortId, PortSender>,
}

impl ServerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

enum PortEvent {
    Frame(PortId, Vec<u8>),
    Closed(PortId),
}

type Attached = (PortId, mpsc::UnboundedReceiver<Vec<u8>>);

/// Background end of the message channel. Accepts any number of ports
/// (content scripts, popups) and answers their requests through the
/// registered [`RequestHandler`]s, first answer wins.
#[derive(Clone)]
pub struct IntercomServer {
    state: Rc<RefCell<ServerState>>,
    attach_tx: mpsc::UnboundedSender<Attached>,
    attach_rx: Rc<RefCell<Option<mpsc::UnboundedReceiver<Attached>>>>,
}

impl Default for IntercomServer {
    fn default() -> Self {
        Self::new()
    }
}

impl IntercomServer {
    pub fn new() -> Self {
        let (attach_tx, attach_rx) = mpsc::unbounded();
        Self {
            state: Rc::new(RefCell::new(ServerState::default())),
            attach_tx,
            attach_rx: Rc::new(RefCell::new(Some(attach_rx))),
        }
    }

    /// Opens an in-process port and returns the client for its other end.
    pub fn connect(&self) -> IntercomClient {
        let (ours, theirs) = channel();
        self.attach(ours);
        IntercomClient::new(theirs)
    }

    /// Registers an externally created port end (e.g. a runtime port).
    pub fn attach(&self, end: PortEnd) -> PortId {
        let (sender, rx) = end.split();
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            state.ports.insert(id, sender);
            id
        };
        if self.attach_tx.unbounded_send((id, rx)).is_err() {
            warn!("[intercom] server loop gone, port {} will never be served", id);
        }
        debug!("[intercom] port {} attached", id);
        id
    }

    pub fn on_request(&self, handler: Rc<dyn RequestHandler>) -> Subscription {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            state.handlers.push((id, handler));
            id
        };
        let state = Rc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().handlers.retain(|(hid, _)| *hid != id);
            }
        })
    }

    /// `callback` fires once when `port` closes, unless the subscription is
    /// released first.
    pub fn on_disconnect(&self, port: PortId, callback: impl FnOnce() + 'static) -> Subscription {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            state
                .disconnect_listeners
                .push((id, port, Box::new(callback)));
            id
        };
        let state = Rc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .borrow_mut()
                    .disconnect_listeners
                    .retain(|(lid, _, _)| *lid != id);
            }
        })
    }

    pub fn notify(
        &self,
        port: PortId,
        notification: ExtensionNotification,
    ) -> Result<(), IntercomError> {
        let sender = self
            .state
            .borrow()
            .ports
            .get(&port)
            .cloned()
            .ok_or(IntercomError::Disconnected)?;
        sender.send(&Frame::Notify { notification })
    }

    /// Sends `notification` to every open port.
    pub fn broadcast(&self, notification: ExtensionNotification) {
        let senders: Vec<(PortId, PortSender)> = self
            .state
            .borrow()
            .ports
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        let frame = Frame::Notify { notification };
        for (id, sender) in senders {
            if let Err(e) = sender.send(&frame) {
                debug!("[intercom] broadcast to port {} failed: {}", id, e);
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.state.borrow().handlers.len()
    }

    pub fn disconnect_listener_count(&self) -> usize {
        self.state.borrow().disconnect_listeners.len()
    }

    pub fn port_count(&self) -> usize {
        self.state.borrow().ports.len()
    }

    /// Runs `request` through the handlers in registration order.
    pub async fn dispatch(
        &self,
        port: PortId,
        request: &ExtensionRequest,
    ) -> Result<ExtensionResponse, DAppError> {
        // Snapshot so handlers may (un)register while we await them.
        let handlers: Vec<Rc<dyn RequestHandler>> = self
            .state
            .borrow()
            .handlers
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        for handler in handlers {
            if let Some(result) = handler.handle(port, request).await {
                return result;
            }
        }

        debug!("[intercom] no handler for request on port {}", port);
        Err(DAppError::unknown(IntercomError::Unhandled.to_string()))
    }

    /// Drives every attached port until the server is dropped. Requests are
    /// processed concurrently; replies go back on the port they came from.
    pub async fn serve(&self) {
        let Some(mut attached) = self.attach_rx.borrow_mut().take() else {
            warn!("[intercom] serve() called twice, ignoring");
            return;
        };

        let mut ports: SelectAll<LocalBoxStream<'static, PortEvent>> = SelectAll::new();
        let mut inflight: FuturesUnordered<LocalBoxFuture<'static, ()>> = FuturesUnordered::new();

        info!("[intercom] server loop started");

        loop {
            futures::select! {
                next = attached.next() => match next {
                    Some((id, rx)) => ports.push(port_events(id, rx)),
                    None => break,
                },
                event = ports.select_next_some() => match event {
                    PortEvent::Frame(id, bytes) => match Frame::decode(&bytes) {
                        Ok(Frame::Request { req_id, request }) => {
                            inflight.push(self.clone().respond(id, req_id, request));
                        }
                        Ok(other) => debug!(
                            "[intercom] ignoring non-request frame from port {}: {:?}",
                            id, other
                        ),
                        Err(e) => warn!("[intercom] undecodable frame from port {}: {}", id, e),
                    },
                    PortEvent::Closed(id) => self.close_port(id),
                },
                () = inflight.select_next_some() => {},
            }
        }

        info!("[intercom] server loop ended");
    }

    fn respond(
        self,
        port: PortId,
        req_id: u64,
        request: ExtensionRequest,
    ) -> LocalBoxFuture<'static, ()> {
        async move {
            let frame = match self.dispatch(port, &request).await {
                Ok(response) => Frame::Response { req_id, response },
                Err(error) => Frame::Error { req_id, error },
            };
            let sender = self.state.borrow().ports.get(&port).cloned();
            match sender {
                Some(sender) => {
                    if let Err(e) = sender.send(&frame) {
                        warn!("[intercom] reply {} to port {} dropped: {}", req_id, port, e);
                    }
                }
                None => debug!("[intercom] port {} closed before reply {}", port, req_id),
            }
        }
        .boxed_local()
    }

    fn close_port(&self, port: PortId) {
        let callbacks: Vec<Box<dyn FnOnce()>> = {
            let mut state = self.state.borrow_mut();
            state.ports.remove(&port);
            let (fire, keep): (Vec<DisconnectEntry>, Vec<DisconnectEntry>) = state
                .disconnect_listeners
                .drain(..)
                .partition(|(_, p, _)| *p == port);
            state.disconnect_listeners = keep;
            fire.into_iter().map(|(_, _, cb)| cb).collect()
        };

        debug!(
            "[intercom] port {} closed ({} disconnect listeners)",
            port,
            callbacks.len()
        );
        for cb in callbacks {
            cb();
        }
    }
}

fn port_events(
    id: PortId,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
) -> LocalBoxStream<'static, PortEvent> {
    rx.map(move |bytes| PortEvent::Frame(id, bytes))
        .chain(stream::once(async move { PortEvent::Closed(id) }))
        .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{self, Either};
    use std::cell::Cell;

    struct Echo;

    #[async_trait(?Send)]
    impl RequestHandler for Echo {
        async fn handle(
            &self,
            _port: PortId,
            request: &ExtensionRequest,
        ) -> Option<Result<ExtensionResponse, DAppError>> {
            match request {
                ExtensionRequest::PageRequest { payload, .. } => Some(Ok(
                    ExtensionResponse::PageResponse {
                        payload: payload.clone(),
                    },
                )),
                _ => None,
            }
        }
    }

    struct Refuse;

    #[async_trait(?Send)]
    impl RequestHandler for Refuse {
        async fn handle(
            &self,
            _port: PortId,
            request: &ExtensionRequest,
        ) -> Option<Result<ExtensionResponse, DAppError>> {
            match request {
                ExtensionRequest::GetPayloadRequest { .. } => Some(Err(DAppError::NotFound)),
                _ => None,
            }
        }
    }

    fn page_request(payload: serde_json::Value) -> ExtensionRequest {
        ExtensionRequest::PageRequest {
            origin: "https://dapp.example".into(),
            payload,
            beacon: false,
            encrypted: false,
            chain_id: None,
            chain_type: None,
        }
    }

    /// Runs `scenario` while the server and client loops are driven.
    async fn with_loops<F: std::future::Future>(
        server: &IntercomServer,
        client: &IntercomClient,
        scenario: F,
    ) -> F::Output {
        let loops = future::join(server.serve(), client.run());
        futures::pin_mut!(loops);
        futures::pin_mut!(scenario);
        match future::select(scenario, loops).await {
            Either::Left((out, _)) => out,
            Either::Right(_) => panic!("loops ended before the scenario"),
        }
    }

    #[tokio::test]
    async fn test_request_reply_and_fallthrough() {
        let server = IntercomServer::new();
        let _refuse = server.on_request(Rc::new(Refuse));
        let _echo = server.on_request(Rc::new(Echo));
        let client = server.connect();

        with_loops(&server, &client, async {
            let resp = client
                .request(page_request(serde_json::json!({ "x": 1 })))
                .await
                .unwrap();
            assert_eq!(
                resp,
                ExtensionResponse::PageResponse {
                    payload: serde_json::json!({ "x": 1 })
                }
            );

            let err = client
                .request(ExtensionRequest::GetPayloadRequest { id: "a".into() })
                .await
                .unwrap_err();
            assert_eq!(err, IntercomError::Remote(DAppError::NotFound));

            let err = client
                .request(ExtensionRequest::SignConfirmationRequest {
                    id: "a".into(),
                    confirmed: true,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, IntercomError::Remote(DAppError::Unknown(_))));
        })
        .await;
    }

    #[tokio::test]
    async fn test_dropping_subscription_unregisters_handler() {
        let server = IntercomServer::new();
        let sub = server.on_request(Rc::new(Echo));
        assert_eq!(server.handler_count(), 1);
        drop(sub);
        assert_eq!(server.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_fires_once_for_the_right_port() {
        let server = IntercomServer::new();
        let first = server.connect();
        let second = server.connect();

        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        let _sub = server.on_disconnect(1, move || f.set(f.get() + 1));
        let released = server.on_disconnect(2, || panic!("released listener must not fire"));
        released.dispose();
        assert_eq!(server.disconnect_listener_count(), 1);

        drop(first);
        with_loops(&server, &second, async {
            while fired.get() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await;

        assert_eq!(fired.get(), 1);
        assert_eq!(server.port_count(), 1);
        assert_eq!(server.disconnect_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let server = IntercomServer::new();
        let client = server.connect();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = client.subscribe(move |n| s.borrow_mut().push(n.clone()));

        server
            .notify(
                1,
                ExtensionNotification::ChainSwitched {
                    origin: "https://dapp.example".into(),
                    chain_id: "0x1".into(),
                },
            )
            .unwrap();
        server.broadcast(ExtensionNotification::DAppsDisconnected {
            origins: vec!["https://dapp.example".into()],
        });

        with_loops(&server, &client, async {
            while seen.borrow().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await;

        assert!(matches!(
            seen.borrow()[1],
            ExtensionNotification::DAppsDisconnected { .. }
        ));
        let gone = ExtensionNotification::DAppsDisconnected { origins: vec![] };
        assert!(server.notify(42, gone).is_err());
    }
}
