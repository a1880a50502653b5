use super::frame::Frame;
use super::port::{PortEnd, PortSender};
use super::subscription::Subscription;
use crate::error::{DAppError, IntercomError};
use crate::types::{ExtensionNotification, ExtensionRequest, ExtensionResponse};
use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, warn};

type Reply = Result<ExtensionResponse, DAppError>;
type Listener = Rc<dyn Fn(&ExtensionNotification)>;

/// Content-script/popup end of the message channel.
///
/// Requests are correlated with replies through a pending map keyed by a
/// per-client counter. [`IntercomClient::run`] must be polled for replies and
/// notifications to arrive.
pub struct IntercomClient {
    sender: PortSender,
    inbound: RefCell<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    pending: Rc<RefCell<FxHashMap<u64, oneshot::Sender<Reply>>>>,
    subscribers: Rc<RefCell<Vec<(u64, Listener)>>>,
    next_id: Cell<u64>,
}

impl IntercomClient {
    pub fn new(end: PortEnd) -> Self {
        let (sender, inbound) = end.split();
        Self {
            sender,
            inbound: RefCell::new(Some(inbound)),
            pending: Rc::new(RefCell::new(FxHashMap::default())),
            subscribers: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub async fn request(
        &self,
        request: ExtensionRequest,
    ) -> Result<ExtensionResponse, IntercomError> {
        let req_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().insert(req_id, tx);

        if let Err(e) = self.sender.send(&Frame::Request { req_id, request }) {
            self.pending.borrow_mut().remove(&req_id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(IntercomError::Remote(error)),
            Err(_) => Err(IntercomError::Disconnected),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&ExtensionNotification) + 'static) -> Subscription {
        let id = self.next_id();
        self.subscribers.borrow_mut().push((id, Rc::new(listener)));
        let subscribers = Rc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
            }
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Pumps inbound frames until the port closes. Outstanding requests fail
    /// with [`IntercomError::Disconnected`] afterwards.
    pub async fn run(&self) {
        let Some(mut inbound) = self.inbound.borrow_mut().take() else {
            warn!("[intercom] client run() called twice, ignoring");
            return;
        };

        while let Some(bytes) = inbound.next().await {
            match Frame::decode(&bytes) {
                Ok(Frame::Response { req_id, response }) => self.resolve(req_id, Ok(response)),
                Ok(Frame::Error { req_id, error }) => self.resolve(req_id, Err(error)),
                Ok(Frame::Notify { notification }) => self.emit(&notification),
                Ok(Frame::Request { req_id, .. }) => {
                    debug!("[intercom] client ignoring request frame {}", req_id)
                }
                Err(e) => warn!("[intercom] undecodable frame: {}", e),
            }
        }

        let dropped = std::mem::take(&mut *self.pending.borrow_mut());
        if !dropped.is_empty() {
            debug!("[intercom] port closed with {} pending requests", dropped.len());
        }
    }

    fn resolve(&self, req_id: u64, reply: Reply) {
        let Some(tx) = self.pending.borrow_mut().remove(&req_id) else {
            debug!("[intercom] reply for unknown request {}", req_id);
            return;
        };
        // Requester may have given up already.
        let _ = tx.send(reply);
    }

    fn emit(&self, notification: &ExtensionNotification) {
        let listeners: Vec<Listener> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(notification);
        }
    }
}
