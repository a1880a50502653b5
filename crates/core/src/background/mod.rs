/*!
Background context: the only place that holds permissions and talks to the
vault.

A single [`BackgroundContext`] is built at startup and passed to every
handler. [`BackgroundContext::start`] registers the intercom handlers; the
returned subscriptions keep them alive.
*/
pub mod beacon;
pub mod confirm;
pub mod dapp;
pub mod geometry;
pub mod preview;
pub mod services;
pub mod store;


pub use confirm::{request_confirm, ConfirmState, ConfirmationHandler, ConfirmationRegistry};
pub use services::{
    BeaconCrypto, NodeClient, OperationParser, PermissionStore, PopupSpec, Vault, WindowBounds,
    WindowId, WindowManager,
};
pub use store::MemoryPermissionStore;

use crate::config::BridgeConfig;
use crate::error::DAppError;
use crate::intercom::{IntercomServer, PortId, RequestHandler, Subscription};
use crate::types::{ChainType, DAppSession, ExtensionRequest, ExtensionResponse};
use async_trait::async_trait;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

/// External services the background depends on.
pub struct Collaborators {
    pub store: Rc<dyn PermissionStore>,
    pub vault: Rc<dyn Vault>,
    pub node: Rc<dyn NodeClient>,
    pub windows: Rc<dyn WindowManager>,
    pub parser: Rc<dyn OperationParser>,
    pub beacon_crypto: Option<Rc<dyn BeaconCrypto>>,
}

pub struct BackgroundContext {
    pub config: BridgeConfig,
    pub intercom: IntercomServer,
    pub confirmations: ConfirmationRegistry,
    pub store: Rc<dyn PermissionStore>,
    pub vault: Rc<dyn Vault>,
    pub node: Rc<dyn NodeClient>,
    pub windows: Rc<dyn WindowManager>,
    pub parser: Rc<dyn OperationParser>,
    pub beacon_crypto: Option<Rc<dyn BeaconCrypto>>,
}

impl BackgroundContext {
    pub fn new(
        config: BridgeConfig,
        intercom: IntercomServer,
        collaborators: Collaborators,
    ) -> Rc<Self> {
        let Collaborators {
            store,
            vault,
            node,
            windows,
            parser,
            beacon_crypto,
        } = collaborators;

        Rc::new(Self {
            config,
            intercom,
            confirmations: ConfirmationRegistry::default(),
            store,
            vault,
            node,
            windows,
            parser,
            beacon_crypto,
        })
    }

    /// Registers the page and popup handlers on the intercom server.
    pub fn start(self: &Rc<Self>) -> Vec<Subscription> {
        let subs = vec![
            self.intercom.on_request(Rc::new(PageRequestHandler {
                ctx: Rc::downgrade(self),
            })),
            self.intercom.on_request(Rc::new(ConfirmationHandler::new(
                self.confirmations.clone(),
            ))),
        ];
        info!(
            "[dapp] background started (sender id {}, {} known networks)",
            self.config.sender_id,
            self.config.networks.known.len()
        );
        subs
    }

    pub async fn dapp_sessions(&self) -> Result<Vec<(String, DAppSession)>, DAppError> {
        dapp::dapp_sessions(self).await
    }

    /// Revokes the grants of `origins` on behalf of the wallet UI.
    pub async fn remove_dapps(&self, origins: Vec<String>) -> Result<(), DAppError> {
        dapp::remove_dapps(self, origins).await
    }

    pub async fn handle_page_request(
        &self,
        origin: &str,
        payload: serde_json::Value,
        is_beacon: bool,
        encrypted: bool,
        chain_type: Option<ChainType>,
    ) -> Result<serde_json::Value, DAppError> {
        if chain_type == Some(ChainType::Evm) {
            debug!("[dapp] rejecting EVM request from {}", origin);
            return Err(DAppError::unknown("EVM requests are not supported"));
        }
        if is_beacon {
            beacon::handle_beacon_payload(self, origin, payload, encrypted).await
        } else {
            dapp::handle_page_payload(self, origin, payload).await
        }
    }
}

/// Routes `PageRequest`s from content scripts into the DApp handlers.
struct PageRequestHandler {
    ctx: Weak<BackgroundContext>,
}

#[async_trait(?Send)]
impl RequestHandler for PageRequestHandler {
    async fn handle(
        &self,
        _port: PortId,
        request: &ExtensionRequest,
    ) -> Option<Result<ExtensionResponse, DAppError>> {
        let ExtensionRequest::PageRequest {
            origin,
            payload,
            beacon,
            encrypted,
            chain_type,
            ..
        } = request
        else {
            return None;
        };
        let ctx = self.ctx.upgrade()?;

        let result = ctx
            .handle_page_request(origin, payload.clone(), *beacon, *encrypted, *chain_type)
            .await
            .map(|payload| ExtensionResponse::PageResponse { payload });
        Some(result)
    }
}
