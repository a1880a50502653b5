use super::dapp::{AppMetadata, DAppPermission};
use super::network::Network;
use crate::config::NetworkConfig;
use serde::{Deserialize, Serialize};

/// Permission record persisted per origin once the user grants a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppSession {
    pub network: Network,
    pub app_meta: AppMetadata,
    pub pkh: String,
    pub public_key: String,
}

impl DAppSession {
    /// A cached grant can be reused when both the network and the app name
    /// are unchanged.
    pub fn matches(&self, network: &Network, app_meta: &AppMetadata) -> bool {
        self.network.same_as(network) && self.app_meta.name == app_meta.name
    }

    pub fn permission(&self, networks: &NetworkConfig) -> Option<DAppPermission> {
        Some(DAppPermission {
            pkh: self.pkh.clone(),
            public_key: self.public_key.clone(),
            rpc: self.network.rpc_url(networks)?,
        })
    }
}
