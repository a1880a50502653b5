use crate::config::NetworkConfig;
use serde::{Deserialize, Serialize};

/// Network a DApp asks to operate on: either one of the wallet's named
/// networks or a custom RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Network {
    Named(String),
    Custom { name: String, rpc: String },
}

impl Network {
    pub fn named(name: impl Into<String>) -> Self {
        Network::Named(name.into())
    }

    pub fn custom(name: impl Into<String>, rpc: impl Into<String>) -> Self {
        Network::Custom {
            name: name.into(),
            rpc: rpc.into(),
        }
    }

    /// Named networks must be known to the wallet; custom ones need a name
    /// and an http(s) RPC url.
    pub fn is_allowed(&self, networks: &NetworkConfig) -> bool {
        match self {
            Network::Named(name) => networks.known.contains_key(name),
            Network::Custom { name, rpc } => {
                !name.trim().is_empty()
                    && url::Url::parse(rpc)
                        .map(|u| matches!(u.scheme(), "http" | "https"))
                        .unwrap_or(false)
            }
        }
    }

    pub fn rpc_url(&self, networks: &NetworkConfig) -> Option<String> {
        match self {
            Network::Named(name) => networks
                .known
                .get(name)
                .map(|rpc| remove_last_slash(rpc).to_string()),
            Network::Custom { rpc, .. } => Some(remove_last_slash(rpc).to_string()),
        }
    }

    /// Two named networks match by name, two custom ones by RPC url (ignoring a
    /// trailing slash). A named network never equals a custom one.
    pub fn same_as(&self, other: &Network) -> bool {
        match (self, other) {
            (Network::Named(a), Network::Named(b)) => a == b,
            (Network::Custom { rpc: a, .. }, Network::Custom { rpc: b, .. }) => {
                remove_last_slash(a) == remove_last_slash(b)
            }
            _ => false,
        }
    }
}

fn remove_last_slash(s: &str) -> &str {
    s.strip_suffix('/').unwrap_or(s)
}
