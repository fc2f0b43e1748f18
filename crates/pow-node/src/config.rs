//! Node connection settings read from a `bitcoin.conf` style file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use pow_core::Network;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NodeError, Result};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything needed to reach a node's JSON-RPC interface.
///
/// The client only builds request bodies. Credentials, timeout and TLS are
/// handed to the [`Transport`](crate::Transport) with every request, which
/// applies them when talking to [`url`](Self::url).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// HTTP basic auth user (`rpcuser`).
    pub user: String,
    /// HTTP basic auth password (`rpcpassword`).
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Per-request timeout for the transport (`rpctimeout`).
    pub timeout_secs: u64,
    /// Connect over HTTPS (`rpcssl`).
    pub use_tls: bool,
    pub network: Network,
}

impl RpcConfig {
    /// Settings for a node on localhost with the network's default port.
    pub fn local(network: Network, user: &str, password: &str) -> Self {
        RpcConfig {
            user: user.to_string(),
            password: password.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: network.default_rpc_port(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            use_tls: false,
            network,
        }
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parse `key=value` lines; `#` starts a comment.
    ///
    /// Lines that cannot be parsed are logged and skipped. `rpcuser` and
    /// `rpcpassword` are required.
    pub fn parse(text: &str) -> Result<Self> {
        let values = parse_pairs(text);
        debug!(parameters = values.len(), "read node configuration");

        let network = if flag(&values, "regtest") {
            Network::Regtest
        } else if flag(&values, "testnet") {
            Network::Testnet
        } else {
            match values.get("chain") {
                Some(chain) => Network::from_str(chain)
                    .ok_or_else(|| NodeError::Config(format!("unknown chain {:?}", chain)))?,
                None => Network::Mainnet,
            }
        };

        let required = |key: &str| {
            values
                .get(key)
                .cloned()
                .ok_or_else(|| NodeError::Config(format!("{} is not set", key)))
        };
        let user = required("rpcuser")?;
        let password = required("rpcpassword")?;

        let host = values
            .get("rpcconnect")
            .or_else(|| values.get("rpcserver"))
            .cloned()
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match values.get("rpcport") {
            Some(port) => port
                .parse()
                .map_err(|_| NodeError::Config(format!("invalid rpcport {:?}", port)))?,
            None => network.default_rpc_port(),
        };

        let timeout_secs = match values.get("rpctimeout") {
            Some(timeout) => timeout
                .parse()
                .map_err(|_| NodeError::Config(format!("invalid rpctimeout {:?}", timeout)))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(RpcConfig {
            user,
            password,
            host,
            port,
            timeout_secs,
            use_tls: flag(&values, "rpcssl"),
            network,
        })
    }

    /// Endpoint URL for JSON-RPC requests.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_pairs(text: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = match line.find('#') {
            Some(at) => &line[..at],
            None => line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!(line = lineno + 1, "could not parse configuration line");
            continue;
        };
        values.insert(key.trim().to_lowercase(), unquote(value.trim()).to_string());
    }
    values
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn flag(values: &BTreeMap<String, String>, key: &str) -> bool {
    values
        .get(key)
        .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "yes" | "true" | "y" | "t"))
}
