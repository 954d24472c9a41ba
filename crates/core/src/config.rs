//! Relay configuration, read from the environment.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;

use crate::relay::events::DEFAULT_EVENT_LOG_CAPACITY;
use crate::relay::network::{NetworkContext, NetworkRegistry};
use crate::relay::rpc::{RpcError, SorobanRpcClient};
use crate::relay::settlement::SettlementPolicy;

/// Networks the relay can be configured for, with their environment prefix.
pub const KNOWN_NETWORKS: &[(&str, &str)] = &[("standalone", "STANDALONE"), ("futurenet", "FUTURENET")];

/// Contract id used by the platform's endpoint tests unless overridden.
pub const DEFAULT_TEST_CONTRACT_ID: &str =
    "bfe2b969bf755db902578ad8d744e2a813fb5104d0c28fd1f980914333298bca";

pub const DEFAULT_TEST_NETWORK: &str = "standalone";

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{network}: source key is not a valid secret seed")]
    InvalidSourceKey { network: String },
    #[error("{network}: cannot create RPC client: {source}")]
    RpcClient {
        network: String,
        #[source]
        source: RpcError,
    },
}

// =============================================================================
// NetworkConfig
// =============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    /// `S...` secret seed of the source account.
    pub source_key: String,
    pub network_passphrase: String,
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("name", &self.name)
            .field("rpc_url", &self.rpc_url)
            .field("source_key", &"<redacted>")
            .field("network_passphrase", &self.network_passphrase)
            .finish()
    }
}

/// Decode a Stellar `S...` secret seed into a signing key.
pub fn decode_secret_seed(seed: &str) -> Option<SigningKey> {
    let key = stellar_strkey::ed25519::PrivateKey::from_string(seed.trim()).ok()?;
    Some(SigningKey::from_bytes(&key.0))
}

// =============================================================================
// RelayConfig
// =============================================================================

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub networks: Vec<NetworkConfig>,
    /// Shared secret expected in `IFTTT-Service-Key`. Empty rejects everything.
    pub service_key: String,
    pub test_contract_id: String,
    pub test_network: String,
    pub settlement: SettlementPolicy,
    pub event_log_capacity: usize,
    pub rpc_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            service_key: String::new(),
            test_contract_id: DEFAULT_TEST_CONTRACT_ID.to_string(),
            test_network: DEFAULT_TEST_NETWORK.to_string(),
            settlement: SettlementPolicy::default(),
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        for (name, prefix) in KNOWN_NETWORKS {
            let rpc_url = var(&format!("{prefix}_RPC_URL"));
            let source_key = var(&format!("{prefix}_SOURCE_KEY"));
            let passphrase = var(&format!("{prefix}_NETWORK_PASSPHRASE"));
            match (rpc_url, source_key, passphrase) {
                (Some(rpc_url), Some(source_key), Some(network_passphrase)) => {
                    config.networks.push(NetworkConfig {
                        name: name.to_string(),
                        rpc_url,
                        source_key,
                        network_passphrase,
                    });
                }
                (None, None, None) => {}
                _ => {
                    tracing::warn!(
                        network = name,
                        "incomplete network configuration, network disabled"
                    );
                }
            }
        }

        if let Some(key) = lookup("IFTTT_SERVICE_KEY") {
            config.service_key = key;
        }
        if let Some(id) = var("IFTTT_TEST_CONTRACT_ID") {
            config.test_contract_id = id;
        }
        if let Some(network) = var("IFTTT_TEST_NETWORK") {
            config.test_network = network;
        }

        if let Some(v) = var("RELAY_SETTLE_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
            config.settlement.max_attempts = v.max(1);
        }
        if let Some(v) = var("RELAY_SETTLE_DELAY_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.settlement.delay = Duration::from_secs(v);
        }
        if let Some(v) = var("RELAY_FAIL_FAST_STATUSES") {
            config.settlement.fail_fast_statuses = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = var("RELAY_EVENT_LOG_CAPACITY").and_then(|v| v.parse::<usize>().ok()) {
            config.event_log_capacity = v.max(1);
        }
        if let Some(v) = var("RELAY_RPC_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.rpc_timeout = Duration::from_secs(v);
        }

        config
    }

    pub fn is_network_configured(&self, name: &str) -> bool {
        self.networks.iter().any(|n| n.name == name)
    }

    /// Create an RPC client and signing key for every configured network.
    pub fn build_registry(&self) -> Result<NetworkRegistry, ConfigError> {
        let mut registry = NetworkRegistry::new();
        for network in &self.networks {
            let signing_key = decode_secret_seed(&network.source_key).ok_or_else(|| {
                ConfigError::InvalidSourceKey {
                    network: network.name.clone(),
                }
            })?;
            let rpc = SorobanRpcClient::new(&network.rpc_url, self.rpc_timeout).map_err(|source| {
                ConfigError::RpcClient {
                    network: network.name.clone(),
                    source,
                }
            })?;
            let context = NetworkContext::new(
                &network.name,
                &network.network_passphrase,
                signing_key,
                Arc::new(rpc),
            );
            tracing::info!(
                network = %network.name,
                rpc_url = %network.rpc_url,
                source = %context.public_key_strkey(),
                "network registered"
            );
            registry.insert(context);
        }
        Ok(registry)
    }
}

// =============================================================================
// Tests
// =============================================================================
