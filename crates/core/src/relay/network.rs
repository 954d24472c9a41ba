//! Named network contexts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ed25519_dalek::SigningKey;

use super::request::ValidationError;
use super::rpc::LedgerRpc;

/// Everything needed to act on one network. Immutable once registered.
pub struct NetworkContext {
    pub name: String,
    pub passphrase: String,
    signing_key: SigningKey,
    rpc: Arc<dyn LedgerRpc>,
}

impl NetworkContext {
    pub fn new(
        name: impl Into<String>,
        passphrase: impl Into<String>,
        signing_key: SigningKey,
        rpc: Arc<dyn LedgerRpc>,
    ) -> Self {
        Self {
            name: name.into(),
            passphrase: passphrase.into(),
            signing_key,
            rpc,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The source account as a `G...` strkey.
    pub fn public_key_strkey(&self) -> String {
        stellar_strkey::ed25519::PublicKey(self.public_key()).to_string()
    }

    pub fn rpc(&self) -> &dyn LedgerRpc {
        self.rpc.as_ref()
    }
}

impl fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkContext")
            .field("name", &self.name)
            .field("passphrase", &self.passphrase)
            .field("source", &self.public_key_strkey())
            .finish_non_exhaustive()
    }
}

/// Network contexts by name. Names are matched exactly.
#[derive(Debug, Default, Clone)]
pub struct NetworkRegistry {
    networks: HashMap<String, Arc<NetworkContext>>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `context` under its name, replacing any previous entry.
    pub fn insert(&mut self, context: NetworkContext) {
        self.networks
            .insert(context.name.clone(), Arc::new(context));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<NetworkContext>, ValidationError> {
        self.networks
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownNetwork(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::rpc::MockLedgerRpc;

    fn context(name: &str) -> NetworkContext {
        NetworkContext::new(
            name,
            "Standalone Network ; February 2017",
            SigningKey::from_bytes(&[7u8; 32]),
            Arc::new(MockLedgerRpc::new(1)),
        )
    }

    #[test]
    fn resolves_registered_names_only() {
        let mut registry = NetworkRegistry::new();
        registry.insert(context("standalone"));

        assert_eq!(registry.resolve("standalone").unwrap().name, "standalone");
        assert_eq!(
            registry.resolve("mainnet-typo").unwrap_err(),
            ValidationError::UnknownNetwork("mainnet-typo".to_string())
        );
        assert!(registry.resolve("Standalone").is_err());
        assert_eq!(registry.names(), ["standalone"]);
    }

    #[test]
    fn public_key_strkey_is_account_id() {
        let ctx = context("standalone");
        let strkey = ctx.public_key_strkey();
        assert!(strkey.starts_with('G'));
        assert_eq!(strkey.len(), 56);
        let decoded = stellar_strkey::ed25519::PublicKey::from_string(&strkey).unwrap();
        assert_eq!(decoded.0, ctx.public_key());
    }

    #[test]
    fn debug_omits_signing_key() {
        let rendered = format!("{:?}", context("standalone"));
        assert!(rendered.contains("standalone"));
        assert!(!rendered.contains("signing_key"));
    }
}
