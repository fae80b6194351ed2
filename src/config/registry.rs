//! Named TLS policies and server public keys.
//!
//! A DSN only carries names (`tls=internal`, `serverPubKey=prod`); the
//! objects behind them live in a [`Registry`] that is handed to
//! normalization. Lookups return clones so a resolved `Config` never shares
//! state with the registry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::dsn::parse_bool;
use super::tls::{ServerPubKey, TlsPolicy};
use super::DsnError;

#[derive(Debug, Default)]
pub struct Registry {
    tls: RwLock<HashMap<String, TlsPolicy>>,
    pub_keys: RwLock<HashMap<String, ServerPubKey>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom TLS policy under `name`.
    ///
    /// Boolean spellings, `skip-verify` and `preferred` are reserved for the
    /// built-in presets.
    pub fn register_tls_config(
        &self,
        name: impl Into<String>,
        policy: TlsPolicy,
    ) -> Result<(), DsnError> {
        let name = name.into();
        let lower = name.to_ascii_lowercase();
        if parse_bool(&name).is_some() || lower == "skip-verify" || lower == "preferred" {
            return Err(DsnError::ReservedTlsName(name));
        }
        self.tls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, policy);
        Ok(())
    }

    pub fn deregister_tls_config(&self, name: &str) -> Option<TlsPolicy> {
        self.tls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn tls_config(&self, name: &str) -> Option<TlsPolicy> {
        self.tls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn register_server_pub_key(&self, name: impl Into<String>, key: ServerPubKey) {
        self.pub_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), key);
    }

    pub fn deregister_server_pub_key(&self, name: &str) -> Option<ServerPubKey> {
        self.pub_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn server_pub_key(&self, name: &str) -> Option<ServerPubKey> {
        self.pub_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        let registry = Registry::new();
        for name in ["true", "False", "1", "skip-verify", "PREFERRED"] {
            assert_eq!(
                registry.register_tls_config(name, TlsPolicy::verified()),
                Err(DsnError::ReservedTlsName(name.to_string()))
            );
        }
    }

    #[test]
    fn test_register_lookup_deregister() {
        let registry = Registry::new();
        let policy = TlsPolicy {
            server_name: Some("db.internal".to_string()),
            ..TlsPolicy::default()
        };
        registry.register_tls_config("internal", policy.clone()).unwrap();
        assert_eq!(registry.tls_config("internal"), Some(policy.clone()));
        assert_eq!(registry.deregister_tls_config("internal"), Some(policy));
        assert_eq!(registry.tls_config("internal"), None);

        let key = ServerPubKey::from_der(vec![0x30, 0x82]);
        registry.register_server_pub_key("prod", key.clone());
        assert_eq!(registry.server_pub_key("prod"), Some(key));
        assert!(registry.deregister_server_pub_key("prod").is_some());
        assert!(registry.server_pub_key("prod").is_none());
    }
}
