//! Secret retrieval for repository and API tokens
//!
//! Secrets are addressed by `namespace/key`. The keyring backend stores them
//! under service = namespace, account = key.

use std::collections::HashMap;

use keyring::Entry;

use crate::error::{PromoteError, Result};

/// Returns an opaque token for a namespace and key
pub trait SecretSource: Send + Sync {
    fn fetch(&self, namespace: &str, key: &str) -> Result<String>;
}

/// Split `namespace/key`; the key is everything after the last slash
pub fn parse_secret_ref(reference: &str) -> Result<(String, String)> {
    match reference.rsplit_once('/') {
        Some((namespace, key)) if !namespace.is_empty() && !key.is_empty() => {
            Ok((namespace.to_string(), key.to_string()))
        }
        _ => Err(PromoteError::Secret(format!(
            "'{}' is not of the form namespace/key",
            reference
        ))),
    }
}

/// OS keychain backed secrets
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringSecretSource;

impl KeyringSecretSource {
    /// Store a secret in the keychain
    pub fn store(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let entry = Entry::new(namespace, key)
            .map_err(|e| PromoteError::Secret(format!("{}/{}: {}", namespace, key, e)))?;
        entry
            .set_password(value)
            .map_err(|e| PromoteError::Secret(format!("{}/{}: {}", namespace, key, e)))?;
        tracing::info!(
            "Stored secret {}/{} in keyring (len: {})",
            namespace,
            key,
            value.len()
        );
        Ok(())
    }
}

impl SecretSource for KeyringSecretSource {
    fn fetch(&self, namespace: &str, key: &str) -> Result<String> {
        tracing::debug!("Looking up secret {}/{} in keyring", namespace, key);
        let entry = Entry::new(namespace, key)
            .map_err(|e| PromoteError::Secret(format!("{}/{}: {}", namespace, key, e)))?;
        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Found secret {}/{} (len: {})", namespace, key, secret.len());
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(PromoteError::Secret(format!(
                "no secret stored for {}/{}",
                namespace, key
            ))),
            Err(e) => Err(PromoteError::Secret(format!("{}/{}: {}", namespace, key, e))),
        }
    }
}

/// Secrets from environment variables named `<NAMESPACE>_<KEY>`
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretSource;

impl EnvSecretSource {
    pub fn variable_name(namespace: &str, key: &str) -> String {
        format!("{}_{}", namespace, key)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl SecretSource for EnvSecretSource {
    fn fetch(&self, namespace: &str, key: &str) -> Result<String> {
        let var = Self::variable_name(namespace, key);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(PromoteError::Secret(format!(
                "environment variable {} is not set",
                var
            ))),
        }
    }
}

/// In-memory secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource {
    secrets: HashMap<(String, String), String>,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: &str, key: &str, value: &str) -> Self {
        self.secrets
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl SecretSource for StaticSecretSource {
    fn fetch(&self, namespace: &str, key: &str) -> Result<String> {
        self.secrets
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| {
                PromoteError::Secret(format!("no secret stored for {}/{}", namespace, key))
            })
    }
}
