use std::collections::BTreeMap;

use thiserror::Error;

/// Failures reported by a vault backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The backend cannot be reached or unlocked
    #[error("Vault unavailable: {reason}")]
    Unavailable { reason: String },

    /// A single read or write failed
    #[error("Vault operation on {key} failed: {reason}")]
    Operation { key: String, reason: String },
}

/// String-keyed secret storage. Encryption at rest is the backend's concern.
pub trait Vault: Send {
    fn store(&mut self, key: &str, value: &str) -> Result<(), VaultError>;

    fn retrieve(&self, key: &str) -> Result<Option<String>, VaultError>;

    /// Keys starting with `prefix`, in lexical order
    fn list(&self, prefix: &str) -> Result<Vec<String>, VaultError>;

    fn delete(&mut self, key: &str) -> Result<bool, VaultError>;
}

/// In-process vault, for tests and single-process deployments
#[derive(Clone, Debug, Default)]
pub struct MemoryVault {
    entries: BTreeMap<String, String>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Vault for MemoryVault {
    fn store(&mut self, key: &str, value: &str) -> Result<(), VaultError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.entries.get(key).cloned())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, VaultError> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn delete(&mut self, key: &str) -> Result<bool, VaultError> {
        Ok(self.entries.remove(key).is_some())
    }
}
