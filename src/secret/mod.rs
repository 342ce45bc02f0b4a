//! Single-slot credential staging.
//!
//! A credential is submitted once (HTTP form or CLI), held in exactly one
//! storage slot, and read by the push pipeline. Reading never deletes; the
//! pipeline calls [`SecretStore::clear`] only after a push fully succeeds.

mod file;
mod memory;

pub use file::FileSecretStore;
pub use memory::MemorySecretStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::StagingError;

/// A staged credential. `Debug` and `Display` never print the raw value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a raw value verbatim. Only the empty string is rejected.
    pub fn parse(raw: &str) -> Result<Self, StagingError> {
        if raw.is_empty() {
            return Err(StagingError::Empty);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Secret").field(&self.masked()).finish()
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Mask all but the last four characters. Short values are fully hidden.
pub fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

/// Acknowledgement returned by a successful `stage`.
#[derive(Debug, Clone, Serialize)]
pub struct StageAck {
    pub masked: String,
    pub location: String,
}

/// Storage slot for the one staged credential.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Replace any staged value with `raw`.
    async fn stage(&self, raw: &str) -> Result<StageAck, StagingError>;

    /// Read the staged value without removing it.
    async fn consume(&self) -> Result<Secret, StagingError>;

    /// Remove the staged value. Clearing an empty slot succeeds.
    async fn clear(&self) -> Result<(), StagingError>;

    /// Human-readable description of where the secret lives.
    fn location(&self) -> String;
}
