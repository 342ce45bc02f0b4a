use std::sync::Mutex;

use async_trait::async_trait;

use super::{Secret, SecretStore, StageAck};
use crate::errors::StagingError;

/// Process-local secret slot. Nothing touches disk.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    slot: Mutex<Option<Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut Option<Secret>) -> R) -> R {
        // A poisoned slot still holds a valid Option; keep using it.
        let mut guard = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn stage(&self, raw: &str) -> Result<StageAck, StagingError> {
        let secret = Secret::parse(raw)?;
        let masked = secret.masked();
        self.with_slot(|slot| *slot = Some(secret));
        Ok(StageAck {
            masked,
            location: self.location(),
        })
    }

    async fn consume(&self) -> Result<Secret, StagingError> {
        self.with_slot(|slot| slot.clone())
            .ok_or(StagingError::NotStaged)
    }

    async fn clear(&self) -> Result<(), StagingError> {
        self.with_slot(|slot| *slot = None);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
