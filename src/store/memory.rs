//! In-memory store implementation for development and testing.
//!
//! Nothing survives the process; use [`SqliteStore`](crate::store::SqliteStore)
//! for real runs.

use std::sync::RwLock;

use crate::store::{CredentialStore, SessionRecord, StoreError, StoreResult};

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryStore {
    record: RwLock<Option<SessionRecord>>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `record`.
    pub fn with_record(record: SessionRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> StoreResult<Option<SessionRecord>> {
        let record = self
            .record
            .read()
            .map_err(|_| StoreError::Io("lock poisoned".to_string()))?;
        Ok(record.clone())
    }

    fn save(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut slot = self
            .record
            .write()
            .map_err(|_| StoreError::Io("lock poisoned".to_string()))?;
        *slot = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut slot = self
            .record
            .write()
            .map_err(|_| StoreError::Io("lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}
