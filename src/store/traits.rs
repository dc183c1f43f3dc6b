//! Credential store trait.
//!
//! A store holds at most one [`SessionRecord`]. Implementations allow a
//! single writer at a time; reads may run concurrently when no write is
//! in progress.

use thiserror::Error;

use crate::store::SessionRecord;

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store violates its own invariants and cannot be trusted.
    #[error("store is corrupt: {0}")]
    Corrupt(String),
    /// Transient I/O failure, including lock contention.
    #[error("store I/O failure: {0}")]
    Io(String),
}

impl StoreError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for the paired device's session record.
pub trait CredentialStore: Send + Sync {
    /// Load the stored record, or `None` if no device was ever paired.
    fn load(&self) -> StoreResult<Option<SessionRecord>>;

    /// Atomically replace the stored record. Durable once this returns `Ok`.
    fn save(&self, record: &SessionRecord) -> StoreResult<()>;

    /// Remove any stored record.
    fn clear(&self) -> StoreResult<()>;
}
