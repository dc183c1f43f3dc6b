//! Storage module for the paired device's credentials.
//!
//! Provides the [`CredentialStore`] trait with a durable SQLite backend and
//! an in-memory backend for tests.

mod device;
mod traits;
mod memory;
mod sqlite;

pub use device::*;
pub use traits::*;
pub use memory::*;
pub use sqlite::{SqliteStore, DEFAULT_BUSY_TIMEOUT};
