//! whatsmeow-cli: WhatsApp Web client core for the command line.
//!
//! Pairs a device by QR code, keeps its credentials in a local SQLite
//! database and streams decoded incoming messages to subscribers.
//!
//! ## Modules
//!
//! - `types` - JIDs and the events delivered to subscribers
//! - `proto` - Protobuf wire messages
//! - `crypto` - Key pairs, HKDF and the frame cipher
//! - `store` - Credential storage (SQLite and in-memory)
//! - `socket` - Framing, noise handshake and websocket transport
//! - `protocol` - Pairing session, connection manager, decoder and dispatcher
//! - `config` - Client configuration

pub mod config;
pub mod crypto;
pub mod proto;
pub mod protocol;
pub mod socket;
pub mod store;
pub mod types;

/// `log` targets used by the library, for building log filters.
pub const LOG_TARGETS: &[&str] = &["Client", "Pairing", "Store", "Dispatch"];

pub use config::{ClientConfig, ConfigError};
pub use protocol::{
    ConnectError, ConnectionManager, EventDispatcher, ExpiryReason, PairingError, PairingEvent,
    PairingSession, PairingTicket, Subscription,
};
pub use socket::{SocketError, Transport, WsTransport};
pub use store::{CredentialStore, DeviceIdentity, MemoryStore, SessionRecord, SqliteStore, StoreError};
pub use types::{
    ConnectionEvent, ConnectionState, InboundEvent, MediaKind, MessageInfo, StreamSignal, SyncStatus, JID,
};
