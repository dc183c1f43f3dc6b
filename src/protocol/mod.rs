//! Protocol module: pairing, connection management and event delivery.
//!
//! Contains the connection manager, the pairing session, the frame decoder
//! and the event dispatcher.

pub mod backoff;
pub mod client;
pub mod dispatch;
pub mod message;
pub mod qr;

pub use backoff::Backoff;
pub use client::{ConnectError, ConnectionManager};
pub use dispatch::{EventDispatcher, Subscription, TryRecv};
pub use message::decode;
pub use qr::{ExpiryReason, PairingError, PairingEvent, PairingSession, PairingTicket};
