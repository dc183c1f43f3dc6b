//! Transport layer: framing, the noise handshake and the websocket client.
//!
//! The connection manager and pairing session only see the [`Transport`],
//! [`Link`] and [`PairingLink`] traits, so tests can drive them with
//! scripted fakes.

pub mod frame;
pub mod handshake;
pub mod ws;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::crypto::CipherError;
use crate::store::{DeviceKeys, SessionRecord};
use crate::types::JID;

pub use frame::{encode_frame, FrameDecoder, WA_HEADER};
pub use handshake::ClientHandshake;
pub use ws::WsTransport;

/// WhatsApp WebSocket endpoints.
pub mod endpoints {
    pub const MAIN: &str = "wss://web.whatsapp.com/ws/chat";
    pub const ORIGIN: &str = "https://web.whatsapp.com";
}

/// Socket errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SocketError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] CipherError),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<prost::DecodeError> for SocketError {
    fn from(err: prost::DecodeError) -> Self {
        SocketError::Protocol(err.to_string())
    }
}

/// What the primary device tells a pairing client.
#[derive(Debug, Clone, PartialEq)]
pub enum PairSignal {
    /// The QR code was scanned and the server assigned this device a JID.
    Scanned {
        jid: JID,
        push_name: Option<String>,
        business_name: Option<String>,
        platform: String,
    },
    /// The server refused the pairing.
    Rejected { reason: String },
}

/// Opens authenticated links to the service.
pub trait Transport: Send + Sync {
    /// Connect and complete the handshake as the device in `record`.
    fn open<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, Result<Box<dyn Link>, SocketError>>;

    /// Connect as an unpaired device that will register `keys`.
    fn open_pairing<'a>(
        &'a self,
        keys: &'a DeviceKeys,
    ) -> BoxFuture<'a, Result<Box<dyn PairingLink>, SocketError>>;
}

/// An established, logged-in connection.
pub trait Link: Send {
    /// Next decrypted frame. `Ok(None)` means the peer closed the connection.
    ///
    /// Dropping the returned future before completion must not lose a frame.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Vec<u8>>, SocketError>>;

    /// Protocol state negotiated by the handshake, stored in the session
    /// record after every successful connect.
    fn session_state(&self) -> Vec<u8>;

    /// Close the connection. Never fails; errors are only logged.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// A connection used only for the QR pairing exchange.
pub trait PairingLink: Send {
    /// Ask the server for pairing refs. Each ref backs one QR ticket.
    fn request_refs(&mut self) -> BoxFuture<'_, Result<Vec<String>, SocketError>>;

    /// Wait for the outcome of the pairing.
    fn next_signal(&mut self) -> BoxFuture<'_, Result<PairSignal, SocketError>>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}
