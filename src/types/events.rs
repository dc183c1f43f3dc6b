//! Event types delivered to local subscribers.
//!
//! Everything that reaches a subscriber is an [`InboundEvent`]: decoded
//! messages, sync notifications and connection lifecycle changes.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::JID;

/// Lifecycle state of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Another session for the same identity took over. Terminal.
    Replaced,
    /// The device was unlinked. Terminal, requires pairing again.
    LoggedOut,
}

impl ConnectionState {
    /// Terminal states end the reconnect loop for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Replaced | ConnectionState::LoggedOut)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Replaced => "replaced",
            ConnectionState::LoggedOut => "logged out",
        };
        f.write_str(name)
    }
}

/// Control signal sent by the server inside the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// Login accepted after the handshake.
    Authenticated,
    /// Another client connected with the same identity.
    Replaced,
    /// The device was removed from the account.
    LoggedOut { reason: i32 },
    /// Server asks the client to reconnect (stream error 515).
    RestartRequired,
    /// Service temporarily unavailable (503); reconnect later.
    ServiceUnavailable,
    /// Any other stream error or failure code.
    Other { code: String },
}

/// Connection-level event seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Emitted by the connection manager on every state transition.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Emitted by the decoder for server control frames.
    Stream(StreamSignal),
}

/// Information about a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    /// Unique message ID
    pub id: String,
    /// Sender JID
    pub sender: JID,
    /// Chat JID (same as sender for 1:1, group JID for groups)
    pub chat: JID,
    /// Push name of sender, if the server attached one
    pub push_name: Option<String>,
    /// Server timestamp of the message
    pub timestamp: DateTime<Utc>,
}

impl MessageInfo {
    /// Whether this message was sent into a group chat.
    pub fn is_group(&self) -> bool {
        self.chat.is_group()
    }

    /// Display name for the sender, falling back to the JID.
    pub fn sender_name(&self) -> String {
        match self.push_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.sender.to_string(),
        }
    }
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Document,
    Audio,
    /// Audio recorded as a push-to-talk voice note.
    VoiceNote,
    Sticker,
}

/// App state sync notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Name of the app state collection that finished syncing.
    pub name: String,
}

/// All events that can reach a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Plain or extended (quoted/linked) text message.
    Text { info: MessageInfo, body: String },
    /// Media message; documents use `caption` for the file name.
    Media {
        info: MessageInfo,
        kind: MediaKind,
        caption: Option<String>,
    },
    /// Reaction to an earlier message.
    Reaction {
        info: MessageInfo,
        emoji: String,
        target_id: String,
    },
    SyncStatus(SyncStatus),
    Connection(ConnectionEvent),
    /// Payload that did not match any known variant.
    Unknown {
        tag: String,
        info: Option<MessageInfo>,
    },
}

impl InboundEvent {
    /// Message metadata, for message-bearing events.
    pub fn message_info(&self) -> Option<&MessageInfo> {
        match self {
            InboundEvent::Text { info, .. }
            | InboundEvent::Media { info, .. }
            | InboundEvent::Reaction { info, .. } => Some(info),
            InboundEvent::Unknown { info, .. } => info.as_ref(),
            InboundEvent::SyncStatus(_) | InboundEvent::Connection(_) => None,
        }
    }

    /// One-line human readable content summary.
    pub fn summary(&self) -> String {
        match self {
            InboundEvent::Text { body, .. } => body.clone(),
            InboundEvent::Media { kind, caption, .. } => {
                let caption = caption.as_deref().unwrap_or("");
                match kind {
                    MediaKind::Image => format!("[Image] Caption: {caption}"),
                    MediaKind::Video => format!("[Video] Caption: {caption}"),
                    MediaKind::Document => format!("[Document] Filename: {caption}"),
                    MediaKind::Audio => "[Audio]".to_string(),
                    MediaKind::VoiceNote => "[Voice Message]".to_string(),
                    MediaKind::Sticker => "[Sticker]".to_string(),
                }
            }
            InboundEvent::Reaction {
                emoji, target_id, ..
            } => format!("[Reaction] {emoji} to message: {target_id}"),
            InboundEvent::SyncStatus(status) => format!("Sync completed for {}", status.name),
            InboundEvent::Connection(ConnectionEvent::StateChanged { to, .. }) => {
                format!("Connection {to}")
            }
            InboundEvent::Connection(ConnectionEvent::Stream(signal)) => {
                format!("Stream signal: {signal:?}")
            }
            InboundEvent::Unknown { .. } => "[Unknown Message Type]".to_string(),
        }
    }
}
