//! WhatsApp protobuf message definitions.
//!
//! Handshake messages, the client payload, and the decrypted stream envelope
//! carrying messages and control frames.

use prost::Message as ProstMessage;

use crate::store::DeviceKeys;
use crate::types::JID;

/// Handshake message for Noise protocol.
#[derive(Clone, PartialEq, ProstMessage)]
pub struct HandshakeMessage {
    #[prost(message, optional, tag = "2")]
    pub client_hello: Option<ClientHello>,
    #[prost(message, optional, tag = "3")]
    pub server_hello: Option<ServerHello>,
    #[prost(message, optional, tag = "4")]
    pub client_finish: Option<ClientFinish>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct ClientHello {
    #[prost(bytes, optional, tag = "1")]
    pub ephemeral: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct ServerHello {
    #[prost(bytes, optional, tag = "1")]
    pub ephemeral: Option<Vec<u8>>,
    #[prost(bytes, optional, tag = "2")]
    pub r#static: Option<Vec<u8>>,
    #[prost(bytes, optional, tag = "3")]
    pub payload: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct ClientFinish {
    #[prost(bytes, optional, tag = "1")]
    pub r#static: Option<Vec<u8>>,
    #[prost(bytes, optional, tag = "2")]
    pub payload: Option<Vec<u8>>,
}

/// Client payload sent inside the last handshake message.
#[derive(Clone, PartialEq, ProstMessage)]
pub struct ClientPayload {
    #[prost(uint64, optional, tag = "1")]
    pub username: Option<u64>,
    #[prost(bool, optional, tag = "3")]
    pub passive: Option<bool>,
    #[prost(message, optional, tag = "5")]
    pub user_agent: Option<UserAgent>,
    #[prost(string, optional, tag = "7")]
    pub push_name: Option<String>,
    #[prost(int32, optional, tag = "12")]
    pub connect_type: Option<i32>,
    #[prost(int32, optional, tag = "13")]
    pub connect_reason: Option<i32>,
    #[prost(uint32, optional, tag = "18")]
    pub device: Option<u32>,
    #[prost(message, optional, tag = "19")]
    pub device_pairing_data: Option<DevicePairingData>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct UserAgent {
    #[prost(int32, optional, tag = "1")]
    pub platform: Option<i32>,
    #[prost(message, optional, tag = "2")]
    pub app_version: Option<AppVersion>,
    #[prost(string, optional, tag = "5")]
    pub os_version: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub device: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub locale: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct AppVersion {
    #[prost(uint32, optional, tag = "1")]
    pub primary: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub secondary: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub tertiary: Option<u32>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct DevicePairingData {
    #[prost(bytes, optional, tag = "1")]
    pub e_reg_id: Option<Vec<u8>>,
    #[prost(bytes, optional, tag = "2")]
    pub e_key_type: Option<Vec<u8>>,
    #[prost(bytes, optional, tag = "3")]
    pub e_ident: Option<Vec<u8>>,
}

/// Decrypted stream frame. `kind` is the top-level node tag.
#[derive(Clone, PartialEq, ProstMessage)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(message, optional, tag = "2")]
    pub info: Option<MessageInfo>,
    #[prost(message, optional, tag = "3")]
    pub message: Option<Message>,
    /// Stream error code (`515`, `503`, `401`, ...).
    #[prost(string, optional, tag = "4")]
    pub code: Option<String>,
    /// Conflict type of a stream error (`replaced`, `device_removed`).
    #[prost(string, optional, tag = "5")]
    pub conflict: Option<String>,
    /// Connect failure reason.
    #[prost(int32, optional, tag = "6")]
    pub reason: Option<i32>,
    /// Pairing refs offered by the server.
    #[prost(string, repeated, tag = "7")]
    pub refs: Vec<String>,
    /// JID assigned to the device on successful pairing.
    #[prost(string, optional, tag = "8")]
    pub jid: Option<String>,
    /// App state collection name.
    #[prost(string, optional, tag = "9")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub business_name: Option<String>,
    #[prost(string, optional, tag = "11")]
    pub platform: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct MessageInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub sender: String,
    #[prost(string, tag = "3")]
    pub chat: String,
    #[prost(string, optional, tag = "4")]
    pub push_name: Option<String>,
    #[prost(uint64, tag = "5")]
    pub timestamp: u64,
    /// Node `type` attribute, kept for diagnostics of unknown payloads.
    #[prost(string, optional, tag = "6")]
    pub r#type: Option<String>,
}

/// Message content; exactly one field is normally set.
#[derive(Clone, PartialEq, ProstMessage)]
pub struct Message {
    #[prost(string, optional, tag = "1")]
    pub conversation: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub image_message: Option<ImageMessage>,
    #[prost(message, optional, tag = "6")]
    pub extended_text_message: Option<ExtendedTextMessage>,
    #[prost(message, optional, tag = "7")]
    pub document_message: Option<DocumentMessage>,
    #[prost(message, optional, tag = "8")]
    pub audio_message: Option<AudioMessage>,
    #[prost(message, optional, tag = "9")]
    pub video_message: Option<VideoMessage>,
    #[prost(message, optional, tag = "26")]
    pub sticker_message: Option<StickerMessage>,
    #[prost(message, optional, tag = "46")]
    pub reaction_message: Option<ReactionMessage>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct ExtendedTextMessage {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct ImageMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub caption: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct VideoMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub caption: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct DocumentMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub file_name: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct AudioMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    /// Push-to-talk: recorded as a voice note.
    #[prost(bool, optional, tag = "6")]
    pub ptt: Option<bool>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct StickerMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct MessageKey {
    #[prost(string, optional, tag = "1")]
    pub remote_jid: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub from_me: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub id: Option<String>,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct ReactionMessage {
    #[prost(message, optional, tag = "1")]
    pub key: Option<MessageKey>,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
}

/// Top-level envelope kinds.
pub mod kind {
    pub const MESSAGE: &str = "message";
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
    pub const STREAM_ERROR: &str = "stream:error";
    pub const APP_STATE_SYNC_COMPLETE: &str = "app_state_sync_complete";
    pub const PAIR_REQUEST: &str = "pair-request";
    pub const PAIR_DEVICE: &str = "pair-device";
    pub const PAIR_SUCCESS: &str = "pair-success";
}

// Platform constants
pub mod platform {
    pub const WEB: i32 = 14;
}

// Connect type constants
pub mod connect_type {
    pub const WIFI: i32 = 1;
}

// Connect reason constants
pub mod connect_reason {
    pub const USER_ACTIVATED: i32 = 1;
}

fn web_user_agent() -> UserAgent {
    UserAgent {
        platform: Some(platform::WEB),
        app_version: Some(AppVersion {
            primary: Some(2),
            secondary: Some(3000),
            tertiary: Some(1012170356),
        }),
        os_version: Some("0.1".to_string()),
        device: Some("Desktop".to_string()),
        locale: Some("en".to_string()),
    }
}

/// Payload for logging in as an already paired device.
pub fn make_login_payload(jid: &JID, push_name: Option<&str>) -> ClientPayload {
    ClientPayload {
        username: jid.user_int(),
        passive: Some(true),
        user_agent: Some(web_user_agent()),
        push_name: push_name.map(String::from),
        connect_type: Some(connect_type::WIFI),
        connect_reason: Some(connect_reason::USER_ACTIVATED),
        device: Some(u32::from(jid.device)),
        device_pairing_data: None,
    }
}

/// Payload for registering a new device through pairing.
pub fn make_registration_payload(keys: &DeviceKeys, push_name: Option<&str>) -> ClientPayload {
    let mut e_ident = Vec::with_capacity(33);
    e_ident.push(5);
    e_ident.extend_from_slice(&keys.identity_key.public);

    ClientPayload {
        username: None,
        passive: Some(false),
        user_agent: Some(web_user_agent()),
        push_name: push_name.map(String::from),
        connect_type: Some(connect_type::WIFI),
        connect_reason: Some(connect_reason::USER_ACTIVATED),
        device: None,
        device_pairing_data: Some(DevicePairingData {
            e_reg_id: Some(keys.registration_id.to_be_bytes().to_vec()),
            // Curve25519
            e_key_type: Some(vec![5]),
            e_ident: Some(e_ident),
        }),
    }
}
