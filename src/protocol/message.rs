//! Decoding of raw stream frames into [`InboundEvent`]s.
//!
//! [`decode`] is total: a frame that cannot be understood becomes
//! [`InboundEvent::Unknown`] carrying the best type tag available, so one bad
//! frame never stops delivery of the rest of the stream.

use chrono::DateTime;
use log::debug;
use prost::Message as ProstMessage;

use crate::proto::{self, kind, Envelope};
use crate::types::{
    ConnectionEvent, InboundEvent, MediaKind, MessageInfo, StreamSignal, SyncStatus, JID,
};

/// Tag used for frames that are not even a valid envelope.
pub const UNDECODABLE: &str = "undecodable";

/// Connect failure reasons that mean the device was unlinked.
const LOGGED_OUT_REASONS: [i32; 3] = [401, 403, 406];

/// Decode one decrypted frame.
pub fn decode(frame: &[u8]) -> InboundEvent {
    match Envelope::decode(frame) {
        Ok(envelope) => decode_envelope(envelope),
        Err(e) => {
            debug!(target: "Client", "Failed to decode frame of {} bytes: {e}", frame.len());
            InboundEvent::Unknown {
                tag: UNDECODABLE.to_string(),
                info: None,
            }
        }
    }
}

/// Classify a decoded envelope.
pub fn decode_envelope(envelope: Envelope) -> InboundEvent {
    match envelope.kind.as_str() {
        kind::MESSAGE => decode_message(envelope),
        kind::SUCCESS => stream(StreamSignal::Authenticated),
        kind::STREAM_ERROR => stream(stream_error_signal(
            envelope.code.as_deref().unwrap_or(""),
            envelope.conflict.as_deref().unwrap_or(""),
        )),
        kind::FAILURE => stream(failure_signal(envelope.reason.unwrap_or(0))),
        kind::APP_STATE_SYNC_COMPLETE => InboundEvent::SyncStatus(SyncStatus {
            name: envelope.name.unwrap_or_default(),
        }),
        _ => InboundEvent::Unknown {
            tag: envelope.kind,
            info: None,
        },
    }
}

fn stream(signal: StreamSignal) -> InboundEvent {
    InboundEvent::Connection(ConnectionEvent::Stream(signal))
}

fn stream_error_signal(code: &str, conflict: &str) -> StreamSignal {
    match (code, conflict) {
        (_, "replaced") => StreamSignal::Replaced,
        ("401", _) | (_, "device_removed") => StreamSignal::LoggedOut { reason: 401 },
        ("515", _) => StreamSignal::RestartRequired,
        ("503", _) => StreamSignal::ServiceUnavailable,
        _ => StreamSignal::Other {
            code: if code.is_empty() { conflict } else { code }.to_string(),
        },
    }
}

fn failure_signal(reason: i32) -> StreamSignal {
    if LOGGED_OUT_REASONS.contains(&reason) {
        StreamSignal::LoggedOut { reason }
    } else {
        StreamSignal::Other {
            code: reason.to_string(),
        }
    }
}

fn decode_info(raw: &proto::MessageInfo) -> Option<MessageInfo> {
    let sender: JID = raw.sender.parse().ok().filter(|jid: &JID| !jid.is_empty())?;
    let chat: JID = if raw.chat.is_empty() {
        sender.clone()
    } else {
        raw.chat.parse().ok()?
    };
    let timestamp = i64::try_from(raw.timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default();

    Some(MessageInfo {
        id: raw.id.clone(),
        sender,
        chat,
        push_name: raw.push_name.clone().filter(|name| !name.is_empty()),
        timestamp,
    })
}

fn decode_message(envelope: Envelope) -> InboundEvent {
    let tag = envelope
        .info
        .as_ref()
        .and_then(|info| info.r#type.clone())
        .unwrap_or_else(|| kind::MESSAGE.to_string());

    let Some(info) = envelope.info.as_ref().and_then(decode_info) else {
        return InboundEvent::Unknown { tag, info: None };
    };
    let Some(message) = envelope.message else {
        return InboundEvent::Unknown {
            tag,
            info: Some(info),
        };
    };

    let media = |kind: MediaKind, caption: Option<String>, info: MessageInfo| InboundEvent::Media {
        info,
        kind,
        caption,
    };

    if let Some(body) = message.conversation.filter(|text| !text.is_empty()) {
        InboundEvent::Text { info, body }
    } else if let Some(extended) = message.extended_text_message {
        InboundEvent::Text {
            info,
            body: extended.text.unwrap_or_default(),
        }
    } else if let Some(image) = message.image_message {
        media(MediaKind::Image, image.caption, info)
    } else if let Some(video) = message.video_message {
        media(MediaKind::Video, video.caption, info)
    } else if let Some(document) = message.document_message {
        media(MediaKind::Document, document.file_name, info)
    } else if let Some(audio) = message.audio_message {
        let kind = if audio.ptt.unwrap_or(false) {
            MediaKind::VoiceNote
        } else {
            MediaKind::Audio
        };
        media(kind, None, info)
    } else if message.sticker_message.is_some() {
        media(MediaKind::Sticker, None, info)
    } else if let Some(reaction) = message.reaction_message {
        InboundEvent::Reaction {
            info,
            emoji: reaction.text.unwrap_or_default(),
            target_id: reaction.key.and_then(|key| key.id).unwrap_or_default(),
        }
    } else {
        InboundEvent::Unknown {
            tag,
            info: Some(info),
        }
    }
}
