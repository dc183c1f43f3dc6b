//! Terminal output for the CLI.

use chrono::Local;
use qrcode::{render::unicode, QrCode};

use whatsmeow_cli::{ConnectionEvent, ConnectionState, InboundEvent, MessageInfo};

pub const NOT_PAIRED: &str = "No existing login found. Please run 'whatsmeow-cli qr' first to log in.";

const PAIR_AGAIN: &str = "Run 'whatsmeow-cli qr' to pair again.";

/// What the CLI does with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Print and keep listening.
    Print(String),
    /// Print and exit non-zero; the session cannot continue.
    Fatal(String),
    /// Not shown, only logged at debug level.
    Quiet(String),
}

/// Map an event to terminal output. `after_pairing` enables the sync
/// progress lines shown right after a QR login.
pub fn event_output(event: &InboundEvent, after_pairing: bool) -> Output {
    match event {
        InboundEvent::Connection(ConnectionEvent::StateChanged { to, .. }) => match to {
            ConnectionState::Replaced => {
                Output::Fatal(format!("Connection replaced by another login! {PAIR_AGAIN}"))
            }
            ConnectionState::LoggedOut => Output::Fatal(format!("Device logged out! {PAIR_AGAIN}")),
            ConnectionState::Connected if after_pairing => {
                Output::Print("Connected to WhatsApp!".to_string())
            }
            _ => Output::Quiet(event.summary()),
        },
        InboundEvent::SyncStatus(_) if after_pairing => Output::Print(event.summary()),
        _ => match event.message_info() {
            Some(info) => Output::Print(message_block(info, event)),
            None => Output::Quiet(event.summary()),
        },
    }
}

/// Render a pairing code as a QR block for the terminal.
pub fn qr_ascii(data: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(data.as_bytes())?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Format a message event as the "New Message" block.
pub fn message_block(info: &MessageInfo, event: &InboundEvent) -> String {
    let mut lines = vec![
        String::new(),
        "=== New Message ===".to_string(),
        format!("From: {}", info.sender_name()),
    ];
    if info.is_group() {
        lines.push("Type: Group Message".to_string());
        lines.push(format!("Group: {}", info.chat.user));
    } else {
        lines.push("Type: Private Message".to_string());
    }
    lines.push(format!(
        "Time: {}",
        info.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push(format!("Content: {}", event.summary()));
    lines.push("=================".to_string());
    lines.join("\n")
}
