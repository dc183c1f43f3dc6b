//! Types module for WhatsApp protocol types.
//!
//! Contains JIDs and the events delivered to subscribers.

mod jid;
mod events;

pub use jid::*;
pub use events::*;
