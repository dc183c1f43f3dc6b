//! Device identity and session record.
//!
//! Keys are generated before pairing; the server assigns the identity when
//! the QR code is scanned. Both are then persisted together.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::KeyPair;
use crate::types::JID;

/// Identity of the paired device: its device JID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(JID);

impl DeviceIdentity {
    pub fn new(jid: JID) -> Self {
        Self(jid)
    }

    pub fn jid(&self) -> &JID {
        &self.0
    }

    /// An identity without a user or server cannot be used to log in.
    pub fn is_valid(&self) -> bool {
        !self.0.user.is_empty() && !self.0.is_empty()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Key material created for a device before it is paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKeys {
    /// Noise Protocol static key pair
    pub noise_key: KeyPair,
    /// Signal identity key pair
    pub identity_key: KeyPair,
    /// Registration ID (14 bits)
    pub registration_id: u32,
    /// Advertisement secret shown in the QR code
    pub adv_secret_key: [u8; 32],
}

impl DeviceKeys {
    /// Generate fresh keys.
    pub fn generate() -> Self {
        Self {
            noise_key: KeyPair::generate(),
            identity_key: KeyPair::generate(),
            registration_id: (rand::random::<u32>() & 0x3FFF).max(1),
            adv_secret_key: rand::random(),
        }
    }
}

/// Everything needed to log in again as the paired device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub identity: DeviceIdentity,
    pub keys: DeviceKeys,
    pub push_name: Option<String>,
    pub business_name: Option<String>,
    /// Platform reported by the primary device (e.g. "android").
    pub platform: String,
    /// Serialized protocol state, replaced on every re-key.
    pub session_state: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(identity: DeviceIdentity, keys: DeviceKeys) -> Self {
        Self {
            identity,
            keys,
            push_name: None,
            business_name: None,
            platform: String::new(),
            session_state: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Whether the record identifies a paired device.
    pub fn is_paired(&self) -> bool {
        self.identity.is_valid()
    }

    /// Replace the protocol state after a re-key.
    pub fn rekey(&mut self, session_state: Vec<u8>) {
        self.session_state = session_state;
        self.updated_at = Utc::now();
    }
}
