//! X25519 key pairs for the Noise static key and the device identity key.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

/// A Curve25519 key pair. Persisted as part of the session record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: [u8; 32],
    pub private: [u8; 32],
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut private = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut private);
        private[0] &= 248;
        private[31] &= 127;
        private[31] |= 64;
        Self::from_private_key(private)
    }

    pub fn from_private_key(private: [u8; 32]) -> Self {
        let public = PublicKey::from(&StaticSecret::from(private));
        Self {
            public: public.to_bytes(),
            private,
        }
    }

    /// X25519 agreement with a peer's public key.
    ///
    /// Returns `None` when the peer key is a low-order point, i.e. the
    /// result would not depend on our private key.
    pub fn agree(&self, peer: &[u8; 32]) -> Option<[u8; 32]> {
        let shared = StaticSecret::from(self.private).diffie_hellman(&PublicKey::from(*peer));
        shared.was_contributory().then(|| shared.to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .field("private", &"[REDACTED]")
            .finish()
    }
}
