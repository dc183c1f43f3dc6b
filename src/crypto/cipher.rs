//! AES-256-GCM frame cipher.
//!
//! Nonces are a big-endian `u32` counter in the last four bytes of a zeroed
//! 12-byte IV, incremented after every frame in each direction.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

/// AES-256-GCM cipher with a counter nonce.
pub struct Cipher {
    key: [u8; 32],
    counter: u32,
}

impl Cipher {
    /// Create a new cipher with the given key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, counter: 0 }
    }

    /// Encrypt data with associated data.
    pub fn encrypt(&mut self, plaintext: &[u8], ad: &[u8]) -> Result<Vec<u8>, CipherError> {
        let iv = self.next_iv()?;
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::InvalidKey)?;
        cipher
            .encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad: ad })
            .map_err(|_| CipherError::EncryptionFailed)
    }

    /// Decrypt data with associated data.
    pub fn decrypt(&mut self, ciphertext: &[u8], ad: &[u8]) -> Result<Vec<u8>, CipherError> {
        let iv = self.next_iv()?;
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::InvalidKey)?;
        cipher
            .decrypt(Nonce::from_slice(&iv), Payload { msg: ciphertext, aad: ad })
            .map_err(|_| CipherError::DecryptionFailed)
    }

    fn next_iv(&mut self) -> Result<[u8; 12], CipherError> {
        let mut iv = [0u8; 12];
        iv[8..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(CipherError::CounterExhausted)?;
        Ok(iv)
    }
}

/// Cipher errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CipherError {
    #[error("invalid key")]
    InvalidKey,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("nonce counter exhausted")]
    CounterExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_stay_in_lockstep() {
        let mut sender = Cipher::new([0xab; 32]);
        let mut receiver = Cipher::new([0xab; 32]);

        for text in [&b"first"[..], b"second", b"third"] {
            let sealed = sender.encrypt(text, b"").unwrap();
            assert_eq!(receiver.decrypt(&sealed, b"").unwrap(), text);
        }
        assert_eq!(sender.counter, 3);
        assert_eq!(receiver.counter, 3);
    }

    #[test]
    fn test_out_of_order_frame_fails() {
        let mut sender = Cipher::new([0x11; 32]);
        let mut receiver = Cipher::new([0x11; 32]);

        let _skipped = sender.encrypt(b"one", b"").unwrap();
        let second = sender.encrypt(b"two", b"").unwrap();
        assert_eq!(
            receiver.decrypt(&second, b""),
            Err(CipherError::DecryptionFailed)
        );
    }

    #[test]
    fn test_decrypt_wrong_ad_fails() {
        let mut sender = Cipher::new([0x22; 32]);
        let mut receiver = Cipher::new([0x22; 32]);

        let sealed = sender.encrypt(b"payload", b"right").unwrap();
        assert!(receiver.decrypt(&sealed, b"wrong").is_err());
    }
}
