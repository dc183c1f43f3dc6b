//! Noise_XX_25519_AESGCM_SHA256 client handshake.
//!
//! The state machine here does no I/O: it produces the bytes to send and
//! consumes the bytes received. [`ws`](crate::socket::ws) moves them over the
//! wire. Message order:
//!
//! ```text
//! -> e
//! <- e, ee, s, es
//! -> s, se
//! ```

use prost::Message as ProstMessage;
use sha2::{Digest, Sha256};

use crate::crypto::{hkdf, Cipher, KeyPair};
use crate::proto::{ClientFinish, ClientHello, ClientPayload, HandshakeMessage};
use crate::socket::{SocketError, WA_HEADER};

/// Noise protocol name, exactly 32 bytes so it is used as the initial hash.
const NOISE_PATTERN: &[u8; 32] = b"Noise_XX_25519_AESGCM_SHA256\x00\x00\x00\x00";

/// Symmetric state shared by both sides of the handshake.
pub(crate) struct NoiseState {
    hash: [u8; 32],
    salt: [u8; 32],
    cipher: Cipher,
}

impl NoiseState {
    pub(crate) fn new(prologue: &[u8]) -> Self {
        let mut state = Self {
            hash: *NOISE_PATTERN,
            salt: *NOISE_PATTERN,
            cipher: Cipher::new(*NOISE_PATTERN),
        };
        state.authenticate(prologue);
        state
    }

    pub(crate) fn authenticate(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.hash);
        hasher.update(data);
        self.hash = hasher.finalize().into();
    }

    pub(crate) fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SocketError> {
        let ciphertext = self.cipher.encrypt(plaintext, &self.hash)?;
        self.authenticate(&ciphertext);
        Ok(ciphertext)
    }

    pub(crate) fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, SocketError> {
        let plaintext = self.cipher.decrypt(ciphertext, &self.hash)?;
        self.authenticate(ciphertext);
        Ok(plaintext)
    }

    fn mix_into_key(&mut self, shared: &[u8]) -> Result<(), SocketError> {
        let (salt, key) = hkdf::derive_key_pair(&self.salt, shared)?;
        self.salt = salt;
        self.cipher = Cipher::new(key);
        Ok(())
    }

    pub(crate) fn mix_shared_secret(&mut self, ours: &KeyPair, theirs: &[u8; 32]) -> Result<(), SocketError> {
        let shared = ours
            .agree(theirs)
            .ok_or_else(|| SocketError::HandshakeFailed("peer sent a low-order key".to_string()))?;
        self.mix_into_key(&shared)
    }

    /// Split into the (initiator-write, initiator-read) transport ciphers.
    pub(crate) fn finish(self) -> Result<(Cipher, Cipher), SocketError> {
        let (write, read) = hkdf::derive_key_pair(&self.salt, &[])?;
        Ok((Cipher::new(write), Cipher::new(read)))
    }
}

fn to_key(bytes: &[u8], what: &str) -> Result<[u8; 32], SocketError> {
    bytes.try_into().map_err(|_| {
        SocketError::HandshakeFailed(format!("invalid {what} length: {} (expected 32)", bytes.len()))
    })
}

fn encode(message: &HandshakeMessage) -> Vec<u8> {
    message.encode_to_vec()
}

/// Initiator side of the handshake.
pub struct ClientHandshake {
    noise: NoiseState,
    static_key: KeyPair,
    ephemeral: KeyPair,
    server_ephemeral: Option<[u8; 32]>,
    server_static: Option<[u8; 32]>,
}

impl ClientHandshake {
    /// Start a handshake authenticating as `static_key`.
    pub fn new(static_key: KeyPair) -> Self {
        Self {
            noise: NoiseState::new(&WA_HEADER),
            static_key,
            ephemeral: KeyPair::generate(),
            server_ephemeral: None,
            server_static: None,
        }
    }

    /// First message: our ephemeral public key.
    pub fn client_hello(&mut self) -> Vec<u8> {
        self.noise.authenticate(&self.ephemeral.public);
        encode(&HandshakeMessage {
            client_hello: Some(ClientHello {
                ephemeral: Some(self.ephemeral.public.to_vec()),
            }),
            ..Default::default()
        })
    }

    /// Process the server hello. Returns the server's decrypted certificate.
    pub fn read_server_hello(&mut self, data: &[u8]) -> Result<Vec<u8>, SocketError> {
        let hello = HandshakeMessage::decode(data)?
            .server_hello
            .ok_or_else(|| SocketError::HandshakeFailed("missing server hello".to_string()))?;

        let missing = |field: &str| SocketError::HandshakeFailed(format!("missing server {field}"));
        let ephemeral = to_key(&hello.ephemeral.ok_or_else(|| missing("ephemeral"))?, "server ephemeral")?;
        let static_ct = hello.r#static.ok_or_else(|| missing("static"))?;
        let payload_ct = hello.payload.ok_or_else(|| missing("payload"))?;

        self.noise.authenticate(&ephemeral);
        self.noise.mix_shared_secret(&self.ephemeral, &ephemeral)?;

        let server_static = to_key(&self.noise.decrypt(&static_ct)?, "server static")?;
        self.noise.mix_shared_secret(&self.ephemeral, &server_static)?;

        let certificate = self.noise.decrypt(&payload_ct)?;

        self.server_ephemeral = Some(ephemeral);
        self.server_static = Some(server_static);
        Ok(certificate)
    }

    /// Last message: our encrypted static key and client payload.
    pub fn client_finish(&mut self, payload: &ClientPayload) -> Result<Vec<u8>, SocketError> {
        let server_ephemeral = self
            .server_ephemeral
            .ok_or_else(|| SocketError::HandshakeFailed("server hello not processed".to_string()))?;

        let static_ct = self.noise.encrypt(&self.static_key.public)?;
        self.noise.mix_shared_secret(&self.static_key, &server_ephemeral)?;
        let payload_ct = self.noise.encrypt(&payload.encode_to_vec())?;

        Ok(encode(&HandshakeMessage {
            client_finish: Some(ClientFinish {
                r#static: Some(static_ct),
                payload: Some(payload_ct),
            }),
            ..Default::default()
        }))
    }

    /// The server's static key, once the server hello was processed.
    pub fn server_static(&self) -> Option<&[u8; 32]> {
        self.server_static.as_ref()
    }

    /// Transport ciphers as (write, read).
    pub fn into_transport(self) -> Result<(Cipher, Cipher), SocketError> {
        if self.server_ephemeral.is_none() {
            return Err(SocketError::HandshakeFailed("handshake not complete".to_string()));
        }
        self.noise.finish()
    }
}
