//! Cryptographic helpers for the transport handshake.
//!
//! Curve operations, HMAC and AES-GCM come from the RustCrypto and dalek
//! crates; this module only wires them together.

mod keypair;
pub mod hkdf;
mod cipher;

pub use keypair::KeyPair;
pub use cipher::{Cipher, CipherError};
