//! HKDF-SHA256 key derivation used by the Noise handshake.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::crypto::CipherError;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], CipherError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Extract-then-expand HKDF over SHA-256.
pub fn derive(
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CipherError> {
    let prk = hmac_sha256(salt.unwrap_or(&[0u8; 32]), &[ikm])?;

    let mut output = Vec::with_capacity(length);
    let mut block: Vec<u8> = Vec::new();
    let mut counter = 1u8;
    while output.len() < length {
        block = hmac_sha256(&prk, &[&block, info, &[counter]])?.to_vec();
        let take = (length - output.len()).min(block.len());
        output.extend_from_slice(&block[..take]);
        counter = counter.checked_add(1).ok_or(CipherError::InvalidKey)?;
    }
    Ok(output)
}

/// Derive two 32-byte keys from `ikm` salted with `salt`.
pub fn derive_key_pair(salt: &[u8], ikm: &[u8]) -> Result<([u8; 32], [u8; 32]), CipherError> {
    let derived = derive(Some(salt), ikm, b"", 64)?;
    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&derived[..32]);
    second.copy_from_slice(&derived[32..]);
    Ok((first, second))
}
