//! Symmetric encrypted envelope (C1): AES-256-GCM, base64 wrap/unwrap.
//!
//! Grounded on `w3b2-connector/src/keystore.rs::Crypto`, which derives an
//! AES-256-GCM key via Argon2 and stores `(ciphertext, nonce)` alongside
//! each record. Here the key arrives pre-derived (it is the `Element`'s
//! shared secret, distributed out of band by the DB), so there is no KDF
//! step — only encrypt/decrypt of JSON-serialized messages.
//!
//! Wire format: `base64_standard(nonce(12 bytes) || ciphertext)`. This
//! fixes the "AES mode, padding, IV handling" requirement from the
//! specification into a concrete, testable contract for this
//! implementation (see DESIGN.md for why: no peer reference binary ships
//! in this pack to test bit-exact parity against).

use crate::error::{NcError, Result};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, Key},
    AeadCore, Aes256Gcm, KeyInit,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Serialize};

const NONCE_LEN: usize = 12;

/// JSON-serialize `message`, AES-encrypt with `key`, base64 (standard, no
/// newlines) encode the result.
pub fn encrypt<T: Serialize>(key: &[u8; 32], message: &T) -> Result<String> {
    let plaintext =
        serde_json::to_vec(message).map_err(|e| NcError::Decrypt(format!("encode: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut rng = aes_gcm::aead::OsRng;
    let nonce = Aes256Gcm::generate_nonce(&mut rng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| NcError::Decrypt(format!("encrypt: {e}")))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// base64-decode, AES-decrypt, JSON-parse. Any failure along this chain
/// surfaces as [`NcError::Decrypt`], matching the specification's
/// "base64 malformed, AES integrity/length failure, JSON parse failure"
/// triad.
pub fn decrypt<T: DeserializeOwned>(key: &[u8; 32], blob: &str) -> Result<T> {
    let raw = STANDARD
        .decode(blob)
        .map_err(|e| NcError::Decrypt(format!("base64: {e}")))?;

    if raw.len() < NONCE_LEN {
        return Err(NcError::Decrypt("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| NcError::Decrypt(format!("aes: {e}")))?;

    serde_json::from_slice(&plaintext).map_err(|e| NcError::Decrypt(format!("json: {e}")))
}
