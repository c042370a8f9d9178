//! Optional symmetric-AEAD encryption at rest (§4.10, §6.3). AES-256-GCM,
//! gated by whether a process-level key is supplied to the backend — absent
//! a key, `maybe_encrypt`/`maybe_decrypt` are the identity.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::StoreError;

pub const HEADER: &str = "# PICKLR_ENCRYPTED_STATE\n";

/// AES-GCM's standard 96-bit nonce, in bytes.
const NONCE_LEN: usize = 12;

/// Known weakness, preserved deliberately (see DESIGN.md): the key material
/// is zero-padded or truncated to 32 bytes rather than derived through a
/// KDF. A production implementation should require an exact 32-byte key or
/// apply a documented KDF instead.
fn derive_key(key_material: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    let n = key_material.len().min(32);
    key[..n].copy_from_slice(&key_material[..n]);
    key
}

pub fn encrypt(plaintext: &[u8], key_material: &[u8]) -> String {
    let key_bytes = derive_key(key_material);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plaintext).expect("AES-256-GCM encryption cannot fail for a well-formed key/nonce");

    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);
    format!("{}{}\n", HEADER, BASE64.encode(combined))
}

pub fn decrypt(body: &str, key_material: &[u8]) -> Result<Vec<u8>, StoreError> {
    let combined = BASE64
        .decode(body.trim())
        .map_err(|e| StoreError::StateDecrypt(format!("malformed base64: {e}")))?;

    if combined.len() < NONCE_LEN {
        return Err(StoreError::StateDecrypt("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);

    let key_bytes = derive_key(key_material);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| StoreError::StateDecrypt("decryption failed (wrong key or corrupt ciphertext)".into()))
}

pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.starts_with(HEADER.as_bytes())
}

pub fn maybe_encrypt(plaintext: &str, key: Option<&[u8]>) -> String {
    match key {
        Some(k) => encrypt(plaintext.as_bytes(), k),
        None => plaintext.to_string(),
    }
}

pub fn maybe_decrypt(bytes: &[u8], key: Option<&[u8]>) -> Result<String, StoreError> {
    if is_encrypted(bytes) {
        let key = key.ok_or_else(|| StoreError::StateDecrypt("encrypted state but no key configured".into()))?;
        let body = std::str::from_utf8(&bytes[HEADER.len()..])
            .map_err(|e| StoreError::StateDecrypt(format!("non-utf8 ciphertext: {e}")))?;
        let plaintext = decrypt(body, key)?;
        String::from_utf8(plaintext).map_err(|e| StoreError::StateDecrypt(format!("non-utf8 plaintext: {e}")))
    } else {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| StoreError::StateParse(format!("non-utf8 state file: {e}")))
    }
}
