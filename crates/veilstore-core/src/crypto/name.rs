//! Filename encryption and duplicate-detection fingerprints.
//!
//! Stored filenames are AES-256-GCM ciphertexts under the account content
//! key, with a fresh random nonce prepended to each. Encryption is therefore
//! non-deterministic: encrypting the same name twice yields different bytes,
//! so ciphertext equality reveals nothing about name equality.
//!
//! Duplicate detection instead uses a *fingerprint*: HMAC-SHA256 over the
//! normalized folder path concatenated with the plaintext name, keyed with
//! the account MAC secret, rendered as lowercase hex. Equal fingerprints mean
//! "same name at same location for same account" without exposing either.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use super::keys::AccountKey;

/// AES-GCM nonce length; prepended to every encrypted name.
const NONCE_LEN: usize = 12;

/// Errors from filename encryption and decryption.
#[derive(Error, Debug)]
pub enum NameError {
    /// Sealing the name failed, or the RNG refused to produce a nonce.
    #[error("filename encryption failed")]
    EncryptionFailed,

    /// The GCM tag did not verify. Wrong key or corrupted record.
    #[error("filename decryption failed - wrong key or corrupted record")]
    DecryptionFailed,

    /// The stored blob is shorter than a nonce, so it cannot be a name.
    #[error("encrypted filename is truncated ({0} bytes)")]
    Truncated(usize),

    /// The decrypted bytes were not valid UTF-8.
    #[error("decrypted filename is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encrypt a filename under the account content key.
///
/// Returns `nonce || ciphertext`. A fresh nonce is drawn per call, so the
/// output is different every time even for identical names.
pub fn encrypt_filename(key: &AccountKey, name: &str) -> Result<Vec<u8>, NameError> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| NameError::EncryptionFailed)?;

    let ciphertext = key.with_content_key(|k| {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k));
        cipher
            .encrypt(Nonce::from_slice(&nonce), name.as_bytes())
            .map_err(|_| NameError::EncryptionFailed)
    })?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a stored filename back to plaintext.
pub fn decrypt_filename(key: &AccountKey, encrypted: &[u8]) -> Result<String, NameError> {
    if encrypted.len() <= NONCE_LEN {
        return Err(NameError::Truncated(encrypted.len()));
    }
    let (nonce, ciphertext) = encrypted.split_at(NONCE_LEN);

    let plaintext = key.with_content_key(|k| {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| NameError::DecryptionFailed)
    })?;

    Ok(String::from_utf8(plaintext)?)
}

/// Compute the duplicate-detection fingerprint for a name at a location.
///
/// `folder_path` must already be normalized (leading and trailing slash);
/// the fingerprint is keyed per account, so equal values across accounts
/// carry no meaning.
pub fn name_fingerprint(key: &AccountKey, folder_path: &str, name: &str) -> String {
    key.with_mac_secret(|secret| {
        let mac_key = hmac::Key::new(hmac::HMAC_SHA256, secret);
        let mut ctx = hmac::Context::with_key(&mac_key);
        ctx.update(folder_path.as_bytes());
        ctx.update(name.as_bytes());
        hex::encode(ctx.sign().as_ref())
    })
}
