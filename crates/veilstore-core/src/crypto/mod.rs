//! Cryptographic layer for one account: envelope key material, filename
//! encryption, fingerprinting and streaming content encryption.

pub mod envelope;
pub mod keys;
pub mod name;
pub mod stream;

use thiserror::Error;

/// Errors from envelope and key-material operations.
///
/// # Security Classification
///
/// A wrong password and a tampered envelope are *intentionally* reported as
/// the same [`CryptoError::AuthenticationFailed`] variant: both manifest as
/// an AEAD tag mismatch, and distinguishing them would hand an attacker a
/// password oracle.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// AEAD authentication failed while unwrapping account secrets.
    ///
    /// Wrong password, or the stored envelope was corrupted or tampered
    /// with. The two cases are deliberately indistinguishable.
    #[error("authentication failed - wrong password or corrupted/tampered secrets")]
    AuthenticationFailed,

    /// The key derivation parameters stored for the account are unusable.
    #[error("invalid key derivation parameters: {0}")]
    InvalidKdfParams(String),

    /// An unwrapped key did not have the expected length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The wrapped blob is too short to even contain a nonce.
    #[error("wrapped secret is truncated ({0} bytes)")]
    TruncatedSecret(usize),

    /// The system RNG failed to produce key material.
    #[error("random generator failure")]
    Rng,

    /// AEAD sealing failed unexpectedly. Should not happen with valid keys.
    #[error("encryption failed unexpectedly")]
    EncryptionFailed,
}
