//! The per-account secret envelope.
//!
//! Each account persists a random content key and MAC secret, both wrapped
//! with AES-256-GCM under a key derived from the account password via
//! PBKDF2-HMAC-SHA256. The password-derived key is only ever used to wrap
//! and unwrap these two secrets. File contents and names are always
//! encrypted under the random content key, so a password change never
//! requires re-encrypting stored data.

use std::num::NonZeroU32;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use zeroize::Zeroizing;

use super::CryptoError;
use super::keys::AccountKey;

/// Default PBKDF2 iteration count for newly sealed envelopes.
///
/// Stored per account so it can be raised over time without breaking
/// existing envelopes.
pub const DEFAULT_KDF_ITERATIONS: u32 = 500_000;

/// Salt length for newly sealed envelopes.
const SALT_LEN: usize = 32;

/// AES-GCM nonce length; the nonce is prepended to each wrapped secret.
const NONCE_LEN: usize = 12;

/// The persisted account secret envelope.
///
/// `login_hash` is opaque to this crate: it belongs to the authentication
/// layer (a slow password hash used for login checks) and is carried along
/// untouched. The crypto unlock path never compares it: a wrong password
/// surfaces as an AEAD failure on unwrap instead, so there is no separate
/// verifier to oracle against.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEnvelope {
    /// Opaque login verifier owned by the authentication layer.
    #[serde(rename = "hash")]
    #[serde_as(as = "Base64")]
    pub login_hash: Vec<u8>,

    /// AES-GCM ciphertext of the 32-byte content key (nonce prepended).
    #[serde_as(as = "Base64")]
    pub wrapped_content_key: Vec<u8>,

    /// AES-GCM ciphertext of the 32-byte MAC secret (nonce prepended).
    #[serde_as(as = "Base64")]
    pub wrapped_mac_secret: Vec<u8>,

    /// Per-account PBKDF2 salt.
    #[serde_as(as = "Base64")]
    pub salt: Vec<u8>,

    /// Per-account PBKDF2 iteration count.
    pub iterations: u32,
}

/// Derive the 32-byte envelope-wrapping key from a password.
///
/// PBKDF2-HMAC-SHA256 with the account's stored salt and iteration count.
/// The result only ever wraps/unwraps the envelope; it never touches file
/// content directly.
pub fn derive_account_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<SecretBox<[u8; 32]>, CryptoError> {
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| CryptoError::InvalidKdfParams("iteration count must be non-zero".into()))?;

    let mut derived = Zeroizing::new([0u8; 32]);
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut derived[..],
    );
    Ok(SecretBox::new(Box::new(*derived)))
}

impl AccountEnvelope {
    /// Create a fresh envelope for a new account.
    ///
    /// Generates a random content key and MAC secret, wraps both under the
    /// password-derived key, and returns the envelope together with the
    /// unlocked [`AccountKey`] so the caller can start a session without a
    /// second derivation pass.
    ///
    /// `login_hash` is whatever verifier the authentication layer wants
    /// persisted alongside the wrapped secrets (may be empty).
    pub fn seal(password: &str, login_hash: Vec<u8>) -> Result<(Self, AccountKey), CryptoError> {
        let rng = SystemRandom::new();
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill(&mut salt).map_err(|_| CryptoError::Rng)?;

        let kek = derive_account_key(password, &salt, DEFAULT_KDF_ITERATIONS)?;
        let account_key = AccountKey::random()?;

        let wrapped_content_key =
            account_key.with_content_key(|k| wrap_secret(&kek, k))?;
        let wrapped_mac_secret =
            account_key.with_mac_secret(|k| wrap_secret(&kek, k))?;

        let envelope = AccountEnvelope {
            login_hash,
            wrapped_content_key,
            wrapped_mac_secret,
            salt,
            iterations: DEFAULT_KDF_ITERATIONS,
        };
        Ok((envelope, account_key))
    }

    /// Unwrap the account secrets with a password.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::AuthenticationFailed`]: wrong password, or the
    ///   envelope was corrupted/tampered with (indistinguishable by design)
    /// - [`CryptoError::InvalidKdfParams`]: unusable stored KDF parameters
    pub fn unseal(&self, password: &str) -> Result<AccountKey, CryptoError> {
        let kek = derive_account_key(password, &self.salt, self.iterations)?;

        let content_key = unwrap_secret(&kek, &self.wrapped_content_key)?;
        let mac_secret = unwrap_secret(&kek, &self.wrapped_mac_secret)?;

        Ok(AccountKey::new(*content_key, *mac_secret))
    }

    /// Re-wrap the same secrets under a new password.
    ///
    /// The content key and MAC secret never change; only the wrapping key
    /// derived from the password is replaced, so stored records stay valid.
    pub fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<AccountEnvelope, CryptoError> {
        let account_key = self.unseal(old_password)?;

        let rng = SystemRandom::new();
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill(&mut salt).map_err(|_| CryptoError::Rng)?;

        let kek = derive_account_key(new_password, &salt, DEFAULT_KDF_ITERATIONS)?;
        let wrapped_content_key =
            account_key.with_content_key(|k| wrap_secret(&kek, k))?;
        let wrapped_mac_secret =
            account_key.with_mac_secret(|k| wrap_secret(&kek, k))?;

        Ok(AccountEnvelope {
            login_hash: self.login_hash.clone(),
            wrapped_content_key,
            wrapped_mac_secret,
            salt,
            iterations: DEFAULT_KDF_ITERATIONS,
        })
    }
}

fn wrap_secret(kek: &SecretBox<[u8; 32]>, secret: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek.expose_secret()));

    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| CryptoError::Rng)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut wrapped = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&ciphertext);
    Ok(wrapped)
}

fn unwrap_secret(
    kek: &SecretBox<[u8; 32]>,
    wrapped: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    if wrapped.len() <= NONCE_LEN {
        return Err(CryptoError::TruncatedSecret(wrapped.len()));
    }
    let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek.expose_secret()));

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)?,
    );

    let mut secret = Zeroizing::new([0u8; 32]);
    if plaintext.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            actual: plaintext.len(),
        });
    }
    secret.copy_from_slice(&plaintext);
    Ok(secret)
}
