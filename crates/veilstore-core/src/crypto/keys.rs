use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretBox};

use super::CryptoError;

/// Key material for one unlocked account.
///
/// Holds the 256-bit content key (filename and content encryption) and the
/// 256-bit MAC secret (duplicate-detection fingerprints). Both live only for
/// the duration of an authenticated session: they are unwrapped from the
/// account envelope on login and must never be written to durable storage in
/// plaintext.
///
/// # Security
///
/// The keys are stored in [`secrecy::SecretBox`] containers, which zeroize
/// the backing memory on drop and redact the value from `Debug` output.
/// Access is only possible through the scoped `with_*` methods, so raw key
/// bytes never escape into caller-owned buffers.
pub struct AccountKey {
    content_key: SecretBox<[u8; 32]>,
    mac_secret: SecretBox<[u8; 32]>,
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKey")
            .field("content_key", &"[REDACTED]")
            .field("mac_secret", &"[REDACTED]")
            .finish()
    }
}

impl AccountKey {
    /// Create an account key from raw key material.
    ///
    /// The caller is responsible for zeroizing its own copies of the arrays
    /// if they contain live secrets.
    pub fn new(content_key: [u8; 32], mac_secret: [u8; 32]) -> Self {
        AccountKey {
            content_key: SecretBox::new(Box::new(content_key)),
            mac_secret: SecretBox::new(Box::new(mac_secret)),
        }
    }

    /// Generate a fresh random key pair for a new account.
    pub fn random() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let mut content_key = [0u8; 32];
        let mut mac_secret = [0u8; 32];
        rng.fill(&mut content_key).map_err(|_| CryptoError::Rng)?;
        rng.fill(&mut mac_secret).map_err(|_| CryptoError::Rng)?;
        Ok(Self::new(content_key, mac_secret))
    }

    /// Execute a closure with scoped access to the content key.
    pub fn with_content_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        f(self.content_key.expose_secret())
    }

    /// Execute a closure with scoped access to the MAC secret.
    pub fn with_mac_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        f(self.mac_secret.expose_secret())
    }
}
