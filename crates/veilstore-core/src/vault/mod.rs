//! The vault: folder index, listings and bulk operations for one account.
//!
//! A [`Vault`] ties together an owner, the two backend stores and the
//! unlocked account key, and exposes every high-level operation: path
//! resolution, listing, subtree rename, batch upload, bounded-parallel
//! delete, zip download, usage statistics. Construction requires an already
//! unsealed
//! [`AccountKey`], obtained through [`Vault::unlock`] (password + cache) or
//! [`Vault::create_account`].

pub mod bulk;
pub mod cache;
pub mod index;
pub mod list;
pub mod path;
pub mod stats;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::crypto::envelope::AccountEnvelope;
use crate::crypto::keys::AccountKey;
use crate::crypto::name::NameError;
use crate::crypto::stream::StreamError;
use crate::crypto::CryptoError;
use crate::store::{AccountRecord, BlobStore, MetadataStore, StoreError};

pub use bulk::{BulkFailure, BulkReport, UploadItem};
pub use cache::SecretsCache;
pub use list::{EntryKind, FsEntry};
pub use path::VirtualPath;
pub use stats::VaultStats;

/// Tuning knobs for one vault instance.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Worker threads for bulk deletes.
    pub delete_workers: usize,
    /// Worker threads for batch uploads.
    pub upload_workers: usize,
    /// Maximum folder nesting a subtree walk will follow.
    pub subtree_depth_cap: usize,
    /// Deflate plaintext before encrypting uploads.
    pub compress_uploads: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            delete_workers: 50,
            upload_workers: 8,
            subtree_depth_cap: 64,
            compress_uploads: true,
        }
    }
}

impl VaultConfig {
    fn validate(&self) -> Result<(), VaultError> {
        if self.delete_workers == 0 || self.upload_workers == 0 {
            return Err(VaultError::InvalidConfig("worker pool sizes must be non-zero".into()));
        }
        if self.subtree_depth_cap == 0 {
            return Err(VaultError::InvalidConfig("subtree depth cap must be non-zero".into()));
        }
        Ok(())
    }
}

/// Errors from vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("zip writing failed")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O failure")]
    Io(#[from] std::io::Error),

    /// A file with the same name already exists in the folder.
    #[error("a file named {name:?} already exists in {folder}")]
    Duplicate { folder: String, name: String },

    /// The operation targeted the root folder, which cannot be deleted or
    /// renamed.
    #[error("operation not permitted on the root folder")]
    RootFolder,

    /// The rename destination already contains conflicting entries.
    #[error("rename destination {path} already exists")]
    DestinationConflict { path: String },

    /// The operation requires a non-root, non-empty path.
    #[error("a non-empty virtual path is required")]
    EmptyPath,

    /// A subtree operation found no files under the path.
    #[error("no files under {path}")]
    EmptySubtree { path: String },

    /// Folder nesting exceeded the configured cap during a subtree walk.
    #[error("folder nesting exceeds the depth cap ({cap})")]
    DepthCapExceeded { cap: usize },

    #[error("invalid vault configuration: {0}")]
    InvalidConfig(String),

    /// A bounded worker pool could not be constructed.
    #[error("worker pool construction failed: {0}")]
    Pool(String),

    /// A rename stopped partway: `moved` of `total` records reached the new
    /// location before the underlying failure.
    #[error("rename to {new_path} interrupted after {moved} of {total} records")]
    RenameInterrupted {
        moved: usize,
        total: usize,
        new_path: String,
        #[source]
        source: Box<VaultError>,
    },

    /// A bulk operation completed with per-item failures.
    #[error("bulk operation finished with {} failed item(s)", .report.failed.len())]
    Partial { report: BulkReport },
}

impl VaultError {
    /// The HTTP status an embedding layer should map this error to.
    ///
    /// Ownership violations are 403 rather than 401: by the time a vault
    /// exists the caller is authenticated, just not authorized for the
    /// record. Only a failed envelope unseal (wrong password) is 401.
    pub fn status_hint(&self) -> u16 {
        match self {
            VaultError::Store(StoreError::NotFound) | VaultError::EmptySubtree { .. } => 404,
            VaultError::Store(StoreError::NotOwner) | VaultError::RootFolder => 403,
            VaultError::Crypto(CryptoError::AuthenticationFailed) => 401,
            VaultError::Duplicate { .. } | VaultError::DestinationConflict { .. } => 409,
            VaultError::EmptyPath | VaultError::InvalidConfig(_) => 400,
            _ => 500,
        }
    }
}

/// One account's unlocked view of the stores.
pub struct Vault {
    owner: String,
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    key: Arc<AccountKey>,
    config: VaultConfig,
}

impl Vault {
    /// Assemble a vault from an already unlocked key.
    pub fn open(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        owner: &str,
        key: Arc<AccountKey>,
        config: VaultConfig,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        Ok(Vault {
            owner: owner.to_owned(),
            metadata,
            blobs,
            key,
            config,
        })
    }

    /// Create a brand-new account and return its unlocked vault.
    ///
    /// Seals a fresh envelope under `password` and stores the account row.
    /// `login_hash` is an opaque verifier owned by the authentication layer
    /// (may be empty).
    #[instrument(skip(metadata, blobs, password, login_hash))]
    pub fn create_account(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        owner: &str,
        password: &str,
        login_hash: Vec<u8>,
        config: VaultConfig,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        let (envelope, key) = AccountEnvelope::seal(password, login_hash)?;
        metadata.put_account(AccountRecord {
            owner: owner.to_owned(),
            envelope,
            created_at: Utc::now(),
        })?;
        debug!(owner, "account created");
        Ok(Vault {
            owner: owner.to_owned(),
            metadata,
            blobs,
            key: Arc::new(key),
            config,
        })
    }

    /// Unlock an existing account with its password.
    ///
    /// Consults the session cache first; on a miss the stored envelope is
    /// unsealed (one PBKDF2 derivation) and the key cached. A wrong password
    /// surfaces as [`CryptoError::AuthenticationFailed`].
    #[instrument(skip(metadata, blobs, password, secrets))]
    pub fn unlock(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        owner: &str,
        password: &str,
        secrets: &SecretsCache,
        config: VaultConfig,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        let key = match secrets.get(owner) {
            Some(cached) => cached,
            None => {
                let account = metadata.get_account(owner)?;
                let key = Arc::new(account.envelope.unseal(password)?);
                secrets.insert(owner, Arc::clone(&key));
                debug!(owner, "envelope unsealed and cached");
                key
            }
        };
        Ok(Vault {
            owner: owner.to_owned(),
            metadata,
            blobs,
            key,
            config,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
