//! Persisted record shapes.
//!
//! These are the flat rows the metadata store holds. The hierarchy the user
//! sees is entirely reconstructed from them: folder nodes form an adjacency
//! list rooted at the sentinel id 0, and file records carry a denormalized
//! copy of their folder's full logical path so subtree queries reduce to
//! ordered range scans on a single field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::crypto::envelope::AccountEnvelope;

/// Identifier of a folder node. The root folder is the sentinel
/// [`ROOT_FOLDER`] and has no stored record.
pub type NodeId = i64;

/// Sentinel parent id for top-level folders. Never stored as a node itself.
pub const ROOT_FOLDER: NodeId = 0;

/// One edge of the folder adjacency list.
///
/// `parent_name` is denormalized alongside `parent_key` so a subtree walk
/// can rebuild full paths without a lookup per level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub id: NodeId,
    pub owner: String,
    pub parent_key: NodeId,
    #[serde(rename = "parentFolderName")]
    pub parent_name: String,
    #[serde(rename = "folderName")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata for one stored file.
///
/// The plaintext filename never appears here: `encrypted_name` is an
/// AES-GCM ciphertext and `name_fingerprint` a keyed HMAC usable only for
/// duplicate detection. `folder_path` is the normalized logical folder
/// (leading and trailing slash) and is the only plaintext location field;
/// it is what range scans and equality listings filter on.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub owner: String,
    #[serde(rename = "encryptedFilename")]
    #[serde_as(as = "Base64")]
    pub encrypted_name: Vec<u8>,
    #[serde(rename = "filenameFingerprint")]
    pub name_fingerprint: String,
    pub folder_path: String,
    /// Key of the encrypted content in the blob store.
    pub blob_ref: String,
    #[serde(rename = "fileType")]
    pub content_type: String,
    #[serde(rename = "fileSize")]
    pub size_bytes: u64,
    #[serde(rename = "uploadDate")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(rename = "downloads")]
    pub download_count: u64,
    pub description: String,
    /// Lower-cased at insert time.
    pub tags: Vec<String>,
    /// Whether the plaintext was deflated before encryption.
    pub compressed: bool,
    /// Lowercase hex SHA-256 of the plaintext.
    pub content_digest: String,
}

/// One account row: the secret envelope plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub owner: String,
    #[serde(flatten)]
    pub envelope: AccountEnvelope,
    pub created_at: DateTime<Utc>,
}
