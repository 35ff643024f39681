//! Backend contracts and reference implementations.
//!
//! The core never talks to a real database or object store directly; it
//! depends on the two traits here. Both model deliberately weak backends:
//! the metadata store supports equality filters, a single ordered range
//! scan on `folder_path` and distinct projections, but no joins, no
//! hierarchy and no cross-record transactions. Everything cleverer lives
//! in [`crate::vault`].

pub mod memory;
pub mod records;

use std::io::{Read, Write};

use thiserror::Error;

pub use memory::{MemoryBlobStore, MemoryMetadataStore};
pub use records::{AccountRecord, FileRecord, FolderNode, NodeId, ROOT_FOLDER};

/// Errors from backend adapters.
///
/// Not-found and ownership violations are distinct on purpose: a caller may
/// translate the former into a 404 and the latter into a 403, and conflating
/// them would leak which ids exist.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record with that key exists.
    #[error("record not found")]
    NotFound,

    /// The record exists but belongs to a different account.
    #[error("record belongs to another account")]
    NotOwner,

    /// The backend failed in a way the core cannot interpret.
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("store I/O failure")]
    Io(#[from] std::io::Error),
}

/// Flat metadata backend.
///
/// Every method is scoped to an `owner`; implementations must never return
/// another account's records from a listing, and point lookups must report
/// [`StoreError::NotOwner`] when the id exists under a different owner.
pub trait MetadataStore: Send + Sync {
    /// Insert a folder node, assigning and returning its id. The id field
    /// of the passed node is ignored.
    fn add_folder(&self, node: FolderNode) -> Result<NodeId, StoreError>;

    /// Equality lookup on `(owner, parent_key, name)`. With duplicate nodes
    /// from a lost creation race, the first match wins.
    fn find_folder(
        &self,
        owner: &str,
        parent_key: NodeId,
        name: &str,
    ) -> Result<Option<FolderNode>, StoreError>;

    /// All folder nodes whose parent is `parent_key`, ordered by name.
    fn list_folder_children(
        &self,
        owner: &str,
        parent_key: NodeId,
    ) -> Result<Vec<FolderNode>, StoreError>;

    fn delete_folder(&self, owner: &str, id: NodeId) -> Result<(), StoreError>;

    /// Insert a file record, assigning and returning its id.
    fn add_file(&self, record: FileRecord) -> Result<i64, StoreError>;

    /// Replace the record with the same id. Ownership-checked.
    fn update_file(&self, record: &FileRecord) -> Result<(), StoreError>;

    fn get_file(&self, owner: &str, id: i64) -> Result<FileRecord, StoreError>;

    /// Equality listing on the denormalized folder path.
    fn list_files_in_folder(
        &self,
        owner: &str,
        folder_path: &str,
    ) -> Result<Vec<FileRecord>, StoreError>;

    /// Ordered range scan: all records with `folder_path >= start`,
    /// lexicographically ascending. Subtree operations narrow this with a
    /// segment-prefix filter on their side.
    fn list_files_from(&self, owner: &str, start: &str) -> Result<Vec<FileRecord>, StoreError>;

    /// Whether any record of this owner carries the fingerprint. The
    /// fingerprint already binds the folder path, so no location filter is
    /// needed.
    fn fingerprint_exists(&self, owner: &str, fingerprint: &str) -> Result<bool, StoreError>;

    /// Records tagged with *all* of the given (lower-cased) tags.
    fn list_files_with_tags(
        &self,
        owner: &str,
        tags: &[String],
    ) -> Result<Vec<FileRecord>, StoreError>;

    /// Distinct projection over all tag values, sorted.
    fn distinct_tags(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    /// Distinct folder paths starting with `prefix`, sorted, at most
    /// `limit` entries.
    fn distinct_folder_paths(
        &self,
        owner: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    fn delete_file(&self, owner: &str, id: i64) -> Result<(), StoreError>;

    /// Upsert the account row for `record.owner`.
    fn put_account(&self, record: AccountRecord) -> Result<(), StoreError>;

    fn get_account(&self, owner: &str) -> Result<AccountRecord, StoreError>;
}

/// In-flight blob upload. Obtained from [`BlobStore::put`]; the blob only
/// becomes visible once [`BlobWrite::finish`] returns.
pub trait BlobWrite: Write + Send {
    /// Commit the blob and return the number of bytes stored.
    fn finish(self: Box<Self>) -> Result<u64, StoreError>;
}

/// Opaque blob backend. Keys are caller-chosen strings; contents are
/// already encrypted before they reach this layer.
pub trait BlobStore: Send + Sync {
    /// Open a writer for a new blob under `key`.
    fn put(&self, key: &str) -> Result<Box<dyn BlobWrite>, StoreError>;

    /// Open a reader over an existing blob.
    fn get(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
