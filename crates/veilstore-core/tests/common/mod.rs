#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use veilstore_core::store::{
    AccountRecord, BlobStore, FileRecord, FolderNode, MemoryBlobStore, MemoryMetadataStore,
    MetadataStore, NodeId, StoreError,
};
use veilstore_core::vault::{UploadItem, Vault, VaultConfig, VirtualPath};

pub const TEST_PASSWORD: &str = "integration test password";

/// A vault over in-memory stores, keeping the concrete store handles so
/// tests can count records and blobs directly.
pub struct TestVault {
    pub vault: Vault,
    pub metadata: Arc<MemoryMetadataStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn vault_for(owner: &str) -> TestVault {
    vault_with_config(owner, VaultConfig::default())
}

pub fn vault_with_config(owner: &str, config: VaultConfig) -> TestVault {
    let metadata = Arc::new(MemoryMetadataStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let vault = open_account(&metadata, &blobs, owner, config);
    TestVault { vault, metadata, blobs }
}

/// A second account sharing the same backends, for cross-owner tests.
pub fn second_account(existing: &TestVault, owner: &str) -> Vault {
    open_account(&existing.metadata, &existing.blobs, owner, VaultConfig::default())
}

fn open_account(
    metadata: &Arc<MemoryMetadataStore>,
    blobs: &Arc<MemoryBlobStore>,
    owner: &str,
    config: VaultConfig,
) -> Vault {
    let metadata: Arc<dyn MetadataStore> = metadata.clone();
    let blobs: Arc<dyn BlobStore> = blobs.clone();
    Vault::create_account(metadata, blobs, owner, TEST_PASSWORD, vec![], config)
        .expect("account creation")
}

/// A metadata store that delegates to the in-memory backend but can start
/// refusing file inserts after a budget, for exercising mid-operation
/// failure paths.
pub struct FailingMetadataStore {
    inner: MemoryMetadataStore,
    add_file_budget: AtomicUsize,
}

impl Default for FailingMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingMetadataStore {
    pub fn new() -> Self {
        FailingMetadataStore {
            inner: MemoryMetadataStore::new(),
            add_file_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow `n` more successful `add_file` calls, then fail every one.
    pub fn fail_add_file_after(&self, n: usize) {
        self.add_file_budget.store(n, Ordering::SeqCst);
    }
}

impl MetadataStore for FailingMetadataStore {
    fn add_folder(&self, node: FolderNode) -> Result<NodeId, StoreError> {
        self.inner.add_folder(node)
    }

    fn find_folder(
        &self,
        owner: &str,
        parent_key: NodeId,
        name: &str,
    ) -> Result<Option<FolderNode>, StoreError> {
        self.inner.find_folder(owner, parent_key, name)
    }

    fn list_folder_children(
        &self,
        owner: &str,
        parent_key: NodeId,
    ) -> Result<Vec<FolderNode>, StoreError> {
        self.inner.list_folder_children(owner, parent_key)
    }

    fn delete_folder(&self, owner: &str, id: NodeId) -> Result<(), StoreError> {
        self.inner.delete_folder(owner, id)
    }

    fn add_file(&self, record: FileRecord) -> Result<i64, StoreError> {
        let budget = self.add_file_budget.load(Ordering::SeqCst);
        if budget != usize::MAX {
            if budget == 0 {
                return Err(StoreError::Backend("file insert refused".into()));
            }
            self.add_file_budget.store(budget - 1, Ordering::SeqCst);
        }
        self.inner.add_file(record)
    }

    fn update_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.inner.update_file(record)
    }

    fn get_file(&self, owner: &str, id: i64) -> Result<FileRecord, StoreError> {
        self.inner.get_file(owner, id)
    }

    fn list_files_in_folder(
        &self,
        owner: &str,
        folder_path: &str,
    ) -> Result<Vec<FileRecord>, StoreError> {
        self.inner.list_files_in_folder(owner, folder_path)
    }

    fn list_files_from(&self, owner: &str, start: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.inner.list_files_from(owner, start)
    }

    fn fingerprint_exists(&self, owner: &str, fingerprint: &str) -> Result<bool, StoreError> {
        self.inner.fingerprint_exists(owner, fingerprint)
    }

    fn list_files_with_tags(
        &self,
        owner: &str,
        tags: &[String],
    ) -> Result<Vec<FileRecord>, StoreError> {
        self.inner.list_files_with_tags(owner, tags)
    }

    fn distinct_tags(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        self.inner.distinct_tags(owner)
    }

    fn distinct_folder_paths(
        &self,
        owner: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.distinct_folder_paths(owner, prefix, limit)
    }

    fn delete_file(&self, owner: &str, id: i64) -> Result<(), StoreError> {
        self.inner.delete_file(owner, id)
    }

    fn put_account(&self, record: AccountRecord) -> Result<(), StoreError> {
        self.inner.put_account(record)
    }

    fn get_account(&self, owner: &str) -> Result<AccountRecord, StoreError> {
        self.inner.get_account(owner)
    }
}

/// A vault over a [`FailingMetadataStore`], keeping the wrapper so tests can
/// arm the failure injection.
pub struct FailingVault {
    pub vault: Vault,
    pub metadata: Arc<FailingMetadataStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn failing_vault(owner: &str) -> FailingVault {
    let metadata = Arc::new(FailingMetadataStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let store: Arc<dyn MetadataStore> = metadata.clone();
    let blob_store: Arc<dyn BlobStore> = blobs.clone();
    let vault = Vault::create_account(
        store,
        blob_store,
        owner,
        TEST_PASSWORD,
        vec![],
        VaultConfig::default(),
    )
    .expect("account creation");
    FailingVault { vault, metadata, blobs }
}

pub fn item(name: &str, bytes: &[u8]) -> UploadItem {
    UploadItem {
        name: name.to_owned(),
        content_type: "application/octet-stream".to_owned(),
        description: String::new(),
        tags: vec![],
        reader: Box::new(Cursor::new(bytes.to_vec())),
    }
}

pub fn tagged_item(name: &str, bytes: &[u8], tags: &[&str]) -> UploadItem {
    let mut item = item(name, bytes);
    item.tags = tags.iter().map(|t| (*t).to_owned()).collect();
    item
}

/// Upload a single file and return its record id, failing the test on any
/// per-item error.
pub fn upload_one(tv: &TestVault, folder: &str, name: &str, bytes: &[u8]) -> i64 {
    let report = tv
        .vault
        .upload_batch(&VirtualPath::new(folder), vec![item(name, bytes)])
        .expect("upload batch");
    assert!(report.is_complete(), "upload failed: {:?}", report.failed);
    report.succeeded[0]
}

/// Download a file, returning its decrypted name and plaintext.
pub fn download(tv: &TestVault, id: i64) -> (String, Vec<u8>) {
    let mut out = Vec::new();
    let info = tv.vault.download_file(id, &mut out).expect("download");
    (info.name, out)
}
