//! In-process reference backends.
//!
//! Faithful to the weak query model the traits promise: the metadata store
//! keeps flat maps and answers every query by scanning, the blob store is a
//! keyed byte map. Used by the integration tests and for local runs; a real
//! deployment plugs in adapters over its datastore and object store.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::records::{AccountRecord, FileRecord, FolderNode, NodeId};
use super::{BlobStore, BlobWrite, MetadataStore, StoreError};

#[derive(Default)]
struct MetadataInner {
    folders: Vec<FolderNode>,
    files: HashMap<i64, FileRecord>,
    accounts: HashMap<String, AccountRecord>,
    next_id: i64,
}

/// Flat in-memory metadata store behind a single `RwLock`.
pub struct MemoryMetadataStore {
    inner: RwLock<MetadataInner>,
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        MemoryMetadataStore {
            // Id 0 is the root sentinel, so allocation starts at 1.
            inner: RwLock::new(MetadataInner { next_id: 1, ..MetadataInner::default() }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MetadataInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("metadata lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MetadataInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("metadata lock poisoned".into()))
    }

    /// Total folder node count, duplicates from lost races included.
    pub fn folder_count(&self) -> usize {
        self.inner.read().map(|g| g.folders.len()).unwrap_or(0)
    }

    /// Total file record count.
    pub fn file_count(&self) -> usize {
        self.inner.read().map(|g| g.files.len()).unwrap_or(0)
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn add_folder(&self, mut node: FolderNode) -> Result<NodeId, StoreError> {
        let mut inner = self.write()?;
        node.id = inner.next_id;
        inner.next_id += 1;
        let id = node.id;
        inner.folders.push(node);
        Ok(id)
    }

    fn find_folder(
        &self,
        owner: &str,
        parent_key: NodeId,
        name: &str,
    ) -> Result<Option<FolderNode>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .folders
            .iter()
            .find(|f| f.owner == owner && f.parent_key == parent_key && f.name == name)
            .cloned())
    }

    fn list_folder_children(
        &self,
        owner: &str,
        parent_key: NodeId,
    ) -> Result<Vec<FolderNode>, StoreError> {
        let inner = self.read()?;
        let mut children: Vec<FolderNode> = inner
            .folders
            .iter()
            .filter(|f| f.owner == owner && f.parent_key == parent_key)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn delete_folder(&self, owner: &str, id: NodeId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let position = inner.folders.iter().position(|f| f.id == id);
        match position {
            Some(i) if inner.folders[i].owner == owner => {
                inner.folders.remove(i);
                Ok(())
            }
            Some(_) => Err(StoreError::NotOwner),
            None => Err(StoreError::NotFound),
        }
    }

    fn add_file(&self, mut record: FileRecord) -> Result<i64, StoreError> {
        let mut inner = self.write()?;
        record.id = inner.next_id;
        inner.next_id += 1;
        let id = record.id;
        inner.files.insert(id, record);
        Ok(id)
    }

    fn update_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        match inner.files.get(&record.id) {
            Some(existing) if existing.owner == record.owner => {
                inner.files.insert(record.id, record.clone());
                Ok(())
            }
            Some(_) => Err(StoreError::NotOwner),
            None => Err(StoreError::NotFound),
        }
    }

    fn get_file(&self, owner: &str, id: i64) -> Result<FileRecord, StoreError> {
        let inner = self.read()?;
        match inner.files.get(&id) {
            Some(record) if record.owner == owner => Ok(record.clone()),
            Some(_) => Err(StoreError::NotOwner),
            None => Err(StoreError::NotFound),
        }
    }

    fn list_files_in_folder(
        &self,
        owner: &str,
        folder_path: &str,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let inner = self.read()?;
        let mut records: Vec<FileRecord> = inner
            .files
            .values()
            .filter(|f| f.owner == owner && f.folder_path == folder_path)
            .cloned()
            .collect();
        records.sort_by_key(|f| f.id);
        Ok(records)
    }

    fn list_files_from(&self, owner: &str, start: &str) -> Result<Vec<FileRecord>, StoreError> {
        let inner = self.read()?;
        let mut records: Vec<FileRecord> = inner
            .files
            .values()
            .filter(|f| f.owner == owner && f.folder_path.as_str() >= start)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.folder_path.cmp(&b.folder_path).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn fingerprint_exists(&self, owner: &str, fingerprint: &str) -> Result<bool, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .files
            .values()
            .any(|f| f.owner == owner && f.name_fingerprint == fingerprint))
    }

    fn list_files_with_tags(
        &self,
        owner: &str,
        tags: &[String],
    ) -> Result<Vec<FileRecord>, StoreError> {
        let inner = self.read()?;
        let mut records: Vec<FileRecord> = inner
            .files
            .values()
            .filter(|f| f.owner == owner && tags.iter().all(|t| f.tags.contains(t)))
            .cloned()
            .collect();
        records.sort_by_key(|f| f.id);
        Ok(records)
    }

    fn distinct_tags(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.read()?;
        let mut tags: Vec<String> = inner
            .files
            .values()
            .filter(|f| f.owner == owner)
            .flat_map(|f| f.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    fn distinct_folder_paths(
        &self,
        owner: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.read()?;
        let mut paths: Vec<String> = inner
            .files
            .values()
            .filter(|f| f.owner == owner && f.folder_path.starts_with(prefix))
            .map(|f| f.folder_path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths.truncate(limit);
        Ok(paths)
    }

    fn delete_file(&self, owner: &str, id: i64) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        match inner.files.get(&id) {
            Some(record) if record.owner == owner => {
                inner.files.remove(&id);
                Ok(())
            }
            Some(_) => Err(StoreError::NotOwner),
            None => Err(StoreError::NotFound),
        }
    }

    fn put_account(&self, record: AccountRecord) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.accounts.insert(record.owner.clone(), record);
        Ok(())
    }

    fn get_account(&self, owner: &str) -> Result<AccountRecord, StoreError> {
        let inner = self.read()?;
        inner.accounts.get(owner).cloned().ok_or(StoreError::NotFound)
    }
}

type BlobMap = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// Keyed byte-map blob store.
#[derive(Default, Clone)]
pub struct MemoryBlobStore {
    blobs: BlobMap,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().map(|g| g.contains_key(key)).unwrap_or(false)
    }
}

struct MemoryBlobWriter {
    key: String,
    buf: Vec<u8>,
    blobs: BlobMap,
}

impl Write for MemoryBlobWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl BlobWrite for MemoryBlobWriter {
    fn finish(self: Box<Self>) -> Result<u64, StoreError> {
        let len = self.buf.len() as u64;
        self.blobs
            .write()
            .map_err(|_| StoreError::Backend("blob lock poisoned".into()))?
            .insert(self.key, self.buf);
        Ok(len)
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str) -> Result<Box<dyn BlobWrite>, StoreError> {
        Ok(Box::new(MemoryBlobWriter {
            key: key.to_owned(),
            buf: Vec::new(),
            blobs: Arc::clone(&self.blobs),
        }))
    }

    fn get(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StoreError::Backend("blob lock poisoned".into()))?;
        let bytes = blobs.get(key).cloned().ok_or(StoreError::NotFound)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StoreError::Backend("blob lock poisoned".into()))?;
        blobs.remove(key).map(|_| ()).ok_or(StoreError::NotFound)
    }
}
