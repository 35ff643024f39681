//! The bulk coordinator: multi-item delete, batch upload, zip download.
//!
//! Fan-out runs on dedicated rayon pools sized from [`VaultConfig`], and
//! every pool joins before its operation returns; nothing keeps running
//! after the call. Per-item outcomes are aggregated into a [`BulkReport`]
//! and never swallowed: a delete that loses three of fifty files says so.

use std::io::{Read, Seek, Write};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::crypto::{name, stream};
use crate::store::FileRecord;

use super::index::FolderMemo;
use super::path::VirtualPath;
use super::{Vault, VaultError};

/// One failed item of a bulk operation.
#[derive(Debug)]
pub struct BulkFailure {
    /// What failed: a file id for deletes, the submitted name for uploads.
    pub item: String,
    pub error: VaultError,
}

/// Aggregated outcome of a bulk operation.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Record ids that completed.
    pub succeeded: Vec<i64>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn a partially failed report into an error, passing complete ones
    /// through.
    pub fn into_result(self) -> Result<BulkReport, VaultError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(VaultError::Partial { report: self })
        }
    }

    fn collect(outcomes: Vec<Result<i64, BulkFailure>>) -> Self {
        let mut report = BulkReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(id) => report.succeeded.push(id),
                Err(failure) => report.failed.push(failure),
            }
        }
        report
    }
}

/// One file submitted to [`Vault::upload_batch`].
///
/// `name` may contain slashes; the directory part is appended to the batch
/// destination folder, so directory uploads keep their shape.
pub struct UploadItem {
    pub name: String,
    pub content_type: String,
    pub description: String,
    pub tags: Vec<String>,
    pub reader: Box<dyn Read + Send>,
}

/// Result of a single-file download.
#[derive(Debug)]
pub struct DownloadedFile {
    /// Decrypted filename, for Content-Disposition.
    pub name: String,
    pub content_type: String,
    /// Plaintext bytes written to the sink.
    pub bytes: u64,
}

impl Vault {
    /// Delete one file: blob first, then the record. Ownership-checked.
    pub fn delete_file(&self, id: i64) -> Result<(), VaultError> {
        let record = self.metadata.get_file(&self.owner, id)?;
        self.delete_record(&record)
    }

    fn delete_record(&self, record: &FileRecord) -> Result<(), VaultError> {
        // Blob first: a failure leaves the record in place, so the delete
        // stays retryable instead of orphaning an unreferenced blob.
        self.blobs.delete(&record.blob_ref)?;
        self.metadata.delete_file(&self.owner, record.id)?;
        Ok(())
    }

    /// Delete everything at or below a path.
    ///
    /// The root is always rejected. File deletions fan out over the delete
    /// pool; the folder skeleton is only removed once every file went, so a
    /// partial failure leaves a retryable tree behind.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn delete_subtree(&self, path: &VirtualPath) -> Result<BulkReport, VaultError> {
        if path.is_root() {
            return Err(VaultError::RootFolder);
        }
        let nodes = self.collect_subtree_nodes(path)?;
        let files = self.list_subtree(path)?;
        let total = files.len();

        let pool = self.worker_pool(self.config.delete_workers)?;
        let outcomes: Vec<Result<i64, BulkFailure>> = pool.install(|| {
            files
                .into_par_iter()
                .map(|record| {
                    self.delete_record(&record).map(|()| record.id).map_err(|error| {
                        BulkFailure { item: record.id.to_string(), error }
                    })
                })
                .collect()
        });
        let report = BulkReport::collect(outcomes);

        if report.is_complete() {
            for (node_id, _) in nodes.iter().rev() {
                self.metadata.delete_folder(&self.owner, *node_id)?;
            }
            debug!(total, "subtree deleted");
        } else {
            warn!(
                failed = report.failed.len(),
                total, "subtree delete incomplete, folder skeleton kept"
            );
        }
        Ok(report)
    }

    /// Upload a batch of files into a virtual folder.
    ///
    /// Destination folders (including directory parts inside item names) are
    /// resolved once up front through a shared memo, then items are
    /// encrypted and inserted on the upload pool. A name that already exists
    /// in its folder fails that item with [`VaultError::Duplicate`]; the
    /// rest of the batch proceeds.
    #[instrument(skip(self, items), fields(owner = %self.owner, items = items.len()))]
    pub fn upload_batch(
        &self,
        folder: &VirtualPath,
        items: Vec<UploadItem>,
    ) -> Result<BulkReport, VaultError> {
        // Folder creation is not parallel-safe (check-then-insert), so all
        // resolution happens here on one thread before the fan-out.
        let mut memo = FolderMemo::new();
        let mut staged: Vec<(VirtualPath, String, UploadItem)> = Vec::with_capacity(items.len());
        for item in items {
            let (target, leaf) = match split_item_name(folder, &item.name) {
                Some(split) => split,
                None => {
                    staged.push((folder.clone(), String::new(), item));
                    continue;
                }
            };
            self.resolve_or_create_with(&target, &mut memo)?;
            staged.push((target, leaf, item));
        }

        let pool = self.worker_pool(self.config.upload_workers)?;
        let outcomes: Vec<Result<i64, BulkFailure>> = pool.install(|| {
            staged
                .into_par_iter()
                .map(|(target, leaf, item)| {
                    let submitted = item.name.clone();
                    self.upload_one(&target, &leaf, item)
                        .map_err(|error| BulkFailure { item: submitted, error })
                })
                .collect()
        });
        Ok(BulkReport::collect(outcomes))
    }

    fn upload_one(
        &self,
        folder: &VirtualPath,
        leaf: &str,
        item: UploadItem,
    ) -> Result<i64, VaultError> {
        if leaf.is_empty() {
            return Err(VaultError::EmptyPath);
        }
        let fingerprint = name::name_fingerprint(&self.key, folder.as_str(), leaf);
        if self.metadata.fingerprint_exists(&self.owner, &fingerprint)? {
            return Err(VaultError::Duplicate {
                folder: folder.to_string(),
                name: leaf.to_owned(),
            });
        }

        let blob_ref = Uuid::new_v4().to_string();
        let mut writer = self.blobs.put(&blob_ref)?;
        let summary = stream::encrypt_stream(
            &self.key,
            item.reader,
            &mut writer,
            self.config.compress_uploads,
        )?;
        writer.finish()?;

        let record = FileRecord {
            id: 0,
            owner: self.owner.clone(),
            encrypted_name: name::encrypt_filename(&self.key, leaf)?,
            name_fingerprint: fingerprint,
            folder_path: folder.as_str().to_owned(),
            blob_ref,
            content_type: item.content_type,
            size_bytes: summary.bytes,
            uploaded_at: chrono::Utc::now(),
            download_count: 0,
            description: item.description,
            tags: item.tags.iter().map(|t| t.to_lowercase()).collect(),
            compressed: summary.compressed,
            content_digest: summary.digest,
        };
        Ok(self.metadata.add_file(record)?)
    }

    /// Decrypt one file into a sink and bump its download counter.
    #[instrument(skip(self, sink), fields(owner = %self.owner))]
    pub fn download_file(
        &self,
        id: i64,
        sink: &mut dyn Write,
    ) -> Result<DownloadedFile, VaultError> {
        let mut record = self.metadata.get_file(&self.owner, id)?;
        let plaintext_name = name::decrypt_filename(&self.key, &record.encrypted_name)?;

        let reader = self.blobs.get(&record.blob_ref)?;
        let bytes = stream::decrypt_stream(&self.key, reader, sink, record.compressed)?;

        record.download_count += 1;
        self.metadata.update_file(&record)?;

        Ok(DownloadedFile {
            name: plaintext_name,
            content_type: record.content_type,
            bytes,
        })
    }

    /// Stream every file under a path into a zip archive.
    ///
    /// Entries are named by their decrypted logical path relative to the
    /// download root. Written sequentially: zip output is one stream, so
    /// there is nothing to fan out. Returns the entry count; a subtree with
    /// no files is an error, not an empty archive.
    #[instrument(skip(self, sink), fields(owner = %self.owner))]
    pub fn download_subtree_zip<W: Write + Seek>(
        &self,
        path: &VirtualPath,
        sink: W,
    ) -> Result<usize, VaultError> {
        let files = self.list_subtree(path)?;
        if files.is_empty() {
            return Err(VaultError::EmptySubtree { path: path.to_string() });
        }

        let mut archive = ZipWriter::new(sink);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for record in &files {
            let plaintext_name = name::decrypt_filename(&self.key, &record.encrypted_name)?;
            let folder = VirtualPath::new(&record.folder_path);
            let relative = folder.relative_to(path).unwrap_or_default();
            archive.start_file(format!("{relative}{plaintext_name}"), options)?;

            let reader = self.blobs.get(&record.blob_ref)?;
            stream::decrypt_stream(&self.key, reader, &mut archive, record.compressed)?;
        }
        archive.finish()?;
        debug!(entries = files.len(), "zip archive written");
        Ok(files.len())
    }

    fn worker_pool(&self, threads: usize) -> Result<rayon::ThreadPool, VaultError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| VaultError::Pool(e.to_string()))
    }
}

/// Split a submitted item name into its destination folder and leaf name.
/// The directory part is taken from the name itself, so `..` cannot climb
/// above the batch folder. `None` when the name cleans away to nothing.
fn split_item_name(base: &VirtualPath, submitted: &str) -> Option<(VirtualPath, String)> {
    let rel = VirtualPath::new(submitted);
    let leaf = rel.leaf()?.to_owned();
    let parent = rel.parent()?;
    let target = if parent.is_root() { base.clone() } else { base.join(parent.as_str()) };
    Some((target, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_item_name_handles_nested_and_flat_names() {
        let base = VirtualPath::new("/inbox/");

        let (target, leaf) = split_item_name(&base, "report.pdf").unwrap();
        assert_eq!(target.as_str(), "/inbox/");
        assert_eq!(leaf, "report.pdf");

        let (target, leaf) = split_item_name(&base, "2024/q3/report.pdf").unwrap();
        assert_eq!(target.as_str(), "/inbox/2024/q3/");
        assert_eq!(leaf, "report.pdf");

        assert!(split_item_name(&base, "").is_none());
        assert!(split_item_name(&VirtualPath::root(), "///").is_none());
    }

    #[test]
    fn split_item_name_cannot_climb_above_the_batch_folder() {
        let base = VirtualPath::new("/inbox/");
        let (target, leaf) = split_item_name(&base, "../../etc/passwd").unwrap();
        assert_eq!(target.as_str(), "/inbox/etc/");
        assert_eq!(leaf, "passwd");
    }

    #[test]
    fn report_into_result_distinguishes_partial() {
        let complete = BulkReport { succeeded: vec![1, 2], failed: vec![] };
        assert!(complete.into_result().is_ok());

        let partial = BulkReport {
            succeeded: vec![1],
            failed: vec![BulkFailure { item: "2".into(), error: VaultError::EmptyPath }],
        };
        let err = partial.into_result().unwrap_err();
        assert_eq!(err.status_hint(), 500);
    }
}
