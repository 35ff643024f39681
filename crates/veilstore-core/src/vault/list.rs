//! Listing projections.
//!
//! Everything a browsing client sees comes through [`FsEntry`]: a flattened
//! JSON shape covering both folders and files, with file-only fields elided
//! for folder rows. Filenames are decrypted on the way out; nothing
//! encrypted leaks into the projection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::crypto::name;
use crate::store::{FileRecord, FolderNode};

use super::path::VirtualPath;
use super::{Vault, VaultError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    #[serde(rename = "filename")]
    File,
    #[serde(rename = "folder")]
    Folder,
}

/// One row of a directory or search listing.
#[derive(Debug, Clone, Serialize)]
pub struct FsEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub fullpath: String,
    pub upload_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl Vault {
    /// List one folder level: subfolders first, then files.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn list_path(&self, path: &VirtualPath) -> Result<Vec<FsEntry>, VaultError> {
        let (files, folders) = self.list_children(path)?;

        let mut entries = Vec::with_capacity(files.len() + folders.len());
        for folder in folders {
            entries.push(folder_entry(&folder, path));
        }
        for record in files {
            entries.push(self.file_entry(&record)?);
        }
        Ok(entries)
    }

    /// All files carrying every one of the given tags. Matching is
    /// case-insensitive because tags are stored lower-cased.
    pub fn list_by_tags(&self, tags: &[String]) -> Result<Vec<FsEntry>, VaultError> {
        let tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let records = self.metadata.list_files_with_tags(&self.owner, &tags)?;
        records.iter().map(|r| self.file_entry(r)).collect()
    }

    /// Every distinct tag in use, sorted.
    pub fn list_tags(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.metadata.distinct_tags(&self.owner)?)
    }

    /// Distinct folder paths starting with a prefix, for autocomplete.
    pub fn list_folder_paths(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, VaultError> {
        Ok(self.metadata.distinct_folder_paths(&self.owner, prefix, limit)?)
    }

    pub(super) fn file_entry(&self, record: &FileRecord) -> Result<FsEntry, VaultError> {
        let plaintext_name = name::decrypt_filename(&self.key, &record.encrypted_name)?;
        let fullpath = format!("{}{}", record.folder_path, plaintext_name);
        Ok(FsEntry {
            id: record.id,
            kind: EntryKind::File,
            name: plaintext_name,
            fullpath,
            upload_date: record.uploaded_at,
            filetype: Some(record.content_type.clone()),
            filesize: Some(record.size_bytes),
            description: Some(record.description.clone()),
            tags: Some(record.tags.clone()),
            digest: Some(record.content_digest.clone()),
        })
    }
}

fn folder_entry(node: &FolderNode, parent: &VirtualPath) -> FsEntry {
    FsEntry {
        id: node.id,
        kind: EntryKind::Folder,
        name: node.name.clone(),
        fullpath: parent.join(&node.name).as_str().to_owned(),
        upload_date: node.created_at,
        filetype: None,
        filesize: None,
        description: None,
        tags: None,
        digest: None,
    }
}
