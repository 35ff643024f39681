//! The folder index: tree reconstruction and mutation over the flat store.
//!
//! Folder nodes form an adjacency list keyed by `(owner, parent_key, name)`
//! with the root as sentinel id 0. Resolution walks one equality query per
//! segment; subtree traversal is an explicit level-by-level work queue with
//! a depth cap rather than recursion, fanning each level out in parallel and
//! joining before descending.
//!
//! Folder creation is check-then-insert. Two racing creators of the same
//! brand-new path can both insert a node; the flat store offers no
//! transaction to prevent it, so lookups take the first match and the
//! duplicate is swept up by delete. Accepted, not hidden.

use std::collections::HashMap;

use chrono::Utc;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument, warn};

use crate::store::{FileRecord, FolderNode, NodeId, ROOT_FOLDER, StoreError};

use super::path::VirtualPath;
use super::{Vault, VaultError};
use crate::crypto::name;

/// Per-batch memo of already resolved folder paths. Owned by a single call
/// tree; never shared across requests.
pub type FolderMemo = HashMap<String, NodeId>;

impl Vault {
    /// Resolve a path to its folder id without creating anything.
    /// `Ok(None)` when some segment does not exist.
    pub fn resolve(&self, path: &VirtualPath) -> Result<Option<NodeId>, VaultError> {
        let mut parent = ROOT_FOLDER;
        for segment in path.segments() {
            match self.metadata.find_folder(&self.owner, parent, segment)? {
                Some(node) => parent = node.id,
                None => return Ok(None),
            }
        }
        Ok(Some(parent))
    }

    /// Resolve a path, creating any missing folders along the way.
    /// Idempotent: resolving the same path twice yields the same id.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn resolve_or_create(&self, path: &VirtualPath) -> Result<NodeId, VaultError> {
        let mut memo = FolderMemo::new();
        self.resolve_or_create_with(path, &mut memo)
    }

    /// Memoized variant for batch operations that resolve many paths with
    /// shared prefixes: each prefix costs at most one store round-trip per
    /// batch.
    pub fn resolve_or_create_with(
        &self,
        path: &VirtualPath,
        memo: &mut FolderMemo,
    ) -> Result<NodeId, VaultError> {
        let mut parent = ROOT_FOLDER;
        let mut parent_name = String::new();
        let mut prefix = String::from("/");

        for segment in path.segments() {
            prefix.push_str(segment);
            prefix.push('/');

            parent = match memo.get(&prefix) {
                Some(&id) => id,
                None => {
                    let id = match self.metadata.find_folder(&self.owner, parent, segment)? {
                        Some(node) => node.id,
                        None => {
                            let id = self.metadata.add_folder(FolderNode {
                                id: 0,
                                owner: self.owner.clone(),
                                parent_key: parent,
                                parent_name: parent_name.clone(),
                                name: segment.to_owned(),
                                created_at: Utc::now(),
                            })?;
                            debug!(path = %prefix, id, "folder created");
                            id
                        }
                    };
                    memo.insert(prefix.clone(), id);
                    id
                }
            };
            parent_name = segment.to_owned();
        }
        Ok(parent)
    }

    /// Direct children of a folder: its files and its subfolder nodes.
    pub fn list_children(
        &self,
        path: &VirtualPath,
    ) -> Result<(Vec<FileRecord>, Vec<FolderNode>), VaultError> {
        let id = self.resolve(path)?.ok_or(StoreError::NotFound)?;
        let files = self.metadata.list_files_in_folder(&self.owner, path.as_str())?;
        let folders = self.metadata.list_folder_children(&self.owner, id)?;
        Ok((files, folders))
    }

    /// Every file record at or below a path.
    ///
    /// Level-by-level walk over the folder nodes; each level's children are
    /// fetched in parallel and joined before the next level starts. Nesting
    /// beyond the configured depth cap is an error rather than a silent
    /// truncation.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn list_subtree(&self, path: &VirtualPath) -> Result<Vec<FileRecord>, VaultError> {
        let root_id = self.resolve(path)?.ok_or(StoreError::NotFound)?;
        let mut files = self.metadata.list_files_in_folder(&self.owner, path.as_str())?;

        let mut level: Vec<(NodeId, VirtualPath)> = vec![(root_id, path.clone())];
        let mut depth = 0usize;
        while !level.is_empty() {
            depth += 1;

            let expanded: Vec<Result<(Vec<FileRecord>, Vec<(NodeId, VirtualPath)>), VaultError>> =
                level
                    .par_iter()
                    .map(|(id, folder_path)| {
                        let mut found = Vec::new();
                        let mut next = Vec::new();
                        for child in self.metadata.list_folder_children(&self.owner, *id)? {
                            let child_path = folder_path.join(&child.name);
                            found.extend(
                                self.metadata
                                    .list_files_in_folder(&self.owner, child_path.as_str())?,
                            );
                            next.push((child.id, child_path));
                        }
                        Ok((found, next))
                    })
                    .collect();

            level = Vec::new();
            for branch in expanded {
                let (found, next) = branch?;
                files.extend(found);
                level.extend(next);
            }
            // Folders exactly at the cap may exist; anything below them
            // may not.
            if depth > self.config.subtree_depth_cap && !level.is_empty() {
                return Err(VaultError::DepthCapExceeded { cap: self.config.subtree_depth_cap });
            }
        }
        Ok(files)
    }

    /// Move or rename a whole subtree.
    ///
    /// File records are rewritten one at a time: the new record (rebased
    /// path, recomputed fingerprint) is inserted before the old one is
    /// deleted, so an interruption leaves a visible duplicate rather than a
    /// lost file. The error reports how far the move got. Folder nodes,
    /// including empty ones, are recreated at the destination and the old
    /// nodes removed leaves-first.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn rename_subtree(
        &self,
        old: &VirtualPath,
        new: &VirtualPath,
    ) -> Result<VirtualPath, VaultError> {
        if old.is_root() || new.is_root() {
            return Err(VaultError::RootFolder);
        }
        if old == new {
            return Ok(new.clone());
        }
        if old.is_segment_prefix_of(new) {
            // A folder cannot be moved underneath itself.
            return Err(VaultError::DestinationConflict { path: new.to_string() });
        }
        let old_nodes = self.collect_subtree_nodes(old)?;

        // Cheap up-front conflict check: files directly at the destination,
        // or an existing destination node with subfolders.
        if !self.metadata.list_files_in_folder(&self.owner, new.as_str())?.is_empty() {
            return Err(VaultError::DestinationConflict { path: new.to_string() });
        }
        if let Some(dst) = self.resolve(new)? {
            if !self.metadata.list_folder_children(&self.owner, dst)?.is_empty() {
                return Err(VaultError::DestinationConflict { path: new.to_string() });
            }
        }

        let records: Vec<FileRecord> = self
            .metadata
            .list_files_from(&self.owner, old.as_str())?
            .into_iter()
            .filter(|r| r.folder_path.starts_with(old.as_str()))
            .collect();
        let total = records.len();

        let mut memo = FolderMemo::new();
        let mut moved = 0usize;
        for record in records {
            self.move_one_record(&record, old, new, &mut memo).map_err(|source| {
                warn!(moved, total, "rename interrupted");
                VaultError::RenameInterrupted {
                    moved,
                    total,
                    new_path: new.to_string(),
                    source: Box::new(source),
                }
            })?;
            moved += 1;
        }

        // Recreate the folder skeleton (covers empty folders), then drop the
        // old nodes children-first.
        for (_, node_path) in &old_nodes {
            if let Some(rebased) = node_path.rebase(old, new) {
                self.resolve_or_create_with(&rebased, &mut memo)?;
            }
        }
        for (node_id, _) in old_nodes.iter().rev() {
            self.metadata.delete_folder(&self.owner, *node_id)?;
        }

        debug!(moved, total, "subtree renamed");
        Ok(new.clone())
    }

    fn move_one_record(
        &self,
        record: &FileRecord,
        old: &VirtualPath,
        new: &VirtualPath,
        memo: &mut FolderMemo,
    ) -> Result<(), VaultError> {
        let old_folder = VirtualPath::new(&record.folder_path);
        let new_folder = old_folder
            .rebase(old, new)
            .ok_or(StoreError::NotFound)?;

        // The fingerprint binds the folder path, so it must be recomputed
        // from the decrypted name at the new location.
        let plaintext_name = name::decrypt_filename(&self.key, &record.encrypted_name)?;
        let fingerprint = name::name_fingerprint(&self.key, new_folder.as_str(), &plaintext_name);

        self.resolve_or_create_with(&new_folder, memo)?;

        let mut rewritten = record.clone();
        rewritten.id = 0;
        rewritten.folder_path = new_folder.as_str().to_owned();
        rewritten.name_fingerprint = fingerprint;
        self.metadata.add_file(rewritten)?;
        self.metadata.delete_file(&self.owner, record.id)?;
        Ok(())
    }

    /// Folder ids at or below a non-root path, breadth-first with their
    /// full paths. Errors if the path has no node.
    pub(super) fn collect_subtree_nodes(
        &self,
        path: &VirtualPath,
    ) -> Result<Vec<(NodeId, VirtualPath)>, VaultError> {
        let root_id = self.resolve(path)?.ok_or(StoreError::NotFound)?;
        debug_assert_ne!(root_id, ROOT_FOLDER, "callers reject the root first");

        let mut nodes = vec![(root_id, path.clone())];
        let mut cursor = 0usize;
        while cursor < nodes.len() {
            let (parent_id, parent_path) = (nodes[cursor].0, nodes[cursor].1.clone());
            for child in self.metadata.list_folder_children(&self.owner, parent_id)? {
                if parent_path.depth() >= path.depth() + self.config.subtree_depth_cap {
                    return Err(VaultError::DepthCapExceeded {
                        cap: self.config.subtree_depth_cap,
                    });
                }
                let child_path = parent_path.join(&child.name);
                nodes.push((child.id, child_path));
            }
            cursor += 1;
        }
        Ok(nodes)
    }
}
