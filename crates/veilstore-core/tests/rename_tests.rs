mod common;

use std::collections::HashMap;

use common::{failing_vault, upload_one, vault_for};
use veilstore_core::store::MetadataStore;
use veilstore_core::vault::{VaultError, VirtualPath};

#[test]
fn rename_moves_every_record_and_preserves_content() {
    let tv = vault_for("alice");
    let id_top = upload_one(&tv, "/docs/", "top.txt", b"top content");
    let id_deep = upload_one(&tv, "/docs/2024/q3/", "deep.txt", b"deep content");
    let before_top = tv.metadata.get_file("alice", id_top).unwrap();
    let before_deep = tv.metadata.get_file("alice", id_deep).unwrap();

    let new = tv
        .vault
        .rename_subtree(&VirtualPath::new("/docs/"), &VirtualPath::new("/archive/docs/"))
        .unwrap();
    assert_eq!(new.as_str(), "/archive/docs/");

    // Old tree gone, new tree resolvable.
    assert!(tv.vault.resolve(&VirtualPath::new("/docs/")).unwrap().is_none());
    assert!(tv.vault.resolve(&VirtualPath::new("/archive/docs/2024/q3/")).unwrap().is_some());

    let moved = tv.vault.list_subtree(&new).unwrap();
    assert_eq!(moved.len(), 2);
    let deep = moved.iter().find(|r| r.folder_path == "/archive/docs/2024/q3/").unwrap();
    assert_eq!(deep.content_digest, before_deep.content_digest);
    assert_eq!(deep.size_bytes, before_deep.size_bytes);
    assert_eq!(deep.blob_ref, before_deep.blob_ref, "blobs are not rewritten");
    let top = moved.iter().find(|r| r.folder_path == "/archive/docs/").unwrap();
    assert_eq!(top.content_digest, before_top.content_digest);

    // Content still decrypts after the move.
    let mut out = Vec::new();
    let info = tv.vault.download_file(deep.id, &mut out).unwrap();
    assert_eq!(info.name, "deep.txt");
    assert_eq!(out, b"deep content");
}

#[test]
fn rename_recomputes_fingerprints_for_the_new_location() {
    let tv = vault_for("alice");
    upload_one(&tv, "/inbox/", "letter.txt", b"v1");
    tv.vault
        .rename_subtree(&VirtualPath::new("/inbox/"), &VirtualPath::new("/outbox/"))
        .unwrap();

    // The old location is free again for the same name.
    upload_one(&tv, "/inbox/", "letter.txt", b"v2");

    // The new location now holds the name and rejects a duplicate.
    let report = tv
        .vault
        .upload_batch(&VirtualPath::new("/outbox/"), vec![common::item("letter.txt", b"v3")])
        .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].error,
        VaultError::Duplicate { ref folder, ref name } if folder == "/outbox/" && name == "letter.txt"
    ));
}

#[test]
fn rename_leaves_siblings_with_a_common_stem_alone() {
    let tv = vault_for("alice");
    upload_one(&tv, "/a/b/", "inside.txt", b"1");
    let decoy = upload_one(&tv, "/a/bc/", "decoy.txt", b"2");

    tv.vault
        .rename_subtree(&VirtualPath::new("/a/b/"), &VirtualPath::new("/a/renamed/"))
        .unwrap();

    let untouched = tv.metadata.get_file("alice", decoy).unwrap();
    assert_eq!(untouched.folder_path, "/a/bc/");
    assert!(tv.vault.resolve(&VirtualPath::new("/a/bc/")).unwrap().is_some());
}

#[test]
fn rename_recreates_empty_folders_at_the_destination() {
    let tv = vault_for("alice");
    upload_one(&tv, "/project/src/", "main.rs", b"fn main() {}");
    tv.vault.resolve_or_create(&VirtualPath::new("/project/empty/")).unwrap();

    tv.vault
        .rename_subtree(&VirtualPath::new("/project/"), &VirtualPath::new("/moved/"))
        .unwrap();

    assert!(tv.vault.resolve(&VirtualPath::new("/moved/empty/")).unwrap().is_some());
    assert!(tv.vault.resolve(&VirtualPath::new("/project/")).unwrap().is_none());
}

#[test]
fn rename_rejects_root_and_self_nesting() {
    let tv = vault_for("alice");
    upload_one(&tv, "/a/", "f.txt", b"x");

    let err = tv
        .vault
        .rename_subtree(&VirtualPath::root(), &VirtualPath::new("/elsewhere/"))
        .unwrap_err();
    assert!(matches!(err, VaultError::RootFolder));
    assert_eq!(err.status_hint(), 403);

    let err = tv
        .vault
        .rename_subtree(&VirtualPath::new("/a/"), &VirtualPath::new("/a/inner/"))
        .unwrap_err();
    assert!(matches!(err, VaultError::DestinationConflict { .. }));
    assert_eq!(err.status_hint(), 409);
}

#[test]
fn rename_rejects_occupied_destination() {
    let tv = vault_for("alice");
    upload_one(&tv, "/src/", "a.txt", b"a");
    upload_one(&tv, "/dst/", "b.txt", b"b");

    let err = tv
        .vault
        .rename_subtree(&VirtualPath::new("/src/"), &VirtualPath::new("/dst/"))
        .unwrap_err();
    assert!(matches!(err, VaultError::DestinationConflict { .. }));

    // Source untouched by the rejected rename.
    assert_eq!(tv.vault.list_subtree(&VirtualPath::new("/src/")).unwrap().len(), 1);
}

#[test]
fn rename_of_missing_source_is_not_found() {
    let tv = vault_for("alice");
    let err = tv
        .vault
        .rename_subtree(&VirtualPath::new("/ghost/"), &VirtualPath::new("/real/"))
        .unwrap_err();
    assert_eq!(err.status_hint(), 404);
}

#[test]
fn interrupted_rename_reports_progress_and_keeps_moved_records_reachable() {
    let fv = failing_vault("alice");
    let contents: HashMap<&str, &[u8]> =
        [("a.txt", b"aaa" as &[u8]), ("b.txt", b"bbb"), ("c.txt", b"ccc")].into();
    for (name, bytes) in &contents {
        let report = fv
            .vault
            .upload_batch(&VirtualPath::new("/src/"), vec![common::item(name, bytes)])
            .unwrap();
        assert!(report.is_complete());
    }

    // The next file insert succeeds, then the store starts refusing them,
    // stopping the rename after its first record.
    fv.metadata.fail_add_file_after(1);
    let err = fv
        .vault
        .rename_subtree(&VirtualPath::new("/src/"), &VirtualPath::new("/dst/"))
        .unwrap_err();

    match err {
        VaultError::RenameInterrupted { moved, total, ref new_path, .. } => {
            assert_eq!(moved, 1);
            assert_eq!(total, 3);
            assert_eq!(new_path, "/dst/");
        }
        other => panic!("expected RenameInterrupted, got {other:?}"),
    }

    // The subtree is split, not shrunk: one record landed at the new path,
    // two stayed behind, nothing was lost.
    let moved = fv.metadata.list_files_in_folder("alice", "/dst/").unwrap();
    let stayed = fv.metadata.list_files_in_folder("alice", "/src/").unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(stayed.len(), 2);

    // The moved record still lists and decrypts at the new location.
    let entries = fv.vault.list_path(&VirtualPath::new("/dst/")).unwrap();
    assert_eq!(entries.len(), 1);
    let expected = contents[entries[0].name.as_str()];
    let mut out = Vec::new();
    fv.vault.download_file(entries[0].id, &mut out).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn rename_to_same_path_is_a_no_op() {
    let tv = vault_for("alice");
    let id = upload_one(&tv, "/stay/", "put.txt", b"x");

    let path = VirtualPath::new("/stay/");
    let result = tv.vault.rename_subtree(&path, &path).unwrap();
    assert_eq!(result, path);
    assert_eq!(tv.metadata.get_file("alice", id).unwrap().folder_path, "/stay/");
}
