//! Per-account encrypted virtual filesystem over flat stores.
//!
//! veilstore reconstructs a hierarchical folder namespace on top of two
//! deliberately dumb backends: a flat metadata store that only supports
//! equality and ordered-range filters on single fields, and an opaque blob
//! store for encrypted bytes. Everything the user sees, from folder trees
//! to filenames to file contents, is derived from flat records, and nothing
//! sensitive is ever persisted in plaintext.
//!
//! The crate is organised around three cores:
//!
//! - [`crypto`]: the per-account envelope layer. A password-derived key
//!   unwraps a random content key and MAC secret; filenames are encrypted
//!   non-deterministically with AES-256-GCM, contents with a chunked GCM
//!   stream, and duplicate detection runs on keyed HMAC fingerprints.
//! - [`vault`]: the folder index (path resolution, listing, subtree rename)
//!   and the bulk coordinator (bounded-parallelism delete, batch upload,
//!   zip streaming).
//! - [`store`]: the trait contracts the core requires from the metadata and
//!   blob backends, plus in-memory reference implementations.

pub mod crypto;
pub mod error;
pub mod store;
pub mod vault;

pub use vault::{BulkReport, Vault, VaultConfig, VaultError};
