//! One import surface for every error type in the crate.
//!
//! Each layer defines its own `thiserror` enum next to the code that raises
//! it; this module re-exports them so embedding code can write
//! `use veilstore_core::error::*` and match across layers. [`VaultError`]
//! is the top of the taxonomy and carries the HTTP status hint mapping.

pub use crate::crypto::CryptoError;
pub use crate::crypto::name::NameError;
pub use crate::crypto::stream::StreamError;
pub use crate::store::StoreError;
pub use crate::vault::VaultError;
