//! Realmgate Common Library
//!
//! Shared types, errors, crypto helpers and credential persistence for the
//! Realmgate authentication layer.

pub mod crypto;
pub mod db;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use crypto::{Argon2Comparator, CredentialComparator};
pub use db::{CredentialPersistence, MemoryCredentials, SqliteCredentials};
pub use error::{Error, Result};
pub use types::*;

/// Realmgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
