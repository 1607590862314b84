//! Catalog models and queries
//!
//! One module per entity, mirroring the schema. All invariants that span
//! rows (manual identity creation, single chosen candidate, cascade delete,
//! history trimming) live here so callers get them transactionally.

pub mod accounts;
pub mod candidates;
pub mod downloads;
pub mod identities;
pub mod init;
pub mod library;
pub mod models;
pub mod playlists;
pub mod tracks;

pub use init::{init_database, run_migrations};
pub use models::*;
