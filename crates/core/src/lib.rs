//! SiteMerge core library.
//!
//! This crate merges one CMS page tree into another: it indexes both trees by
//! relative path, copies or moves each source page into the target tree, and
//! trashes the source pages left empty afterwards. Storage is abstracted
//! behind [`store::PageStore`], with in-memory and SQLite backends.

pub mod config;
pub mod db;
pub mod errors;
pub mod merge;
pub mod models;
pub mod path;
pub mod store;

// Re-exports for convenience.
pub use config::{AppConfig, CollisionPolicy, MergeConfig};
pub use db::Database;
pub use merge::{MergeReport, TreeMerger};
pub use store::{InMemoryPageStore, PageStore};
