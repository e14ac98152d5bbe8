//! Error types for the SiteMerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Store
//! errors wrap database errors, and merge errors wrap store errors.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Errors raised by the tree merger.
///
/// `IdenticalRoots`, `InvalidTreeRoot`, `OverlappingRoots` and
/// `AlreadyRunning` are raised before anything is mutated. The remaining variants abort a run part-way; whatever
/// was applied to earlier entries stays applied.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Source and target roots normalize to the same path.
    #[error("source and target trees must differ (both are '{0}')")]
    IdenticalRoots(String),

    /// A configured root does not resolve to a live page.
    #[error("invalid sitemap tree: page '{0}' does not exist")]
    InvalidTreeRoot(String),

    /// A page in the source scope is also part of the target tree, so the
    /// run would move or trash target pages.
    #[error("source tree '{source_root}' and target tree '{target_root}' overlap")]
    OverlappingRoots {
        source_root: String,
        target_root: String,
    },

    /// The STOP collision policy hit a page present in both trees.
    #[error("the page {source_path} already exists at {target_path}; aborted")]
    CollisionAbort {
        source_path: String,
        target_path: String,
    },

    /// Cloning the source version onto the target page failed.
    #[error("failed to copy {source_path} onto {target_path}: {source}")]
    CloneFailed {
        source_path: String,
        target_path: String,
        #[source]
        source: StoreError,
    },

    /// Moving a source page into the target tree failed.
    #[error("failed to move {source_path} to {destination_path}: {source}")]
    MoveFailed {
        source_path: String,
        destination_path: String,
        #[source]
        source: StoreError,
    },

    /// Moving a merged-away source page to the trash failed.
    #[error("failed to trash {path}: {source}")]
    TrashFailed {
        path: String,
        #[source]
        source: StoreError,
    },

    /// Another run already holds the lock for this pair of trees.
    #[error("a merge between '{source_root}' and '{target_root}' is already running")]
    AlreadyRunning {
        source_root: String,
        target_root: String,
    },

    /// Any other page store failure (listing, resolving, counting).
    #[error("page store error: {0}")]
    Store(#[from] StoreError),
}

impl MergeError {
    /// Whether the error was raised before any page was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::IdenticalRoots(_)
                | Self::InvalidTreeRoot(_)
                | Self::OverlappingRoots { .. }
                | Self::AlreadyRunning { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Page store errors
// ---------------------------------------------------------------------------

/// Errors from a [`crate::store::PageStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced page does not exist (or is in the trash).
    #[error("page not found: {0}")]
    PageNotFound(String),

    /// The page has no content version to read.
    #[error("page {0} has no version")]
    NoVersion(String),

    /// A live page already occupies the requested path.
    #[error("a page already exists at '{0}'")]
    PathOccupied(String),

    /// The request would break the tree structure.
    #[error("invalid page operation: {0}")]
    InvalidOperation(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("page store lock poisoned: {0}")]
    LockPoisoned(String),

    /// Error from the SQLite backend.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
