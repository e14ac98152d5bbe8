//! Domain model types used throughout SiteMerge.
//!
//! These types bridge the merge engine, the page store backends and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Stable page identifier assigned by the page store.
pub type PageId = i64;

/// Identifier of a site tree. The default tree is `1`.
pub type TreeId = i64;

/// Snapshot of a page as seen by the merge engine.
///
/// The store owns the page; a `PageNode` is only a handle plus the attributes
/// the engine reads. It is never created or destroyed by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    pub id: PageId,
    pub tree_id: TreeId,
    pub path: String,
    /// The default site tree's home page.
    pub is_home: bool,
    /// The top-level container of a site tree. Never moved or trashed.
    pub is_master: bool,
    /// System pages are listed but never treated as the home page.
    pub is_system: bool,
    pub is_active: bool,
    /// The page record exists but cannot be loaded (it has no version).
    pub is_error: bool,
}

/// Handle to one content version of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHandle {
    pub page_id: PageId,
    pub version_id: i64,
}

/// A stored content version of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVersion {
    pub id: i64,
    pub page_id: PageId,
    pub content: String,
    pub comment: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Options for [`crate::store::PageStore::clone_version`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Store the copy unapproved regardless of the source version's approval.
    pub force_unapproved: bool,
    /// Version comment recorded on the copy.
    pub comment: String,
}

/// Which pages [`crate::store::PageStore::list_nodes`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    /// Page whose children or descendants are listed.
    pub root: PageId,
    /// Every descendant instead of direct children only.
    pub recursive: bool,
    /// Span every site tree instead of the root's own tree.
    pub all_trees: bool,
    pub include_inactive: bool,
    pub include_system: bool,
}

impl ListScope {
    /// Administrative scope: inactive and system pages included.
    pub fn admin(root: PageId, recursive: bool, all_trees: bool) -> Self {
        Self {
            root,
            recursive,
            all_trees,
            include_inactive: true,
            include_system: true,
        }
    }
}

/// Attributes for creating a page through a backend's builder methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub content: String,
    pub is_system: bool,
    pub is_active: bool,
    /// Create the page without any version, so it loads as an error page.
    pub without_version: bool,
}

impl Default for NewPage {
    fn default() -> Self {
        Self {
            content: String::new(),
            is_system: false,
            is_active: true,
            without_version: false,
        }
    }
}

impl NewPage {
    pub fn with_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Audit Entry
// ---------------------------------------------------------------------------

/// An audit-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub details: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a success audit entry.
    pub fn success(action: &str, details: &str) -> Self {
        Self {
            action: action.to_string(),
            details: details.to_string(),
            success: true,
            timestamp: Utc::now(),
        }
    }

    /// Create a failure audit entry.
    pub fn failure(action: &str, details: &str) -> Self {
        Self {
            action: action.to_string(),
            details: details.to_string(),
            success: false,
            timestamp: Utc::now(),
        }
    }
}
