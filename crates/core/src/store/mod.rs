//! The [`PageStore`] trait: everything the merge engine needs from a CMS.
//!
//! Any backend (in-memory, SQLite, a remote CMS API) implements this trait.
//! The engine only reads page snapshots and requests three mutations:
//! cloning a content version, moving a page, and trashing a page.

pub mod memory;

use crate::errors::StoreError;
use crate::models::{CloneOptions, ListScope, PageId, PageNode, VersionHandle};
use crate::path;

pub use memory::InMemoryPageStore;

/// Storage backend for a hierarchical page tree.
///
/// Implementations must be thread-safe (`Send + Sync`). All calls are
/// blocking. Trashed pages are invisible to every read method.
pub trait PageStore: Send + Sync {
    /// Resolve a live page by absolute path.
    ///
    /// Returns `Ok(None)` when no live page has that path. Error pages are
    /// returned with `is_error` set; callers decide what to do with them.
    fn resolve_by_path(&self, path: &str) -> Result<Option<PageNode>, StoreError>;

    /// The default site tree's home page.
    fn resolve_home_node(&self) -> Result<PageNode, StoreError>;

    /// List the pages below `scope.root`, ordered by path.
    ///
    /// The root itself is never part of the result.
    fn list_nodes(&self, scope: &ListScope) -> Result<Vec<PageNode>, StoreError>;

    /// The version currently holding the page's content.
    fn current_version(&self, node: &PageNode) -> Result<VersionHandle, StoreError>;

    /// Copy `version` onto `destination` as its new current version.
    ///
    /// The destination keeps its id and path; only its content changes.
    fn clone_version(
        &self,
        version: &VersionHandle,
        destination: &PageNode,
        options: &CloneOptions,
    ) -> Result<(), StoreError>;

    /// Re-parent `node` (and its subtree) under `new_parent`.
    fn move_node(&self, node: &PageNode, new_parent: &PageNode) -> Result<(), StoreError>;

    /// Soft-delete `node` (and its subtree).
    fn trash_node(&self, node: &PageNode) -> Result<(), StoreError>;

    /// Number of live direct children of `node`.
    fn child_count(&self, node: &PageNode) -> Result<usize, StoreError>;
}

/// Whether a live page belongs to the listing described by `scope`.
///
/// Shared by the backends so they agree on what "children", "descendants"
/// and "all trees" mean.
pub(crate) fn scope_admits(
    scope: &ListScope,
    root: &PageNode,
    node: &PageNode,
    parent_id: Option<PageId>,
    parent_is_master: bool,
) -> bool {
    if node.id == root.id {
        return false;
    }
    if !scope.include_inactive && !node.is_active {
        return false;
    }
    if !scope.include_system && node.is_system {
        return false;
    }
    if !scope.all_trees && node.tree_id != root.tree_id {
        return false;
    }
    if scope.recursive {
        path::is_descendant_of(&node.path, &root.path)
    } else {
        // Across all trees the top-level pages of every tree count as
        // children of the site root.
        parent_id == Some(root.id) || (scope.all_trees && root.is_home && parent_is_master)
    }
}

/// Reject structural moves: masters never move, and a page cannot be placed
/// inside its own subtree.
pub(crate) fn check_move(node: &PageNode, new_parent: &PageNode) -> Result<(), StoreError> {
    if node.is_master || node.is_home {
        return Err(StoreError::InvalidOperation(format!(
            "tree root {} cannot be moved",
            node.path
        )));
    }
    if new_parent.id == node.id || path::is_descendant_of(&new_parent.path, &node.path) {
        return Err(StoreError::InvalidOperation(format!(
            "cannot move {} under its own subtree ({})",
            node.path, new_parent.path
        )));
    }
    Ok(())
}

/// Reject trashing structural pages.
pub(crate) fn check_trash(node: &PageNode) -> Result<(), StoreError> {
    if node.is_master || node.is_home {
        return Err(StoreError::InvalidOperation(format!(
            "tree root {} cannot be trashed",
            node.path
        )));
    }
    Ok(())
}
