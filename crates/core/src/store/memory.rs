//! In-memory page store for testing and ephemeral use.
//!
//! [`InMemoryPageStore`] keeps every page in a `BTreeMap` protected by a
//! `RwLock`. It implements the full [`PageStore`] trait plus a few builder
//! methods for assembling trees in tests.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::debug;

use super::{check_move, check_trash, scope_admits, PageStore};
use crate::errors::StoreError;
use crate::models::{
    CloneOptions, ListScope, NewPage, PageId, PageNode, PageVersion, TreeId, VersionHandle,
};
use crate::path;

#[derive(Debug, Clone)]
struct StoredPage {
    id: PageId,
    tree_id: TreeId,
    parent_id: Option<PageId>,
    path: String,
    is_home: bool,
    is_master: bool,
    is_system: bool,
    is_active: bool,
    in_trash: bool,
    versions: Vec<PageVersion>,
}

impl StoredPage {
    fn snapshot(&self) -> PageNode {
        PageNode {
            id: self.id,
            tree_id: self.tree_id,
            path: self.path.clone(),
            is_home: self.is_home,
            is_master: self.is_master,
            is_system: self.is_system,
            is_active: self.is_active,
            is_error: self.versions.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    pages: BTreeMap<PageId, StoredPage>,
    next_page_id: PageId,
    next_version_id: i64,
    next_tree_id: TreeId,
}

impl Inner {
    fn live(&self) -> impl Iterator<Item = &StoredPage> {
        self.pages.values().filter(|p| !p.in_trash)
    }

    fn live_by_path(&self, path: &str) -> Option<&StoredPage> {
        self.live().find(|p| p.path == path)
    }

    fn live_by_id(&self, id: PageId) -> Result<&StoredPage, StoreError> {
        self.pages
            .get(&id)
            .filter(|p| !p.in_trash)
            .ok_or_else(|| StoreError::PageNotFound(id.to_string()))
    }

    fn new_version(
        &mut self,
        page_id: PageId,
        content: &str,
        comment: &str,
        approved: bool,
    ) -> PageVersion {
        let id = self.next_version_id;
        self.next_version_id += 1;
        PageVersion {
            id,
            page_id,
            content: content.to_string(),
            comment: comment.to_string(),
            approved,
            created_at: Utc::now(),
        }
    }

    fn insert(
        &mut self,
        path: String,
        tree_id: TreeId,
        parent_id: Option<PageId>,
        is_master: bool,
        new_page: &NewPage,
    ) -> PageNode {
        let id = self.next_page_id;
        self.next_page_id += 1;
        let versions = if new_page.without_version {
            Vec::new()
        } else {
            vec![self.new_version(id, &new_page.content, "Initial version", true)]
        };
        let page = StoredPage {
            id,
            tree_id,
            parent_id,
            path,
            is_home: false,
            is_master,
            is_system: new_page.is_system,
            is_active: new_page.is_active,
            in_trash: false,
            versions,
        };
        let node = page.snapshot();
        self.pages.insert(id, page);
        node
    }
}

/// An in-memory implementation of [`PageStore`].
///
/// Starts with the default site tree: a home page at `/` in tree `1`.
#[derive(Debug)]
pub struct InMemoryPageStore {
    inner: RwLock<Inner>,
}

impl InMemoryPageStore {
    /// Create a store holding only the home page.
    pub fn new() -> Self {
        let mut inner = Inner {
            pages: BTreeMap::new(),
            next_page_id: 1,
            next_version_id: 1,
            next_tree_id: 2,
        };
        inner.insert(path::TREE_ROOT.to_string(), 1, None, true, &NewPage::default());
        if let Some(home) = inner.pages.get_mut(&1) {
            home.is_home = true;
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Create a page under its (existing) parent directory.
    pub fn add_page(&self, page_path: &str, new_page: NewPage) -> Result<PageNode, StoreError> {
        let page_path = path::normalize(page_path);
        let mut inner = self.write()?;
        if inner.live_by_path(&page_path).is_some() {
            return Err(StoreError::PathOccupied(page_path));
        }
        let parent_path = path::parent(&page_path);
        let (parent_id, tree_id) = inner
            .live_by_path(&parent_path)
            .map(|p| (p.id, p.tree_id))
            .ok_or(StoreError::PageNotFound(parent_path))?;
        let node = inner.insert(page_path, tree_id, Some(parent_id), false, &new_page);
        debug!(path = %node.path, id = node.id, "added page");
        Ok(node)
    }

    /// Shorthand for [`Self::add_page`] with content only.
    pub fn add(&self, page_path: &str, content: &str) -> Result<PageNode, StoreError> {
        self.add_page(page_path, NewPage::with_content(content))
    }

    /// Create a new site tree whose master page lives at `root_path`.
    pub fn add_tree(&self, root_path: &str) -> Result<PageNode, StoreError> {
        let root_path = path::normalize(root_path);
        let mut inner = self.write()?;
        if inner.live_by_path(&root_path).is_some() {
            return Err(StoreError::PathOccupied(root_path));
        }
        let tree_id = inner.next_tree_id;
        inner.next_tree_id += 1;
        Ok(inner.insert(root_path, tree_id, None, true, &NewPage::default()))
    }

    /// Look up a page by id, trashed or not.
    pub fn page(&self, id: PageId) -> Option<PageNode> {
        self.read().ok()?.pages.get(&id).map(StoredPage::snapshot)
    }

    /// Whether the page with `id` sits in the trash.
    pub fn is_trashed(&self, id: PageId) -> bool {
        self.read()
            .ok()
            .and_then(|inner| inner.pages.get(&id).map(|p| p.in_trash))
            .unwrap_or(false)
    }

    /// All versions of a page, oldest first.
    pub fn versions(&self, id: PageId) -> Vec<PageVersion> {
        self.read()
            .ok()
            .and_then(|inner| inner.pages.get(&id).map(|p| p.versions.clone()))
            .unwrap_or_default()
    }

    /// Paths of every live page, sorted.
    pub fn live_paths(&self) -> Vec<String> {
        self.read()
            .map(|inner| {
                let mut paths: Vec<String> = inner.live().map(|p| p.path.clone()).collect();
                paths.sort();
                paths
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for InMemoryPageStore {
    fn resolve_by_path(&self, page_path: &str) -> Result<Option<PageNode>, StoreError> {
        let inner = self.read()?;
        Ok(inner.live_by_path(page_path).map(StoredPage::snapshot))
    }

    fn resolve_home_node(&self) -> Result<PageNode, StoreError> {
        let inner = self.read()?;
        let home = inner.live().find(|p| p.is_home).map(StoredPage::snapshot);
        home.ok_or_else(|| StoreError::PageNotFound("home".into()))
    }

    fn list_nodes(&self, scope: &ListScope) -> Result<Vec<PageNode>, StoreError> {
        let inner = self.read()?;
        let root = inner.live_by_id(scope.root)?.snapshot();
        let mut nodes: Vec<PageNode> = inner
            .live()
            .filter(|p| {
                let parent_is_master = p
                    .parent_id
                    .and_then(|id| inner.pages.get(&id))
                    .map(|parent| parent.is_master)
                    .unwrap_or(false);
                scope_admits(scope, &root, &p.snapshot(), p.parent_id, parent_is_master)
            })
            .map(StoredPage::snapshot)
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }

    fn current_version(&self, node: &PageNode) -> Result<VersionHandle, StoreError> {
        let inner = self.read()?;
        let page = inner.live_by_id(node.id)?;
        page.versions
            .last()
            .map(|v| VersionHandle {
                page_id: page.id,
                version_id: v.id,
            })
            .ok_or_else(|| StoreError::NoVersion(page.path.clone()))
    }

    fn clone_version(
        &self,
        version: &VersionHandle,
        destination: &PageNode,
        options: &CloneOptions,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let original = inner
            .pages
            .get(&version.page_id)
            .and_then(|p| p.versions.iter().find(|v| v.id == version.version_id))
            .cloned()
            .ok_or_else(|| StoreError::NoVersion(format!("version {}", version.version_id)))?;
        inner.live_by_id(destination.id)?;

        let approved = original.approved && !options.force_unapproved;
        let copy = inner.new_version(destination.id, &original.content, &options.comment, approved);
        debug!(
            from = version.page_id,
            to = destination.id,
            version = copy.id,
            approved,
            "cloned page version"
        );
        if let Some(page) = inner.pages.get_mut(&destination.id) {
            page.versions.push(copy);
        }
        Ok(())
    }

    fn move_node(&self, node: &PageNode, new_parent: &PageNode) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let current = inner.live_by_id(node.id)?.snapshot();
        let parent = inner.live_by_id(new_parent.id)?.snapshot();
        check_move(&current, &parent)?;

        let old_path = current.path.clone();
        let new_path = path::join(&parent.path, path::handle(&old_path));
        if new_path != old_path && inner.live_by_path(&new_path).is_some() {
            return Err(StoreError::PathOccupied(new_path));
        }

        for page in inner.pages.values_mut().filter(|p| !p.in_trash) {
            if page.id == current.id {
                page.parent_id = Some(parent.id);
            } else if !path::is_descendant_of(&page.path, &old_path) {
                continue;
            }
            page.path = format!("{}{}", new_path, &page.path[old_path.len()..]);
            page.tree_id = parent.tree_id;
        }
        debug!(from = %old_path, to = %new_path, "moved page");
        Ok(())
    }

    fn trash_node(&self, node: &PageNode) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let current = inner.live_by_id(node.id)?.snapshot();
        check_trash(&current)?;
        for page in inner.pages.values_mut().filter(|p| !p.in_trash) {
            if page.id == current.id || path::is_descendant_of(&page.path, &current.path) {
                page.in_trash = true;
            }
        }
        debug!(path = %current.path, "moved page to trash");
        Ok(())
    }

    fn child_count(&self, node: &PageNode) -> Result<usize, StoreError> {
        let inner = self.read()?;
        inner.live_by_id(node.id)?;
        Ok(inner.live().filter(|p| p.parent_id == Some(node.id)).count())
    }
}
