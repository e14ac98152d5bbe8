//! [`PageStore`] implementation backed by the SQLite [`Database`].

use rusqlite::params;
use tracing::debug;

use super::queries::{live_page_by_id, live_page_by_path};
use super::Database;
use crate::errors::{DatabaseError, StoreError};
use crate::models::{CloneOptions, ListScope, NewPage, PageNode, VersionHandle};
use crate::path;
use crate::store::{check_move, check_trash, scope_admits, PageStore};

impl Database {
    /// Create a page under its (existing) parent directory.
    pub fn create_page(
        &self,
        page_path: &str,
        new_page: NewPage,
    ) -> Result<PageNode, StoreError> {
        let page_path = path::normalize(page_path);
        if self.get_page_by_path(&page_path)?.is_some() {
            return Err(StoreError::PathOccupied(page_path));
        }
        let parent_path = path::parent(&page_path);
        let parent = self
            .get_page_by_path(&parent_path)?
            .ok_or(StoreError::PageNotFound(parent_path))?
            .node;

        let id = self.insert_page(
            parent.tree_id,
            Some(parent.id),
            &page_path,
            false,
            new_page.is_system,
            new_page.is_active,
        )?;
        if !new_page.without_version {
            self.insert_version(id, &new_page.content, "Initial version", true)?;
        }
        self.live_node(id)
    }

    /// Create a new site tree whose master page lives at `root_path`.
    pub fn create_tree(&self, root_path: &str) -> Result<PageNode, StoreError> {
        let root_path = path::normalize(root_path);
        if self.get_page_by_path(&root_path)?.is_some() {
            return Err(StoreError::PathOccupied(root_path));
        }
        let tree_id = self.next_tree_id()?;
        let id = self.insert_page(tree_id, None, &root_path, true, false, true)?;
        self.insert_version(id, "", "Initial version", true)?;
        self.live_node(id)
    }

    fn live_node(&self, id: i64) -> Result<PageNode, StoreError> {
        self.get_page(id)?
            .map(|row| row.node)
            .ok_or_else(|| StoreError::PageNotFound(id.to_string()))
    }
}

impl PageStore for Database {
    fn resolve_by_path(&self, page_path: &str) -> Result<Option<PageNode>, StoreError> {
        Ok(self.get_page_by_path(page_path)?.map(|row| row.node))
    }

    fn resolve_home_node(&self) -> Result<PageNode, StoreError> {
        self.get_home_page()?
            .map(|row| row.node)
            .ok_or_else(|| StoreError::PageNotFound("home".into()))
    }

    fn list_nodes(&self, scope: &ListScope) -> Result<Vec<PageNode>, StoreError> {
        let root = self.live_node(scope.root)?;
        let nodes = self
            .list_live_pages()?
            .into_iter()
            .filter(|row| {
                scope_admits(scope, &root, &row.node, row.parent_id, row.parent_is_master)
            })
            .map(|row| row.node)
            .collect();
        Ok(nodes)
    }

    fn current_version(&self, node: &PageNode) -> Result<VersionHandle, StoreError> {
        let page = self.live_node(node.id)?;
        let version_id = self
            .latest_version_id(page.id)?
            .ok_or_else(|| StoreError::NoVersion(page.path.clone()))?;
        Ok(VersionHandle {
            page_id: page.id,
            version_id,
        })
    }

    fn clone_version(
        &self,
        version: &VersionHandle,
        destination: &PageNode,
        options: &CloneOptions,
    ) -> Result<(), StoreError> {
        let original = self
            .get_version(version.version_id)?
            .ok_or_else(|| StoreError::NoVersion(format!("version {}", version.version_id)))?;
        let destination = self.live_node(destination.id)?;

        let approved = original.approved && !options.force_unapproved;
        let id = self.insert_version(destination.id, &original.content, &options.comment, approved)?;
        debug!(
            from = version.page_id,
            to = destination.id,
            version = id,
            approved,
            "cloned page version"
        );
        Ok(())
    }

    fn move_node(&self, node: &PageNode, new_parent: &PageNode) -> Result<(), StoreError> {
        self.transaction(|conn| -> Result<(), StoreError> {
            let current = live_page_by_id(conn, node.id)?
                .ok_or_else(|| StoreError::PageNotFound(node.path.clone()))?
                .node;
            let parent = live_page_by_id(conn, new_parent.id)?
                .ok_or_else(|| StoreError::PageNotFound(new_parent.path.clone()))?
                .node;
            check_move(&current, &parent)?;

            let old_path = current.path.clone();
            let new_path = path::join(&parent.path, path::handle(&old_path));
            if new_path != old_path && live_page_by_path(conn, &new_path)?.is_some() {
                return Err(StoreError::PathOccupied(new_path));
            }

            conn.execute(
                "UPDATE pages SET path = ?1 || substr(path, length(?2) + 1), tree_id = ?3
                 WHERE in_trash = 0
                   AND (id = ?4 OR substr(path, 1, length(?5)) = ?5)",
                params![
                    new_path,
                    old_path,
                    parent.tree_id,
                    current.id,
                    path::descendant_prefix(&old_path)
                ],
            )
            .map_err(DatabaseError::from)?;
            conn.execute(
                "UPDATE pages SET parent_id = ?1 WHERE id = ?2",
                params![parent.id, current.id],
            )
            .map_err(DatabaseError::from)?;

            debug!(from = %old_path, to = %new_path, "moved page");
            Ok(())
        })
    }

    fn trash_node(&self, node: &PageNode) -> Result<(), StoreError> {
        self.transaction(|conn| -> Result<(), StoreError> {
            let current = live_page_by_id(conn, node.id)?
                .ok_or_else(|| StoreError::PageNotFound(node.path.clone()))?
                .node;
            check_trash(&current)?;

            let trashed = conn
                .execute(
                    "UPDATE pages SET in_trash = 1
                     WHERE in_trash = 0
                       AND (id = ?1 OR substr(path, 1, length(?2)) = ?2)",
                    params![current.id, path::descendant_prefix(&current.path)],
                )
                .map_err(DatabaseError::from)?;

            debug!(path = %current.path, pages = trashed, "moved page to trash");
            Ok(())
        })
    }

    fn child_count(&self, node: &PageNode) -> Result<usize, StoreError> {
        let page = self.live_node(node.id)?;
        Ok(self.count_live_children(page.id)?)
    }
}
