//! Tree indexer: snapshots a page tree into a map keyed by relative path.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::errors::MergeError;
use crate::models::{ListScope, PageNode};
use crate::path::{self, RelativePath};
use crate::store::PageStore;

/// Read-only snapshot of the pages below one tree root.
///
/// The home page, tree master pages and error pages are never indexed: they
/// can be neither copied, moved nor trashed by a merge.
#[derive(Debug, Clone)]
pub struct TreeIndex {
    root_path: String,
    root: PageNode,
    entries: BTreeMap<RelativePath, PageNode>,
}

impl TreeIndex {
    /// Index the pages below `root_path`.
    ///
    /// `root_path` is normalized first; `/` (or empty) stands for the default
    /// tree's home page. Listing uses administrative scope, so inactive and
    /// system pages are included.
    pub fn build<S: PageStore + ?Sized>(
        store: &S,
        root_path: &str,
        include_descendants: bool,
        include_all_trees: bool,
    ) -> Result<Self, MergeError> {
        let root_path = path::normalize(root_path);
        let root = if path::is_tree_root(&root_path) {
            store.resolve_home_node()?
        } else {
            store
                .resolve_by_path(&root_path)?
                .ok_or_else(|| MergeError::InvalidTreeRoot(root_path.clone()))?
        };
        if root.is_error {
            return Err(MergeError::InvalidTreeRoot(root_path));
        }

        let scope = ListScope::admin(root.id, include_descendants, include_all_trees);
        let mut entries = BTreeMap::new();
        for node in store.list_nodes(&scope)? {
            if node.is_home || node.is_master || node.is_error {
                debug!(path = %node.path, "not indexing structural or error page");
                continue;
            }
            match RelativePath::from_absolute(&root_path, &node.path) {
                Some(key) => {
                    entries.insert(key, node);
                }
                None => warn!(
                    root = %root_path,
                    path = %node.path,
                    "listed page is not below the tree root, ignoring"
                ),
            }
        }

        debug!(root = %root_path, pages = entries.len(), "tree indexed");
        Ok(Self {
            root_path,
            root,
            entries,
        })
    }

    /// The normalized root path keys are relative to.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// The page the root path resolved to.
    pub fn root(&self) -> &PageNode {
        &self.root
    }

    pub fn get(&self, key: &RelativePath) -> Option<&PageNode> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RelativePath) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelativePath, &PageNode)> {
        self.entries.iter()
    }

    /// Entries shortest key first; equal lengths fall back to key order.
    pub fn in_processing_order(&self) -> Vec<(&RelativePath, &PageNode)> {
        let mut ordered: Vec<_> = self.entries.iter().collect();
        ordered.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPage;
    use crate::store::InMemoryPageStore;

    fn keys(index: &TreeIndex) -> Vec<&str> {
        index.iter().map(|(k, _)| k.as_str()).collect()
    }

    fn sample() -> InMemoryPageStore {
        let store = InMemoryPageStore::new();
        store.add("/about", "about").unwrap();
        store.add("/about/team", "team").unwrap();
        store.add("/about/team/alice", "alice").unwrap();
        store.add("/about/history", "history").unwrap();
        store
    }

    #[test]
    fn test_children_only() {
        let store = sample();
        let index = TreeIndex::build(&store, "about", false, false).unwrap();
        assert_eq!(index.root_path(), "/about");
        assert_eq!(keys(&index), vec!["/history", "/team"]);
    }

    #[test]
    fn test_descendants() {
        let store = sample();
        let index = TreeIndex::build(&store, "/about/", true, false).unwrap();
        assert_eq!(keys(&index), vec!["/history", "/team", "/team/alice"]);
        assert_eq!(index.get(&RelativePath::from_absolute("/about", "/about/team").unwrap()).unwrap().path, "/about/team");
    }

    #[test]
    fn test_tree_root_uses_full_paths_and_skips_home() {
        let store = sample();
        let index = TreeIndex::build(&store, "", true, false).unwrap();
        assert!(index.root().is_home);
        assert_eq!(
            keys(&index),
            vec!["/about", "/about/history", "/about/team", "/about/team/alice"]
        );
    }

    #[test]
    fn test_includes_inactive_and_system_but_not_error_pages() {
        let store = sample();
        store
            .add_page(
                "/about/hidden",
                NewPage {
                    is_active: false,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .add_page(
                "/about/system",
                NewPage {
                    is_system: true,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .add_page(
                "/about/broken",
                NewPage {
                    without_version: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let index = TreeIndex::build(&store, "/about", false, false).unwrap();
        assert_eq!(keys(&index), vec!["/hidden", "/history", "/system", "/team"]);
    }

    #[test]
    fn test_all_trees_skips_master_pages() {
        let store = sample();
        store.add_tree("/ja").unwrap();
        store.add("/ja/news", "news").unwrap();

        let own_tree = TreeIndex::build(&store, "/", false, false).unwrap();
        assert_eq!(keys(&own_tree), vec!["/about"]);

        let all = TreeIndex::build(&store, "/", false, true).unwrap();
        assert_eq!(keys(&all), vec!["/about", "/ja/news"]);
    }

    #[test]
    fn test_missing_root() {
        let store = sample();
        let err = TreeIndex::build(&store, "/nowhere", true, false).unwrap_err();
        assert!(matches!(err, MergeError::InvalidTreeRoot(ref p) if p == "/nowhere"));
    }

    #[test]
    fn test_error_page_is_not_a_valid_root() {
        let store = sample();
        store
            .add_page(
                "/broken",
                NewPage {
                    without_version: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            TreeIndex::build(&store, "/broken", true, false),
            Err(MergeError::InvalidTreeRoot(_))
        ));
    }

    #[test]
    fn test_processing_order_is_shortest_first() {
        let store = sample();
        store.add("/about/b", "b").unwrap();
        let index = TreeIndex::build(&store, "/about", true, false).unwrap();
        let order: Vec<_> = index
            .in_processing_order()
            .into_iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(order, vec!["/b", "/team", "/history", "/team/alice"]);
    }
}
