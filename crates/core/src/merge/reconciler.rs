//! Reconciler: pairs source pages with target pages by relative path and
//! applies the collision policy or relocates the page.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::indexer::TreeIndex;
use super::progress::{Phase, ProgressSink};
use super::report::{MergeReport, SkipReason};
use crate::config::{CollisionPolicy, MergeConfig};
use crate::errors::MergeError;
use crate::models::{CloneOptions, PageNode};
use crate::path::{self, RelativePath};
use crate::store::PageStore;

/// How a source page relates to the target tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// A target page with the same relative path exists.
    Merge { target: PageNode },
    /// No counterpart; the page belongs at `destination`.
    Relocate { destination: String },
}

/// One classified source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub key: RelativePath,
    pub source: PageNode,
    pub action: PlannedAction,
}

/// Classify every source page, shortest relative path first.
pub fn plan(source: &TreeIndex, target: &TreeIndex) -> Vec<PlannedEntry> {
    source
        .in_processing_order()
        .into_iter()
        .map(|(key, node)| {
            let action = match target.get(key) {
                Some(target_node) => PlannedAction::Merge {
                    target: target_node.clone(),
                },
                None => PlannedAction::Relocate {
                    destination: key.under(target.root_path()),
                },
            };
            PlannedEntry {
                key: key.clone(),
                source: node.clone(),
                action,
            }
        })
        .collect()
}

/// Source pages whose content was copied onto the target, keyed by their
/// absolute path. Only the cleanup sweep consumes it.
#[derive(Debug, Clone, Default)]
pub struct MergedSet {
    nodes: BTreeMap<String, PageNode>,
}

impl MergedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: PageNode) {
        self.nodes.insert(node.path.clone(), node);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Empty the set, returning its nodes longest path first.
    pub fn drain_deepest_first(&mut self) -> Vec<PageNode> {
        let mut nodes: Vec<PageNode> = std::mem::take(&mut self.nodes).into_values().collect();
        nodes.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| b.path.cmp(&a.path))
        });
        nodes
    }
}

/// Applies a plan against a page store.
pub struct Reconciler<'a, S: PageStore + ?Sized> {
    store: &'a S,
    config: &'a MergeConfig,
}

impl<'a, S: PageStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, config: &'a MergeConfig) -> Self {
        Self { store, config }
    }

    /// Apply every planned entry in order.
    ///
    /// Counts land in `report` as they happen, so a failure part-way leaves
    /// the report describing exactly what was done. The returned set holds
    /// the pages merged under the replace policy.
    pub fn apply(
        &self,
        entries: &[PlannedEntry],
        progress: &dyn ProgressSink,
        report: &mut MergeReport,
    ) -> Result<MergedSet, MergeError> {
        let total = entries.len();
        let mut merged = MergedSet::new();
        progress.begin(Phase::Reconcile, total);

        for (done, entry) in entries.iter().enumerate() {
            match &entry.action {
                PlannedAction::Merge { target } => {
                    self.merge(&entry.source, target, &mut merged, report)?
                }
                PlannedAction::Relocate { destination } => {
                    self.relocate(&entry.source, destination, report)?
                }
            }
            progress.advance(Phase::Reconcile, done + 1, total);
        }

        progress.finish(Phase::Reconcile);
        Ok(merged)
    }

    fn merge(
        &self,
        source: &PageNode,
        target: &PageNode,
        merged: &mut MergedSet,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        match self.config.collision_policy {
            CollisionPolicy::Replace => {
                let options = CloneOptions {
                    force_unapproved: self.config.force_unapproved(),
                    comment: format!("Copied from {}", source.path),
                };
                let clone_failed = |source_err| MergeError::CloneFailed {
                    source_path: source.path.clone(),
                    target_path: target.path.clone(),
                    source: source_err,
                };
                let version = self.store.current_version(source).map_err(clone_failed)?;
                self.store
                    .clone_version(&version, target, &options)
                    .map_err(clone_failed)?;

                info!(from = %source.path, to = %target.path, "replaced page content");
                merged.insert(source.clone());
                report.merged += 1;
            }
            CollisionPolicy::Skip => {
                debug!(from = %source.path, to = %target.path, "collision skipped");
                report.skip(&source.path, SkipReason::Collision);
            }
            CollisionPolicy::Stop => {
                return Err(MergeError::CollisionAbort {
                    source_path: source.path.clone(),
                    target_path: target.path.clone(),
                });
            }
        }
        Ok(())
    }

    fn relocate(
        &self,
        source: &PageNode,
        destination: &str,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        if let Some(existing) = self.store.resolve_by_path(destination)? {
            if existing.id == source.id {
                debug!(path = %destination, "already moved along with its parent");
                report.skip(&source.path, SkipReason::MovedWithParent);
            } else {
                debug!(from = %source.path, to = %destination, "destination occupied, leaving page");
                report.skip(&source.path, SkipReason::DestinationExists);
            }
            return Ok(());
        }

        let parent_path = path::parent(destination);
        let parent = if path::is_tree_root(&parent_path) {
            Some(self.store.resolve_home_node()?)
        } else {
            self.store.resolve_by_path(&parent_path)?
        };
        let Some(parent) = parent else {
            warn!(
                from = %source.path,
                parent = %parent_path,
                "destination parent does not exist, leaving page in place"
            );
            report.skip(&source.path, SkipReason::ParentMissing);
            return Ok(());
        };

        self.store
            .move_node(source, &parent)
            .map_err(|e| MergeError::MoveFailed {
                source_path: source.path.clone(),
                destination_path: destination.to_string(),
                source: e,
            })?;

        info!(from = %source.path, to = %destination, "moved page");
        report.relocated += 1;
        Ok(())
    }
}
