//! Tree merge engine.
//!
//! A run is three passes over the page store, strictly in sequence:
//!
//! 1. [`indexer`] snapshots the source and target trees into maps keyed by
//!    relative path.
//! 2. [`reconciler`] walks the source map shortest key first. Pages with a
//!    target counterpart are handled by the collision policy; the rest are
//!    moved into the target tree.
//! 3. [`sweeper`] trashes the merged-away source pages longest path first,
//!    so a parent is only considered once its children are gone.
//!
//! A per-tree-pair lock prevents two runs from touching the same trees at
//! once.

pub mod indexer;
pub mod progress;
pub mod reconciler;
pub mod report;
pub mod sweeper;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::MergeConfig;
use crate::errors::MergeError;
use crate::models::PageId;
use crate::path;
use crate::store::PageStore;

pub use indexer::TreeIndex;
pub use progress::{NoopProgress, Phase, ProgressSink};
pub use reconciler::{MergedSet, PlannedAction, PlannedEntry, Reconciler};
pub use report::{MergeReport, ReportDigest, RunStatus, Skip, SkipReason};

type RootPair = (String, String);

/// Runs merges against a borrowed page store.
pub struct TreeMerger<'a, S: PageStore + ?Sized> {
    store: &'a S,
    /// Root pairs with a run in progress, stored in sorted order so both
    /// directions share one entry.
    active: Mutex<HashSet<RootPair>>,
}

impl<'a, S: PageStore + ?Sized> TreeMerger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a run between these two roots is in progress.
    pub fn is_running(&self, source_root: &str, target_root: &str) -> bool {
        let key = pair_key(source_root, target_root);
        self.active_set().contains(&key)
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Classify the source pages without touching the store.
    pub fn plan(&self, config: &MergeConfig) -> Result<Vec<PlannedEntry>, MergeError> {
        let config = config.validate()?;
        let (source, target) = self.index(&config)?;
        Ok(reconciler::plan(&source, &target))
    }

    /// Run a merge without progress reporting.
    pub fn run_merge(&self, config: &MergeConfig) -> Result<MergeReport, MergeError> {
        self.run_merge_with_progress(config, &NoopProgress)
    }

    /// Run a merge.
    ///
    /// Configuration problems (identical, unresolvable or overlapping roots,
    /// a run already in progress) are returned as `Err` before anything is
    /// mutated. Failures once mutation has started end the run early and are
    /// reported as [`RunStatus::Aborted`] with the partial counts.
    pub fn run_merge_with_progress(
        &self,
        config: &MergeConfig,
        progress: &dyn ProgressSink,
    ) -> Result<MergeReport, MergeError> {
        let config = config.validate()?;
        let _guard = self.acquire(&config)?;

        let (source, target) = self.index(&config)?;
        let mut report = MergeReport::new(config.clone());
        info!(
            run_id = %report.run_id,
            source = %config.source_root,
            target = %config.target_root,
            policy = %config.collision_policy,
            descendants = config.include_descendants,
            all_trees = config.include_all_trees,
            pages = source.len(),
            "starting tree merge"
        );

        let outcome = self.execute(&config, &source, &target, progress, &mut report);
        if let Err(ref e) = outcome {
            warn!(run_id = %report.run_id, error = %e, "tree merge aborted");
        }
        report.finish(outcome);

        info!(run_id = %report.run_id, summary = %report.summary(), "tree merge finished");
        // Lock is released by _guard drop.
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn index(&self, config: &MergeConfig) -> Result<(TreeIndex, TreeIndex), MergeError> {
        let source = TreeIndex::build(
            self.store,
            &config.source_root,
            config.include_descendants,
            config.include_all_trees,
        )?;
        let target = TreeIndex::build(
            self.store,
            &config.target_root,
            config.include_descendants,
            config.include_all_trees,
        )?;
        if roots_overlap(&source, &target) {
            return Err(MergeError::OverlappingRoots {
                source_root: config.source_root.clone(),
                target_root: config.target_root.clone(),
            });
        }
        Ok((source, target))
    }

    fn execute(
        &self,
        config: &MergeConfig,
        source: &TreeIndex,
        target: &TreeIndex,
        progress: &dyn ProgressSink,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        let entries = reconciler::plan(source, target);
        let mut merged = Reconciler::new(self.store, config).apply(&entries, progress, report)?;
        sweeper::sweep(self.store, &mut merged, progress, report)
    }

    fn acquire(&self, config: &MergeConfig) -> Result<RunGuard<'_>, MergeError> {
        let key = pair_key(&config.source_root, &config.target_root);
        let mut active = self.active_set();
        if !active.insert(key.clone()) {
            return Err(MergeError::AlreadyRunning {
                source_root: config.source_root.clone(),
                target_root: config.target_root.clone(),
            });
        }
        Ok(RunGuard {
            active: &self.active,
            key,
        })
    }

    fn active_set(&self) -> MutexGuard<'_, HashSet<RootPair>> {
        lock_active(&self.active)
    }
}

/// Whether the two scopes share a page, or a source page is the target root
/// or one of its ancestors. Either way the run would move or trash part of
/// the target tree.
fn roots_overlap(source: &TreeIndex, target: &TreeIndex) -> bool {
    let target_root = target.root();
    let target_ids: HashSet<PageId> = target.iter().map(|(_, node)| node.id).collect();
    source.iter().any(|(_, node)| {
        node.id == target_root.id
            || target_ids.contains(&node.id)
            || path::is_descendant_of(&target_root.path, &node.path)
    })
}

fn pair_key(a: &str, b: &str) -> RootPair {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn lock_active(active: &Mutex<HashSet<RootPair>>) -> MutexGuard<'_, HashSet<RootPair>> {
    active.lock().unwrap_or_else(|poisoned| {
        warn!("merge lock set was poisoned, recovering");
        poisoned.into_inner()
    })
}

// ---------------------------------------------------------------------------
// Run lock RAII guard
// ---------------------------------------------------------------------------

/// Drop guard that releases a root pair when the run ends, even on panic.
struct RunGuard<'m> {
    active: &'m Mutex<HashSet<RootPair>>,
    key: RootPair,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock_active(self.active).remove(&self.key);
    }
}
