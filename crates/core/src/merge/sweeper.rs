//! Cleanup sweeper: trashes merged-away source pages once they are empty.

use tracing::{debug, info};

use super::progress::{Phase, ProgressSink};
use super::reconciler::MergedSet;
use super::report::MergeReport;
use crate::errors::MergeError;
use crate::store::PageStore;

/// Walk `merged` longest path first and trash every page left without
/// children. Home and master pages are always kept.
pub fn sweep<S: PageStore + ?Sized>(
    store: &S,
    merged: &mut MergedSet,
    progress: &dyn ProgressSink,
    report: &mut MergeReport,
) -> Result<(), MergeError> {
    if merged.is_empty() {
        return Ok(());
    }

    let nodes = merged.drain_deepest_first();
    let total = nodes.len();
    progress.begin(Phase::Cleanup, total);

    for (done, node) in nodes.iter().enumerate() {
        if node.is_home || node.is_master {
            debug!(path = %node.path, "keeping tree root");
            report.retained += 1;
        } else if store.child_count(node)? > 0 {
            debug!(path = %node.path, "keeping merged page that still has children");
            report.retained += 1;
        } else {
            store.trash_node(node).map_err(|e| MergeError::TrashFailed {
                path: node.path.clone(),
                source: e,
            })?;
            info!(path = %node.path, "moved merged page to trash");
            report.trashed += 1;
        }
        progress.advance(Phase::Cleanup, done + 1, total);
    }

    progress.finish(Phase::Cleanup);
    Ok(())
}
