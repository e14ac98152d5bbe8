//! Outcome of a merge run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MergeConfig;
use crate::errors::MergeError;
use crate::models::AuditEntry;

/// Audit-log action recorded for merge runs.
pub const AUDIT_ACTION: &str = "tree_merge";

/// Why a source page was left where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The page collided with a target page under the skip policy.
    Collision,
    /// A page already occupies the relocation destination.
    DestinationExists,
    /// The page already sits at its destination because an ancestor was
    /// relocated earlier in the run.
    MovedWithParent,
    /// The destination's parent directory does not exist.
    ParentMissing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collision => write!(f, "collision"),
            Self::DestinationExists => write!(f, "destination exists"),
            Self::MovedWithParent => write!(f, "moved with parent"),
            Self::ParentMissing => write!(f, "parent missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skip {
    pub source_path: String,
    pub reason: SkipReason,
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum RunStatus {
    Completed,
    /// The run stopped part-way; mutations made before the failure remain.
    Aborted { reason: MergeError },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// What one merge run did.
#[derive(Debug)]
pub struct MergeReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// The validated (normalized) configuration the run used.
    pub config: MergeConfig,
    /// Target pages whose content was replaced.
    pub merged: usize,
    /// Source pages moved into the target tree.
    pub relocated: usize,
    /// Merged-away source pages moved to the trash.
    pub trashed: usize,
    /// Merged-away source pages kept because they are structural or still
    /// have children.
    pub retained: usize,
    pub skips: Vec<Skip>,
    pub status: RunStatus,
}

impl MergeReport {
    pub(crate) fn new(config: MergeConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            config,
            merged: 0,
            relocated: 0,
            trashed: 0,
            retained: 0,
            skips: Vec::new(),
            status: RunStatus::Completed,
        }
    }

    pub(crate) fn skip(&mut self, source_path: &str, reason: SkipReason) {
        self.skips.push(Skip {
            source_path: source_path.to_string(),
            reason,
        });
    }

    pub(crate) fn finish(&mut self, outcome: Result<(), MergeError>) {
        self.finished_at = Some(Utc::now());
        if let Err(reason) = outcome {
            self.status = RunStatus::Aborted { reason };
        }
    }

    pub fn skipped(&self) -> usize {
        self.skips.len()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skips.iter().filter(|s| s.reason == reason).count()
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Number of store mutations the run performed.
    pub fn mutations(&self) -> usize {
        self.merged + self.relocated + self.trashed
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "merged: {}, relocated: {}, skipped: {}, trashed: {}, retained: {} ({})",
            self.merged,
            self.relocated,
            self.skipped(),
            self.trashed,
            self.retained,
            self.status
        )
    }

    /// Serializable digest used for audit details and JSON output.
    pub fn digest(&self) -> ReportDigest {
        ReportDigest {
            run_id: self.run_id.to_string(),
            source_root: self.config.source_root.clone(),
            target_root: self.config.target_root.clone(),
            collision_policy: self.config.collision_policy.to_string(),
            merged: self.merged,
            relocated: self.relocated,
            skipped: self.skipped(),
            trashed: self.trashed,
            retained: self.retained,
            status: self.status.to_string(),
            started_at: self.started_at.to_rfc3339(),
            finished_at: self.finished_at.map(|t| t.to_rfc3339()),
        }
    }

    /// Audit-log entry for this run.
    pub fn audit_entry(&self) -> AuditEntry {
        let details = serde_json::to_string(&self.digest()).unwrap_or_else(|_| self.summary());
        if self.is_completed() {
            AuditEntry::success(AUDIT_ACTION, &details)
        } else {
            AuditEntry::failure(AUDIT_ACTION, &details)
        }
    }
}

/// Flat, serializable view of a [`MergeReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDigest {
    pub run_id: String,
    pub source_root: String,
    pub target_root: String,
    pub collision_policy: String,
    pub merged: usize,
    pub relocated: usize,
    pub skipped: usize,
    pub trashed: usize,
    pub retained: usize,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}
