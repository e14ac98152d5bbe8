//! `merge` and `plan` subcommands.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::warn;

use sitemerge_core::config::{CollisionPolicy, MergeConfig, MergeDefaults};
use sitemerge_core::db::Database;
use sitemerge_core::merge::report::AUDIT_ACTION;
use sitemerge_core::merge::{MergeReport, PlannedAction, PlannedEntry, RunStatus, TreeMerger};
use sitemerge_core::models::AuditEntry;

use crate::progress::BarProgress;
use crate::style;
use crate::wizard;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Source tree root. Omit source or target to run the interactive setup.
    #[arg(short, long)]
    pub source: Option<String>,

    /// Target tree root.
    #[arg(short, long)]
    pub target: Option<String>,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// What to do when the page exists in the target: replace, skip or stop.
    #[arg(long)]
    pub policy: Option<CollisionPolicy>,

    /// Store replaced content unapproved (replace only).
    #[arg(long, overrides_with = "no_keep_unapproved")]
    pub keep_unapproved: bool,

    /// Store replaced content approved, even if the config says otherwise.
    #[arg(long, overrides_with = "keep_unapproved")]
    pub no_keep_unapproved: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Print the report as JSON instead of tables.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Source tree root.
    #[arg(short, long)]
    pub source: String,

    /// Target tree root.
    #[arg(short, long)]
    pub target: String,

    #[command(flatten)]
    pub scope: ScopeArgs,
}

/// Scope flags shared by `merge` and `plan`. Each option can be switched on
/// or off for one run; unset options keep the configured default.
#[derive(Args, Debug, Default)]
pub struct ScopeArgs {
    /// Include every descendant, not only direct children.
    #[arg(long, overrides_with = "no_descendants")]
    pub descendants: bool,

    /// Direct children only.
    #[arg(long, overrides_with = "descendants")]
    pub no_descendants: bool,

    /// Search every site tree.
    #[arg(long, overrides_with = "no_all_trees")]
    pub all_trees: bool,

    /// Search the root's own tree only.
    #[arg(long, overrides_with = "all_trees")]
    pub no_all_trees: bool,
}

impl ScopeArgs {
    fn apply(&self, config: &mut MergeConfig) {
        config.include_descendants =
            switch(config.include_descendants, self.descendants, self.no_descendants);
        config.include_all_trees =
            switch(config.include_all_trees, self.all_trees, self.no_all_trees);
    }
}

/// A `--flag` / `--no-flag` pair over a configured default.
fn switch(default: bool, on: bool, off: bool) -> bool {
    if on {
        true
    } else if off {
        false
    } else {
        default
    }
}

impl MergeArgs {
    /// Config defaults overridden by whatever was given on the command line.
    fn to_config(&self, defaults: &MergeDefaults) -> MergeConfig {
        let mut config = defaults.for_roots(
            self.source.as_deref().unwrap_or(""),
            self.target.as_deref().unwrap_or(""),
        );
        self.scope.apply(&mut config);
        if let Some(policy) = self.policy {
            config.collision_policy = policy;
        }
        config.keep_unapproved = switch(
            config.keep_unapproved,
            self.keep_unapproved,
            self.no_keep_unapproved,
        );
        config
    }

    fn interactive(&self) -> bool {
        self.source.is_none() || self.target.is_none()
    }
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

pub fn run_merge(db: &Database, defaults: &MergeDefaults, args: &MergeArgs) -> Result<()> {
    let config = args.to_config(defaults);
    let config = if args.interactive() {
        wizard::run_wizard(db, config)?
    } else {
        if !args.yes && !args.json {
            println!("{}", wizard::settings_table(&config));
            if !wizard::confirm("Start the merge with these settings?", true)? {
                println!("{}", style::warn("Merge cancelled. No page was changed."));
                return Ok(());
            }
        }
        config
    };

    let merger = TreeMerger::new(db);
    let result = if args.json {
        merger.run_merge(&config)
    } else {
        merger.run_merge_with_progress(&config, &BarProgress::new())
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            record_audit(db, &AuditEntry::failure(AUDIT_ACTION, &e.to_string()));
            let context = if e.is_validation() {
                "invalid merge settings"
            } else {
                "merge could not start"
            };
            return Err(e).context(context);
        }
    };
    record_audit(db, &report.audit_entry());

    if args.json {
        let json = serde_json::to_string_pretty(&report.digest())
            .context("failed to serialize report")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }

    if let RunStatus::Aborted { reason } = &report.status {
        anyhow::bail!("merge aborted: {}", reason);
    }
    Ok(())
}

fn record_audit(db: &Database, entry: &AuditEntry) {
    if let Err(e) = db.insert_audit_entry(entry) {
        warn!(error = %e, "failed to record audit entry");
    }
}

fn print_report(report: &MergeReport) {
    println!();
    match &report.status {
        RunStatus::Completed => println!("{}", style::success("Merge completed")),
        RunStatus::Aborted { reason } => {
            println!("{}", style::error(&format!("Merge aborted: {}", reason)));
            println!(
                "{}",
                style::warn("Changes made before the failure were kept.")
            );
        }
    }
    println!();
    println!("{}", counts_table(report));

    if !report.skips.is_empty() {
        println!();
        println!(
            "{}",
            style::header(&format!("Skipped pages ({})", report.skipped()))
        );
        println!("{}", skips_table(report));
    }

    println!();
    println!("{}", style::dim(&format!("Run {}", report.run_id)));
}

pub fn counts_table(report: &MergeReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Result", "Pages"]);
    for (label, count) in [
        ("Merged", report.merged),
        ("Relocated", report.relocated),
        ("Skipped", report.skipped()),
        ("Trashed", report.trashed),
        ("Retained", report.retained),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(count)]);
    }
    table
}

fn skips_table(report: &MergeReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Page", "Reason"]);
    for skip in &report.skips {
        table.add_row(vec![
            Cell::new(&skip.source_path),
            Cell::new(style::skip_reason(skip.reason)),
        ]);
    }
    table
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

pub fn run_plan(db: &Database, defaults: &MergeDefaults, args: &PlanArgs) -> Result<()> {
    let mut config = defaults.for_roots(&args.source, &args.target);
    args.scope.apply(&mut config);

    let entries = TreeMerger::new(db)
        .plan(&config)
        .context("failed to plan merge")?;

    if entries.is_empty() {
        println!("{}", style::warn("Nothing to merge: the source tree is empty."));
        return Ok(());
    }

    println!("{}", plan_table(&entries));
    let merges = entries
        .iter()
        .filter(|e| matches!(e.action, PlannedAction::Merge { .. }))
        .count();
    println!();
    println!(
        "{} to merge ({}), {} to relocate",
        merges,
        config.collision_policy,
        entries.len() - merges
    );
    Ok(())
}

pub fn plan_table(entries: &[PlannedEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Source page", "Action", "Destination"]);
    for (i, entry) in entries.iter().enumerate() {
        let destination = match &entry.action {
            PlannedAction::Merge { target } => target.path.as_str(),
            PlannedAction::Relocate { destination } => destination.as_str(),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&entry.source.path),
            Cell::new(style::action(&entry.action)),
            Cell::new(destination),
        ]);
    }
    table
}
