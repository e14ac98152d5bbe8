//! SiteMerge command-line tool.
//!
//! Merges one page tree of the site into another, either interactively or
//! from flags, and provides subcommands for previewing a merge, inspecting
//! and populating the page database, viewing the merge history, and
//! generating / validating configuration files.

mod merge_cmd;
mod pages;
mod progress;
mod style;
mod wizard;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use sitemerge_core::config::{self as core_config, AppConfig};
use sitemerge_core::db::Database;
use sitemerge_core::merge::ReportDigest;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// SiteMerge command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "sitemerge",
    version,
    about = "Merge one CMS page tree into another"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// (default: ~/.config/sitemerge/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG wins if set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file (default: --config).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file.
    Validate,

    /// Merge a source page tree into a target page tree.
    Merge(merge_cmd::MergeArgs),

    /// Show what a merge would do without changing anything.
    Plan(merge_cmd::PlanArgs),

    /// Inspect and populate the page database.
    Pages {
        #[command(subcommand)]
        action: pages::PagesAction,
    },

    /// Show recent merge runs.
    History {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(core_config::default_config_path);

    // `init` and `validate` work on the file itself.
    match &cli.command {
        Commands::Init { output } => {
            init_logging(cli.log_level.as_deref(), "warn");
            return cmd_init(output.as_deref().unwrap_or(&config_path));
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref(), "warn");
            return cmd_validate(&config_path);
        }
        _ => {}
    }

    let config = load_config(&config_path, cli.config.is_some())?;
    init_logging(cli.log_level.as_deref(), &config.logging.level);
    let db = open_database(&config)?;

    match cli.command {
        Commands::Merge(args) => merge_cmd::run_merge(&db, &config.merge, &args),
        Commands::Plan(args) => merge_cmd::run_plan(&db, &config.merge, &args),
        Commands::Pages { action } => pages::run_pages(&db, action),
        Commands::History { limit } => cmd_history(&db, limit),
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

/// Minimal logging for the CLI: `RUST_LOG`, then `--log-level`, then config.
fn init_logging(flag: Option<&str>, configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(flag.unwrap_or(configured)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load the config file. The default location may be absent, in which case
/// built-in defaults are used; an explicitly given file must exist.
fn load_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if !explicit && !path.exists() {
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config.validate().context("invalid configuration")?;
        return Ok(config);
    }
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db_path = config.store.database_path();
    let db = Database::new(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
    }

    std::fs::write(output, AppConfig::default_template())
        .context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Point [store] database at your page database");
    println!("  2. Adjust the [merge] defaults");
    println!(
        "  3. Validate with: sitemerge validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config.apply_env_overrides();
    println!("  [OK] Environment overrides applied");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!(
        "  Database          : {}",
        config.store.database_path().display()
    );
    println!("  Log level         : {}", config.logging.level);
    println!(
        "  Include children  : {}",
        style::yes_no(config.merge.include_descendants)
    );
    println!(
        "  All site trees    : {}",
        style::yes_no(config.merge.include_all_trees)
    );
    println!("  Collision policy  : {}", config.merge.collision_policy);
    println!(
        "  Keep unapproved   : {}",
        style::yes_no(config.merge.keep_unapproved)
    );
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_history(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_audit_log(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No merge runs recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Timestamp", "Action", "Result", "Details"]);

    for entry in &entries {
        let result = if entry.success {
            style::success("ok")
        } else {
            style::error("failed")
        };
        table.add_row(vec![
            Cell::new(&entry.created_at),
            Cell::new(&entry.action),
            Cell::new(result),
            Cell::new(describe_details(entry.details.as_deref().unwrap_or(""))),
        ]);
    }

    println!("{}", table);
    println!();
    println!("{} entries shown", entries.len());

    Ok(())
}

/// Render audit details: merge digests become a one-line summary, anything
/// else is shown truncated.
fn describe_details(details: &str) -> String {
    match serde_json::from_str::<ReportDigest>(details) {
        Ok(d) => format!(
            "{} -> {} ({}): merged {}, relocated {}, skipped {}, trashed {}; {}",
            d.source_root,
            d.target_root,
            d.collision_policy,
            d.merged,
            d.relocated,
            d.skipped,
            d.trashed,
            d.status
        ),
        Err(_) => truncate(details, 80),
    }
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer sentence", 10), "a longe...");
        assert_eq!(truncate("ページの内容です", 5), "ペー...");
    }

    #[test]
    fn test_describe_details() {
        let digest = ReportDigest {
            run_id: "r".into(),
            source_root: "/about".into(),
            target_root: "/company".into(),
            collision_policy: "replace".into(),
            merged: 1,
            relocated: 2,
            skipped: 0,
            trashed: 1,
            retained: 0,
            status: "completed".into(),
            started_at: "2025-01-01T00:00:00Z".into(),
            finished_at: None,
        };
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(
            describe_details(&json),
            "/about -> /company (replace): merged 1, relocated 2, skipped 0, trashed 1; completed"
        );
        assert_eq!(describe_details("plain text"), "plain text");
    }

    #[test]
    fn test_init_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");
        cmd_init(&path).unwrap();
        assert!(AppConfig::load_from_file(&path).is_ok());
        assert!(cmd_init(&path).is_err());
    }

    #[test]
    fn test_missing_default_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_config(&missing, false).is_ok());
        assert!(load_config(&missing, true).is_err());
    }

    #[test]
    fn test_cli_parses_merge_flags() {
        let cli = Cli::parse_from([
            "sitemerge",
            "--log-level",
            "debug",
            "merge",
            "--source",
            "/about",
            "--target",
            "/company",
            "--descendants",
            "--policy",
            "replace",
            "--yes",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.source.as_deref(), Some("/about"));
                assert!(args.scope.descendants);
                assert_eq!(
                    args.policy,
                    Some(sitemerge_core::config::CollisionPolicy::Replace)
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
