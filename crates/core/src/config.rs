//! TOML-based configuration system for SiteMerge.
//!
//! The file only carries defaults: where the page database lives, how chatty
//! the logs are, and the merge options the operator usually wants. Each run
//! turns those defaults plus the chosen roots into an immutable
//! [`MergeConfig`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{ConfigError, MergeError};
use crate::path;

/// Environment variable overriding `store.database`.
pub const ENV_DATABASE: &str = "SITEMERGE_DATABASE";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "SITEMERGE_LOG_LEVEL";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Page database settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Defaults for merge runs.
    #[serde(default)]
    pub merge: MergeDefaults,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite page database. A leading `~` is expanded.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_database() -> PathBuf {
    PathBuf::from("~/.local/share/sitemerge/pages.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl StoreConfig {
    /// Database path with `~` expanded to the home directory.
    pub fn database_path(&self) -> PathBuf {
        expand_tilde(&self.database)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// What to do when a source page has a counterpart in the target tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Copy the source content onto the target page.
    Replace,
    /// Leave both pages alone.
    #[default]
    Skip,
    /// Abort the run at the first collision.
    Stop,
}

impl CollisionPolicy {
    pub const ALL: [CollisionPolicy; 3] = [Self::Replace, Self::Skip, Self::Stop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Skip => "skip",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollisionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "skip" => Ok(Self::Skip),
            "stop" => Ok(Self::Stop),
            other => Err(ConfigError::InvalidValue {
                field: "merge.collision_policy".into(),
                detail: format!("unknown policy '{}' (expected replace, skip or stop)", other),
            }),
        }
    }
}

/// `[merge]` section: option defaults applied to every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDefaults {
    /// Walk whole subtrees instead of direct children only.
    #[serde(default)]
    pub include_descendants: bool,

    /// Search every site tree instead of the root's own tree.
    #[serde(default)]
    pub include_all_trees: bool,

    #[serde(default)]
    pub collision_policy: CollisionPolicy,

    /// Store replaced content unapproved.
    #[serde(default)]
    pub keep_unapproved: bool,
}

impl MergeDefaults {
    /// Build a run configuration for the given roots.
    pub fn for_roots(&self, source_root: &str, target_root: &str) -> MergeConfig {
        MergeConfig {
            source_root: source_root.to_string(),
            target_root: target_root.to_string(),
            include_descendants: self.include_descendants,
            include_all_trees: self.include_all_trees,
            collision_policy: self.collision_policy,
            keep_unapproved: self.keep_unapproved,
        }
    }
}

/// Immutable input for one merge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub source_root: String,
    pub target_root: String,
    pub include_descendants: bool,
    pub include_all_trees: bool,
    pub collision_policy: CollisionPolicy,
    /// Only honoured under [`CollisionPolicy::Replace`].
    pub keep_unapproved: bool,
}

impl MergeConfig {
    /// Normalize both roots and reject a run whose roots coincide.
    pub fn validate(&self) -> Result<MergeConfig, MergeError> {
        let source_root = path::normalize(&self.source_root);
        let target_root = path::normalize(&self.target_root);
        if source_root == target_root {
            return Err(MergeError::IdenticalRoots(source_root));
        }
        Ok(MergeConfig {
            source_root,
            target_root,
            ..self.clone()
        })
    }

    /// Whether cloned content is stored unapproved.
    pub fn force_unapproved(&self) -> bool {
        self.collision_policy == CollisionPolicy::Replace && self.keep_unapproved
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// Environment overrides are **not** applied; call
    /// [`apply_env_overrides`](Self::apply_env_overrides) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Let `SITEMERGE_DATABASE` and `SITEMERGE_LOG_LEVEL` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(database) = non_empty_env(ENV_DATABASE) {
            debug!(env = ENV_DATABASE, "overriding store.database");
            self.store.database = PathBuf::from(database);
        }
        if let Some(level) = non_empty_env(ENV_LOG_LEVEL) {
            debug!(env = ENV_LOG_LEVEL, "overriding logging.level");
            self.logging.level = level;
        }
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.database.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.database".into(),
                detail: "database path must not be empty".into(),
            });
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error", "off"].contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".into(),
                detail: format!("unknown level '{}'", self.logging.level),
            });
        }
        Ok(())
    }

    /// Convenience: load, apply overrides, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Commented TOML written by `sitemerge init`.
    pub fn default_template() -> &'static str {
        r#"# SiteMerge configuration

[store]
# SQLite page database.
database = "~/.local/share/sitemerge/pages.db"

[logging]
# trace, debug, info, warn, error
level = "warn"

[merge]
# Walk whole subtrees instead of direct children only.
include_descendants = false
# Search every site tree, not only the root's own tree.
include_all_trees = false
# replace, skip or stop
collision_policy = "skip"
# Store replaced content unapproved (replace only).
keep_unapproved = false
"#
    }
}

/// Default location of the config file: `~/.config/sitemerge/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sitemerge")
        .join("config.toml")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
