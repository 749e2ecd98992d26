//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! inkpress has two configuration scopes:
//! - **Global**: User- or host-level settings
//! - **Local**: Overrides for the current working directory
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Local config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$INKPRESS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/inkpress/config.toml`
//! 3. `~/.inkpress/config.toml`
//!
//! # Local Config Location
//!
//! `.inkpress/config.toml` under the working directory.
//!
//! # Example
//!
//! ```no_run
//! use inkpress::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/srv/site"))).unwrap();
//! let config = result.config;
//!
//! println!("Branch prefix: {}", config.branch_prefix());
//! println!("Token env: {}", config.token_env());
//! ```

pub mod schema;

pub use schema::{FileConfig, ForgeConfig, PublishConfig, StoreConfig, WebhookConfig};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default leading component of working-branch names.
pub const DEFAULT_BRANCH_PREFIX: &str = "inkpress";

/// Default pull request title.
pub const DEFAULT_PR_TITLE: &str = "Content update";

/// Default bound on concurrent remote reads.
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 8;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Files that were read, in precedence order.
    pub sources: Vec<PathBuf>,
}

/// Publish behaviour handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    pub branch_prefix: String,
    pub default_pr_title: String,
    pub max_concurrent_reads: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            default_pr_title: DEFAULT_PR_TITLE.to_string(),
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
        }
    }
}

/// Merged configuration from all sources.
///
/// Accessor methods apply precedence rules automatically.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: FileConfig,
    /// Local overrides (if present)
    pub local: Option<FileConfig>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `cwd` is provided, also loads `.inkpress/config.toml` beneath it.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(cwd: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        let local_path = cwd.map(Self::local_config_path);
        Self::load_from(global_path.as_deref(), local_path.as_deref())
    }

    /// Load configuration from explicit file locations.
    ///
    /// Paths that do not exist are skipped.
    pub fn load_from(
        global_path: Option<&Path>,
        local_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut sources = Vec::new();

        let global = match global_path.filter(|p| p.exists()) {
            Some(path) => {
                sources.push(path.to_path_buf());
                Self::read_config(path)?
            }
            None => FileConfig::default(),
        };

        let local = match local_path.filter(|p| p.exists()) {
            Some(path) => {
                sources.push(path.to_path_buf());
                Some(Self::read_config(path)?)
            }
            None => None,
        };

        global.validate()?;
        if let Some(ref l) = local {
            l.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config { global, local },
            sources,
        })
    }

    /// Locate the global config file, if any exists.
    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("INKPRESS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("inkpress/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        Self::global_config_path().ok().filter(|p| p.exists())
    }

    /// Read and parse a config file.
    fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for global config.
    ///
    /// Returns `~/.inkpress/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".inkpress/config.toml"))
    }

    /// Get the local config path under a working directory.
    pub fn local_config_path(cwd: &Path) -> PathBuf {
        cwd.join(".inkpress/config.toml")
    }

    /// Resolve a value from the local file first, then the global one.
    fn lookup<'a, T: ?Sized>(&'a self, get: impl Fn(&'a FileConfig) -> Option<&'a T>) -> Option<&'a T> {
        self.local.as_ref().and_then(&get).or_else(|| get(&self.global))
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Leading component of working-branch names.
    ///
    /// Defaults to `inkpress`.
    pub fn branch_prefix(&self) -> &str {
        self.lookup(|c| c.publish.as_ref()?.branch_prefix.as_deref())
            .unwrap_or(DEFAULT_BRANCH_PREFIX)
    }

    /// Pull request title used when the requester gives none.
    pub fn default_pr_title(&self) -> &str {
        self.lookup(|c| c.publish.as_ref()?.default_pr_title.as_deref())
            .unwrap_or(DEFAULT_PR_TITLE)
    }

    /// Upper bound on concurrent remote reads.
    pub fn max_concurrent_reads(&self) -> usize {
        self.lookup(|c| c.publish.as_ref()?.max_concurrent_reads.as_ref())
            .copied()
            .unwrap_or(DEFAULT_MAX_CONCURRENT_READS)
    }

    /// Forge API base URL override.
    pub fn api_base(&self) -> Option<&str> {
        self.lookup(|c| c.forge.as_ref()?.api_base.as_deref())
    }

    /// Environment variable holding the forge token.
    ///
    /// Defaults to `GITHUB_TOKEN`.
    pub fn token_env(&self) -> &str {
        self.lookup(|c| c.forge.as_ref()?.token_env.as_deref())
            .unwrap_or("GITHUB_TOKEN")
    }

    /// Environment variable holding the webhook secret.
    ///
    /// Defaults to `INKPRESS_WEBHOOK_SECRET`.
    pub fn webhook_secret_env(&self) -> &str {
        self.lookup(|c| c.webhook.as_ref()?.secret_env.as_deref())
            .unwrap_or("INKPRESS_WEBHOOK_SECRET")
    }

    /// JSON database path, if configured.
    pub fn store_path(&self) -> Option<&Path> {
        self.lookup(|c| c.store.as_ref()?.path.as_deref())
    }

    /// Publish settings with precedence applied.
    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            branch_prefix: self.branch_prefix().to_string(),
            default_pr_title: self.default_pr_title().to_string(),
            max_concurrent_reads: self.max_concurrent_reads(),
        }
    }
}
