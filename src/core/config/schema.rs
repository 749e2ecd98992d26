//! core::config::schema
//!
//! Configuration schema types.
//!
//! The global and local files share one schema; every field is optional so
//! a local file only needs to name what it overrides.
//!
//! # Validation
//!
//! Config values are validated after parsing (e.g. the branch prefix must
//! be usable inside a branch name).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Contents of one configuration file.
///
/// # Example
///
/// ```toml
/// [publish]
/// branch_prefix = "inkpress"
/// default_pr_title = "Content update"
/// max_concurrent_reads = 8
///
/// [forge]
/// api_base = "https://api.github.com"
/// token_env = "GITHUB_TOKEN"
///
/// [webhook]
/// secret_env = "INKPRESS_WEBHOOK_SECRET"
///
/// [store]
/// path = "/var/lib/inkpress/db.json"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub publish: Option<PublishConfig>,
    pub forge: Option<ForgeConfig>,
    pub webhook: Option<WebhookConfig>,
    pub store: Option<StoreConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(publish) = &self.publish {
            publish.validate()?;
        }
        if let Some(forge) = &self.forge {
            forge.validate()?;
        }
        Ok(())
    }
}

/// Publish defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Leading component of generated working-branch names
    pub branch_prefix: Option<String>,

    /// Pull request title when the requester gives none
    pub default_pr_title: Option<String>,

    /// Upper bound on concurrent remote reads during a publish
    pub max_concurrent_reads: Option<usize>,
}

impl PublishConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.branch_prefix {
            BranchName::new(prefix.trim_matches('/')).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid branch_prefix: {}", e))
            })?;
        }
        if let Some(title) = &self.default_pr_title {
            if title.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "default_pr_title cannot be empty".to_string(),
                ));
            }
        }
        if self.max_concurrent_reads == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_concurrent_reads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Forge connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    /// API base URL (GitHub Enterprise installations)
    pub api_base: Option<String>,

    /// Environment variable holding the API token
    pub token_env: Option<String>,
}

impl ForgeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base) = &self.api_base {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "api_base must be an http(s) URL, got '{}'",
                    base
                )));
            }
        }
        Ok(())
    }
}

/// Webhook verification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    /// Environment variable holding the shared signing secret
    pub secret_env: Option<String>,
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON database file
    pub path: Option<PathBuf>,
}
