//! forge::factory
//!
//! Forge selection and creation.
//!
//! Callers use [`create_forge`] instead of naming a forge implementation,
//! so the engine only ever sees `dyn Forge`.
//!
//! # Provider Detection
//!
//! - GitHub URLs (`github.com`, SSH or HTTPS) → `GitHubForge`
//! - Anything else → `ForgeError::NotImplemented`

use std::sync::Arc;

use super::github::{parse_github_url, GitHubForge};
use super::traits::{Forge, ForgeError};

/// Supported forge providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeProvider {
    GitHub,
}

impl ForgeProvider {
    /// Get the provider name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github",
        }
    }
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the forge provider from a remote URL.
///
/// # Example
///
/// ```
/// use inkpress::forge::{detect_provider, ForgeProvider};
///
/// assert_eq!(
///     detect_provider("git@github.com:owner/repo.git"),
///     Some(ForgeProvider::GitHub)
/// );
/// assert_eq!(detect_provider("https://example.com/owner/repo"), None);
/// ```
pub fn detect_provider(remote_url: &str) -> Option<ForgeProvider> {
    if parse_github_url(remote_url).is_some() {
        return Some(ForgeProvider::GitHub);
    }
    None
}

/// Create a forge from a remote URL and token.
///
/// `api_base` overrides the provider's default API endpoint (GitHub
/// Enterprise).
///
/// # Errors
///
/// - `ForgeError::NotImplemented` if no supported provider matches the URL
/// - `ForgeError::AuthRequired` if the token is empty
pub fn create_forge(
    remote_url: &str,
    token: &str,
    api_base: Option<&str>,
) -> Result<Arc<dyn Forge>, ForgeError> {
    if token.trim().is_empty() {
        return Err(ForgeError::AuthRequired);
    }

    let provider = detect_provider(remote_url).ok_or_else(|| {
        ForgeError::NotImplemented(format!(
            "no supported forge for remote '{}' (supported: github)",
            remote_url
        ))
    })?;

    match provider {
        ForgeProvider::GitHub => {
            let (owner, repo) = parse_github_url(remote_url).ok_or_else(|| {
                ForgeError::NotFound(format!("could not parse '{}' as a GitHub URL", remote_url))
            })?;
            let forge = match api_base {
                Some(base) => GitHubForge::with_api_base(token, owner, repo, base),
                None => GitHubForge::new(token, owner, repo),
            };
            Ok(Arc::new(forge))
        }
    }
}
