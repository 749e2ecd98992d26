//! forge::traits
//!
//! Forge trait definition for the remote git host.
//!
//! # Design
//!
//! The `Forge` trait is async because every operation is network I/O.
//! Reads return blob hashes alongside content so callers can use them as
//! version tokens. Writes are limited to what a publish needs: one branch,
//! one atomic multi-file commit, one pull request.
//!
//! # Example
//!
//! ```ignore
//! use inkpress::forge::{Change, FileChange, Forge};
//!
//! async fn push(forge: &dyn Forge, branch: &BranchName) -> Result<(), ForgeError> {
//!     let changes = vec![FileChange {
//!         path: RepoPath::new("content/blog/a.mdx")?,
//!         change: Change::Create("hello\n".to_string()),
//!     }];
//!     let commit = forge.commit_batch(branch, &changes, "1 created").await?;
//!     println!("pushed {}", commit.short(7));
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{BlobHash, BranchName, CommitHash, ContentRoot, RepoPath};

/// Errors from forge operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The operation is not supported by this forge.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// A file read from the remote, with its blob hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub hash: BlobHash,
}

/// Kind of a remote tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a remote tree listing. Paths are full repository paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: RepoPath,
    pub kind: EntryKind,
    /// Blob hash, for files.
    pub hash: Option<BlobHash>,
}

/// What happens to one file in a batch commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Create(String),
    Update(String),
    Delete,
}

impl Change {
    pub fn content(&self) -> Option<&str> {
        match self {
            Change::Create(content) | Change::Update(content) => Some(content),
            Change::Delete => None,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Change::Create(_) => "create",
            Change::Update(_) => "update",
            Change::Delete => "delete",
        }
    }
}

/// One item of a batch commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Full repository path.
    pub path: RepoPath,
    pub change: Change,
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// Head branch (the branch with changes)
    pub head: BranchName,
    /// Base branch (the branch to merge into)
    pub base: BranchName,
    pub title: String,
    pub body: Option<String>,
    pub draft: bool,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    /// Web URL for viewing
    pub url: String,
    pub head: String,
    pub base: String,
    pub title: String,
}

/// The remote git host.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one forge
/// across concurrent read tasks.
///
/// # Error Handling
///
/// - `AuthRequired` / `AuthFailed`: token missing or rejected
/// - `NotFound`: repository, ref or branch doesn't exist
/// - `RateLimited`: back off and retry later
/// - `ApiError`: the host rejected the request
/// - `NetworkError`: the host could not be reached
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Read one file at `git_ref`.
    ///
    /// A missing file is `Ok(None)`, not an error.
    async fn read_file(
        &self,
        path: &RepoPath,
        git_ref: &BranchName,
    ) -> Result<Option<RemoteFile>, ForgeError>;

    /// List every entry below `prefix` at `git_ref`, recursively.
    async fn read_tree(
        &self,
        git_ref: &BranchName,
        prefix: &ContentRoot,
    ) -> Result<Vec<TreeEntry>, ForgeError>;

    /// Create branch `name` at the tip of `base`.
    ///
    /// Returns the commit the branch was created at.
    async fn create_branch(
        &self,
        base: &BranchName,
        name: &BranchName,
    ) -> Result<CommitHash, ForgeError>;

    /// Apply every change in one commit on `branch`.
    ///
    /// Either all changes land or none do.
    async fn commit_batch(
        &self,
        branch: &BranchName,
        changes: &[FileChange],
        message: &str,
    ) -> Result<CommitHash, ForgeError>;

    /// Open a pull request.
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_content_and_action() {
        assert_eq!(Change::Create("a".into()).content(), Some("a"));
        assert_eq!(Change::Update("b".into()).action(), "update");
        assert_eq!(Change::Delete.content(), None);
        assert_eq!(Change::Delete.action(), "delete");
    }

    #[test]
    fn forge_error_display() {
        assert_eq!(
            format!("{}", ForgeError::AuthRequired),
            "authentication required"
        );
        assert_eq!(
            format!("{}", ForgeError::NotFound("ref main".into())),
            "not found: ref main"
        );
        assert_eq!(
            format!(
                "{}",
                ForgeError::ApiError {
                    status: 422,
                    message: "Reference already exists".into()
                }
            ),
            "API error: 422 - Reference already exists"
        );
        assert_eq!(format!("{}", ForgeError::RateLimited), "rate limited");
    }
}
