//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ProjectId`], [`DocumentId`], [`OpId`], [`BranchId`], [`HistoryId`] - record identifiers
//! - [`UserId`] - Editor / requester identity
//! - [`RepoPath`] - Validated slash-separated relative path
//! - [`ContentRoot`] - A project's content-root prefix inside the repository
//! - [`BlobHash`] - Content hash of a single file (stable across branches)
//! - [`CommitHash`] - Identifier of one commit
//! - [`BranchName`] - Validated Git branch name
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! `BlobHash` and `CommitHash` share a wire format but are deliberately
//! distinct types: a document's remote hash is typed as `BlobHash`, so a
//! merge commit hash cannot be written there by accident.
//!
//! # Examples
//!
//! ```
//! use inkpress::core::types::{BlobHash, BranchName, RepoPath};
//!
//! let path = RepoPath::new("blog/hello.mdx").unwrap();
//! assert_eq!(path.file_name(), "hello.mdx");
//!
//! let branch = BranchName::new("inkpress/publish-1").unwrap();
//! assert_eq!(branch.as_str(), "inkpress/publish-1");
//!
//! assert!(RepoPath::new("../escape.md").is_err());
//! assert!(BlobHash::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from its hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, TypeError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
            }

            /// The first eight hex characters, for display and naming.
            pub fn short(&self) -> String {
                self.0.simple().to_string()[..8].to_string()
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a project (one remote repository + content root).
    ProjectId
);
uuid_id!(
    /// Identifier of a document record.
    DocumentId
);
uuid_id!(
    /// Identifier of a staged explorer operation.
    OpId
);
uuid_id!(
    /// Identifier of a publish branch record.
    BranchId
);
uuid_id!(
    /// Identifier of a document history snapshot.
    HistoryId
);

/// Identity of an editor or publish requester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a user id. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidUserId` if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(TypeError::InvalidUserId("user id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated, slash-separated path relative to some root.
///
/// Used both for document paths (relative to a project's content root) and
/// for full repository paths (relative to the repository root).
///
/// Rules:
/// - Cannot be empty
/// - Cannot start or end with `/`
/// - Components cannot be empty, `.` or `..`
/// - Cannot contain `\` or ASCII control characters
///
/// # Example
///
/// ```
/// use inkpress::core::types::RepoPath;
///
/// let path = RepoPath::new("docs/guide/intro.md").unwrap();
/// assert_eq!(path.parent().unwrap().as_str(), "docs/guide");
/// assert_eq!(path.components().count(), 3);
///
/// assert!(RepoPath::new("").is_err());
/// assert!(RepoPath::new("/abs.md").is_err());
/// assert!(RepoPath::new("a//b.md").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a new validated path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if the path violates the rules above.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> Result<(), TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }
        if path.starts_with('/') {
            return Err(TypeError::InvalidPath(format!(
                "path must be relative: {path}"
            )));
        }
        if path.ends_with('/') {
            return Err(TypeError::InvalidPath(format!(
                "path cannot end with '/': {path}"
            )));
        }
        if path.contains('\\') {
            return Err(TypeError::InvalidPath(format!(
                "path cannot contain '\\': {path}"
            )));
        }
        if path.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidPath(
                "path cannot contain control characters".into(),
            ));
        }
        for component in path.split('/') {
            match component {
                "" => {
                    return Err(TypeError::InvalidPath(format!(
                        "path cannot contain empty components: {path}"
                    )))
                }
                "." | ".." => {
                    return Err(TypeError::InvalidPath(format!(
                        "path cannot contain '{component}': {path}"
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The final component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The path without its final component, or `None` at the top level.
    pub fn parent(&self) -> Option<RepoPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| RepoPath(parent.to_string()))
    }

    /// Whether `self` is `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &RepoPath) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0)
                && self.0.as_bytes().get(ancestor.0.len()) == Some(&b'/'))
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RepoPath {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The directory inside the repository that holds a project's documents.
///
/// An empty root means documents live at the repository root. Document
/// paths are stored relative to this root; the forge always sees full
/// repository paths.
///
/// # Example
///
/// ```
/// use inkpress::core::types::{ContentRoot, RepoPath};
///
/// let root = ContentRoot::new("content/").unwrap();
/// let doc = RepoPath::new("blog/a.mdx").unwrap();
/// let full = root.to_repo_path(&doc);
/// assert_eq!(full.as_str(), "content/blog/a.mdx");
/// assert_eq!(root.strip(&full), Some(doc));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRoot(Option<RepoPath>);

impl ContentRoot {
    /// Create a content root. Leading and trailing slashes are ignored.
    pub fn new(prefix: impl Into<String>) -> Result<Self, TypeError> {
        let prefix = prefix.into();
        let trimmed = prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self(None));
        }
        Ok(Self(Some(RepoPath::new(trimmed)?)))
    }

    /// The repository root itself.
    pub fn repo_root() -> Self {
        Self(None)
    }

    /// The prefix as a string, empty for the repository root.
    pub fn as_str(&self) -> &str {
        self.0.as_ref().map(RepoPath::as_str).unwrap_or("")
    }

    /// Map a document-relative path to a full repository path.
    pub fn to_repo_path(&self, doc_path: &RepoPath) -> RepoPath {
        match &self.0 {
            Some(root) => RepoPath(format!("{}/{}", root.0, doc_path.0)),
            None => doc_path.clone(),
        }
    }

    /// Map a full repository path back to a document-relative path.
    ///
    /// Returns `None` for paths outside the content root.
    pub fn strip(&self, repo_path: &RepoPath) -> Option<RepoPath> {
        match &self.0 {
            Some(root) => repo_path
                .0
                .strip_prefix(root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|rest| RepoPath(rest.to_string())),
            None => Some(repo_path.clone()),
        }
    }
}

impl TryFrom<String> for ContentRoot {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentRoot> for String {
    fn from(root: ContentRoot) -> Self {
        root.as_str().to_string()
    }
}

impl std::fmt::Display for ContentRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared validation for hex hashes (SHA-1 is 40 chars, SHA-256 is 64).
fn normalize_hash(hash: impl Into<String>) -> Result<String, TypeError> {
    let hash = hash.into().to_ascii_lowercase();
    if hash.len() != 40 && hash.len() != 64 {
        return Err(TypeError::InvalidHash(format!(
            "expected 40 or 64 hex characters, got {}",
            hash.len()
        )));
    }
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TypeError::InvalidHash("hash must be hexadecimal".into()));
    }
    Ok(hash)
}

/// Content-addressable hash of a single file's contents.
///
/// Blob hashes are stable across branches and merges, which makes them
/// the version token for conflict detection.
///
/// # Example
///
/// ```
/// use inkpress::core::types::BlobHash;
///
/// let hash = BlobHash::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(hash.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(hash.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobHash(String);

impl BlobHash {
    /// Create a validated blob hash (normalized to lowercase).
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        normalize_hash(hash).map(Self)
    }

    /// Hash from a raw SHA-256 digest.
    pub fn from_sha256(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Get an abbreviated form of the hash.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BlobHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BlobHash> for String {
    fn from(hash: BlobHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for BlobHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single commit.
///
/// Differs across branches even for identical content, so it is never
/// used as a per-file version token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Create a validated commit hash (normalized to lowercase).
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        normalize_hash(hash).map(Self)
    }

    /// Hash from a raw SHA-256 digest.
    pub fn from_sha256(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Get an abbreviated form of the hash.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty or exactly `@`
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let fail = |reason: &str| Err(TypeError::InvalidBranchName(reason.to_string()));

        if name.is_empty() {
            return fail("branch name cannot be empty");
        }
        if name == "@" {
            return fail("branch name cannot be '@' (reserved)");
        }
        if name.starts_with('.') || name.starts_with('-') {
            return fail("branch name cannot start with '.' or '-'");
        }
        if name.ends_with(".lock") || name.ends_with('/') {
            return fail("branch name cannot end with '.lock' or '/'");
        }
        for bad in ["..", "@{", "//"] {
            if name.contains(bad) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{bad}'"
                )));
            }
        }

        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        for c in INVALID_CHARS {
            if name.contains(c) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{c}'"
                )));
            }
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return fail("branch name cannot contain control characters");
        }

        for component in name.split('/') {
            if component.starts_with('.') {
                return fail("path component cannot start with '.'");
            }
            if component.ends_with(".lock") {
                return fail("path component cannot end with '.lock'");
            }
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
