//! core::model
//!
//! Persisted records: projects, documents, history snapshots, explorer
//! operations and publish branches.
//!
//! Document and op paths are relative to the project's content root.
//! Publish branches record full repository paths, because that is what
//! the forge reports back.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::frontmatter::Frontmatter;
use super::status::DocumentStatus;
use super::types::{
    BlobHash, BranchId, BranchName, CommitHash, ContentRoot, DocumentId, HistoryId, OpId,
    ProjectId, RepoPath, UserId,
};

/// One remote repository plus the content root the engine manages in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner: UserId,
    /// Git remote URL of the repository on the forge.
    pub remote_url: String,
    pub base_branch: BranchName,
    pub content_root: ContentRoot,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }
}

/// Draft content and status for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub project_id: ProjectId,
    pub file_path: RepoPath,
    pub title: String,
    pub status: DocumentStatus,
    pub body: Option<String>,
    #[serde(default)]
    pub frontmatter: Frontmatter,
    /// Blob hash of the version last known to match the remote.
    pub remote_hash: Option<BlobHash>,
    /// [`content_digest`] of the content at the last confirmed sync.
    pub synced_digest: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Digest of the current frontmatter and body.
    pub fn digest(&self) -> String {
        content_digest(&self.frontmatter, self.body.as_deref())
    }

    /// Whether the document has ever been tied to a remote file, either by
    /// a recorded blob hash or by a completed sync.
    pub fn is_synced(&self) -> bool {
        self.remote_hash.is_some() || self.last_synced_at.is_some()
    }

    /// Whether the draft content has diverged from the last synced content.
    ///
    /// Only `draft` and `approved` documents with a body qualify.
    pub fn is_dirty(&self) -> bool {
        self.status.is_publishable_draft()
            && self.body.is_some()
            && self.synced_digest.as_deref() != Some(self.digest().as_str())
    }
}

/// SHA-256 over the canonical JSON of `[frontmatter, body]`.
///
/// Frontmatter maps are ordered, so the encoding is stable.
pub fn content_digest(frontmatter: &Frontmatter, body: Option<&str>) -> String {
    let canonical = serde_json::json!([frontmatter, body]).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Immutable snapshot of a document's content before it was overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub document_id: DocumentId,
    pub body: Option<String>,
    pub frontmatter: Frontmatter,
    pub editor: UserId,
    pub commit_hash: Option<CommitHash>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a staged explorer operation does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op_type", rename_all = "snake_case")]
pub enum OpKind {
    Create {
        title: String,
        initial_body: String,
        #[serde(default)]
        initial_frontmatter: Frontmatter,
    },
    Delete {
        /// Remote hash expected at staging time.
        previous_hash: Option<BlobHash>,
    },
}

impl OpKind {
    pub fn is_create(&self) -> bool {
        matches!(self, OpKind::Create { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, OpKind::Delete { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            OpKind::Create { .. } => "create",
            OpKind::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Pending,
    Committed,
    Undone,
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpStatus::Pending => write!(f, "pending"),
            OpStatus::Committed => write!(f, "committed"),
            OpStatus::Undone => write!(f, "undone"),
        }
    }
}

/// A staged create or delete, independent of document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerOp {
    pub id: OpId,
    pub project_id: ProjectId,
    pub file_path: RepoPath,
    #[serde(flatten)]
    pub kind: OpKind,
    pub status: OpStatus,
    pub commit_hash: Option<CommitHash>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExplorerOp {
    pub fn is_pending(&self) -> bool {
        self.status == OpStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Active,
    Merged,
    Closed,
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchStatus::Active => write!(f, "active"),
            BranchStatus::Merged => write!(f, "merged"),
            BranchStatus::Closed => write!(f, "closed"),
        }
    }
}

/// One working branch and its pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishBranch {
    pub id: BranchId,
    pub project_id: ProjectId,
    pub branch_name: BranchName,
    pub base_branch: BranchName,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub status: BranchStatus,
    pub last_commit_hash: Option<CommitHash>,
    /// Every full repository path ever pushed on this branch.
    #[serde(default)]
    pub committed_file_paths: BTreeSet<RepoPath>,
    /// `false` while the record is reserved but the host branch is not yet
    /// confirmed to exist.
    #[serde(default = "confirmed")]
    pub remote_created: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn confirmed() -> bool {
    true
}

impl PublishBranch {
    pub fn is_active(&self) -> bool {
        self.status == BranchStatus::Active
    }
}
