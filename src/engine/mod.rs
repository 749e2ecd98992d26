//! engine
//!
//! Publish reconciliation: staged explorer ops and dirty drafts in, one
//! commit and one pull request out.
//!
//! # Architecture
//!
//! [`Engine`] ties a [`Database`] to a [`Forge`]. All persistent state goes
//! through the stores; all remote state goes through the forge. The
//! engine never holds a store lock across a forge call.
//!
//! ```text
//! stage ops / save drafts --> publish --> branch + commit + PR
//!                                            |
//!                  webhook (merged) <--------+
//!                        |
//!                   promote committed paths to published
//! ```
//!
//! # Invariants
//!
//! - Zero forge writes when any conflict check fails
//! - At most one active branch per project
//! - `remote_hash` is only ever set from a blob hash read off the forge
//! - A merge promotes only documents whose paths were pushed on its branch
//!
//! # Modules
//!
//! - [`overlay`]: Projects pending ops onto the remote tree
//! - [`conflict`]: Hash-based conflict checks
//! - [`publish`]: The publish operation
//! - [`webhook`]: Pull request events
//! - `fanout`: Bounded concurrent reads

pub mod conflict;
mod fanout;
pub mod overlay;
pub mod publish;
pub mod webhook;

pub use conflict::{Conflict, ConflictReason};
pub use overlay::{NodeKind, TreeNode};
pub use publish::{BatchSummary, PublishOutcome, PublishReceipt, PublishRequest};
pub use webhook::{MergeReport, WebhookError, WebhookEvent, WebhookOutcome};

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::PublishSettings;
use crate::core::frontmatter::{CodecError, FrontBlockCodec, Frontmatter, YamlFrontBlock};
use crate::core::model::{Document, ExplorerOp, HistoryEntry, Project};
use crate::core::status::{StatusAction, TransitionError};
use crate::core::types::{
    BlobHash, BranchName, ContentRoot, DocumentId, OpId, ProjectId, RepoPath, UserId,
};
use crate::forge::{Forge, ForgeError};
use crate::store::{Database, NewDocument, StoreError};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input from the caller.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The caller may not perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("nothing to publish")]
    NothingToPublish,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Storage failure.
    #[error("store error: {0}")]
    Store(StoreError),

    /// The remote host failed or refused a request.
    #[error("remote error: {0}")]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// The engine was opened without a forge.
    #[error("no remote host configured")]
    Offline,

    /// Another publisher holds the project's branch reservation. Retry later.
    #[error("busy: {0}")]
    Busy(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            StoreError::Transition(e) => EngineError::Transition(e),
            StoreError::PendingOpExists(path) => {
                EngineError::Validation(format!("an op is already pending for {path}"))
            }
            StoreError::OpNotPending { id, status } => {
                EngineError::Validation(format!("op {} is {status}, not pending", id.short()))
            }
            other => EngineError::Store(other),
        }
    }
}

/// Details of a staged create.
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    /// Display title. Defaults to the file name.
    pub title: Option<String>,
    pub body: String,
    pub frontmatter: Frontmatter,
}

/// The publish reconciliation engine.
pub struct Engine {
    db: Database,
    forge: Option<Arc<dyn Forge>>,
    codec: Arc<dyn FrontBlockCodec>,
    settings: PublishSettings,
}

impl Engine {
    /// Create an engine with the YAML front-block codec.
    pub fn new(db: Database, forge: Arc<dyn Forge>, settings: PublishSettings) -> Self {
        Self {
            db,
            forge: Some(forge),
            codec: Arc::new(YamlFrontBlock),
            settings,
        }
    }

    /// Create an engine for local-only work.
    ///
    /// Operations that need the forge fail with [`EngineError::Offline`].
    pub fn offline(db: Database, settings: PublishSettings) -> Self {
        Self {
            db,
            forge: None,
            codec: Arc::new(YamlFrontBlock),
            settings,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn FrontBlockCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    fn forge(&self) -> Result<&Arc<dyn Forge>, EngineError> {
        self.forge.as_ref().ok_or(EngineError::Offline)
    }

    /// Register a repository as a project.
    pub fn register_project(
        &self,
        name: &str,
        owner: UserId,
        remote_url: &str,
        base_branch: BranchName,
        content_root: ContentRoot,
    ) -> Result<Project, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("project name cannot be empty".into()));
        }
        let project = self
            .db
            .projects()
            .create(name, owner, remote_url, base_branch, content_root)?;
        info!(project = %project.name, id = %project.id.short(), "project registered");
        Ok(project)
    }

    /// Stage creation of `path`.
    pub fn stage_create(
        &self,
        project: &ProjectId,
        path: RepoPath,
        user: &UserId,
        file: NewFile,
    ) -> Result<ExplorerOp, EngineError> {
        let title = file
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| path.file_name().to_string());
        let op = self.db.ops().stage_create(
            project,
            path,
            user,
            &title,
            &file.body,
            file.frontmatter,
        )?;
        debug!(path = %op.file_path, op = %op.id.short(), "create staged");
        Ok(op)
    }

    /// Stage deletion of `path`.
    ///
    /// Without an explicit hash, the hash recorded on the document at the
    /// path (if any) is what the delete will expect on the remote.
    pub fn stage_delete(
        &self,
        project: &ProjectId,
        path: RepoPath,
        user: &UserId,
        previous_hash: Option<BlobHash>,
    ) -> Result<ExplorerOp, EngineError> {
        let previous_hash = match previous_hash {
            Some(hash) => Some(hash),
            None => self
                .db
                .documents()
                .find_by_path(project, &path)?
                .and_then(|d| d.remote_hash),
        };
        let op = self
            .db
            .ops()
            .stage_delete(project, path, user, previous_hash)?;
        debug!(path = %op.file_path, op = %op.id.short(), "delete staged");
        Ok(op)
    }

    pub fn undo_op(&self, id: &OpId) -> Result<ExplorerOp, EngineError> {
        Ok(self.db.ops().undo(id)?)
    }

    pub fn list_pending(&self, project: &ProjectId) -> Result<Vec<ExplorerOp>, EngineError> {
        Ok(self.db.ops().list_pending(project)?)
    }

    /// The project's file tree with pending ops projected onto it.
    ///
    /// Reads the active branch when there is one, the base branch
    /// otherwise. `filter` narrows the tree by name, path or title.
    pub async fn tree(
        &self,
        project_id: &ProjectId,
        filter: Option<&str>,
    ) -> Result<Vec<TreeNode>, EngineError> {
        let project = self.db.projects().get(project_id)?;
        let git_ref = self.working_ref(&project)?;
        let entries = self
            .forge()?
            .read_tree(&git_ref, &project.content_root)
            .await?;
        let remote = overlay::build_tree(&entries, &project.content_root);
        let pending = self.db.ops().list_pending(project_id)?;
        let tree = overlay::overlay(&remote, &pending, &project.content_root);

        match filter {
            Some(query) => {
                let titles: BTreeMap<RepoPath, String> = self
                    .db
                    .documents()
                    .list(project_id)?
                    .into_iter()
                    .map(|d| (project.content_root.to_repo_path(&d.file_path), d.title))
                    .collect();
                Ok(overlay::filter_tree(&tree, query, &titles))
            }
            None => Ok(tree),
        }
    }

    /// The active branch of the project once it exists on the host, or its
    /// base branch.
    fn working_ref(&self, project: &Project) -> Result<BranchName, EngineError> {
        Ok(match self.db.branches().active(&project.id)? {
            Some(branch) if branch.remote_created => branch.branch_name,
            _ => project.base_branch.clone(),
        })
    }

    /// Make the remote file at `path` the document's baseline.
    ///
    /// Reads the working ref. Without a local document, one is created
    /// from the remote content and recorded as in sync. An existing
    /// document keeps its content, which the next publish pushes as an
    /// update checked against the hash just read.
    ///
    /// # Errors
    ///
    /// `NotFound` if the remote has no file at the path.
    pub async fn pull_remote(
        &self,
        project_id: &ProjectId,
        path: RepoPath,
    ) -> Result<Document, EngineError> {
        let project = self.db.projects().get(project_id)?;
        let git_ref = self.working_ref(&project)?;
        let repo_path = project.content_root.to_repo_path(&path);
        let file = self
            .forge()?
            .read_file(&repo_path, &git_ref)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "remote file",
                id: format!("{repo_path} at {git_ref}"),
            })?;

        let documents = self.db.documents();
        let doc = match documents.find_by_path(project_id, &path)? {
            Some(doc) => documents.adopt_remote(&doc.id, file.hash)?,
            None => {
                let (frontmatter, body) = self.codec.parse(&file.content)?;
                let doc = documents.create(NewDocument {
                    project_id: *project_id,
                    title: title_for(&frontmatter, &path),
                    file_path: path,
                    body: Some(body),
                    frontmatter,
                })?;
                documents.record_sync(&doc.id, Some(file.hash))?
            }
        };
        debug!(path = %doc.file_path, git_ref = %git_ref, "remote baseline recorded");
        Ok(doc)
    }

    /// Save draft content, creating the document on first edit.
    ///
    /// A new document takes its title from the `title` frontmatter key,
    /// falling back to the file name. It has no baseline, so its first
    /// publish fails with a conflict if the remote already has the file;
    /// [`Engine::pull_remote`] records one.
    pub fn save_draft(
        &self,
        project: &ProjectId,
        path: RepoPath,
        editor: &UserId,
        body: String,
        frontmatter: Frontmatter,
        message: Option<String>,
    ) -> Result<Document, EngineError> {
        let documents = self.db.documents();
        let doc = match documents.find_by_path(project, &path)? {
            Some(doc) => doc,
            None => {
                documents.create(NewDocument {
                    project_id: *project,
                    title: title_for(&frontmatter, &path),
                    file_path: path,
                    body: None,
                    frontmatter: Frontmatter::new(),
                })?
            }
        };
        Ok(documents.save_draft(&doc.id, editor, body, frontmatter, message)?)
    }

    /// Save a draft from raw file text, splitting off its front block.
    pub fn save_draft_text(
        &self,
        project: &ProjectId,
        path: RepoPath,
        editor: &UserId,
        text: &str,
        message: Option<String>,
    ) -> Result<Document, EngineError> {
        let (frontmatter, body) = self.codec.parse(text)?;
        self.save_draft(project, path, editor, body, frontmatter, message)
    }

    pub fn transition_status(
        &self,
        id: &DocumentId,
        action: StatusAction,
    ) -> Result<Document, EngineError> {
        let doc = self.db.documents().transition_status(id, action)?;
        debug!(path = %doc.file_path, status = %doc.status, "status changed");
        Ok(doc)
    }

    pub fn document_at(
        &self,
        project: &ProjectId,
        path: &RepoPath,
    ) -> Result<Document, EngineError> {
        self.db
            .documents()
            .find_by_path(project, path)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "document",
                id: path.to_string(),
            })
    }

    pub fn history(&self, id: &DocumentId) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.db.documents().history(id)?)
    }
}

/// The `title` frontmatter key, falling back to the file name.
fn title_for(frontmatter: &Frontmatter, path: &RepoPath) -> String {
    frontmatter
        .get("title")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.file_name().to_string())
}
