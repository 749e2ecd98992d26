//! engine::publish
//!
//! Turns pending ops and dirty documents into one commit on the project's
//! working branch, opening a pull request the first time.
//!
//! # Lifecycle
//!
//! ```text
//! authorize -> collect -> check conflicts -> materialize
//!           -> branch -> commit -> bookkeeping -> refresh hashes -> pull request
//! ```
//!
//! Nothing is written to the forge until every conflict check has passed
//! and every file has been materialized. Once the commit lands the publish
//! counts as done: later bookkeeping failures are logged, not returned.
//!
//! # Resume
//!
//! If a previous publish committed but never got a pull request open, a
//! publish with nothing new opens it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::conflict::{detect, fetch_remote_hashes, plan_checks, Conflict};
use super::fanout::read_files;
use super::{Engine, EngineError};
use crate::core::model::{Document, ExplorerOp, OpKind, Project, PublishBranch};
use crate::core::types::{BranchName, CommitHash, DocumentId, OpId, ProjectId, RepoPath, UserId};
use crate::forge::{Change, CreatePrRequest, FileChange, Forge, PullRequest};
use crate::store::BranchPatch;

/// Age after which an unconfirmed branch reservation counts as abandoned.
const RESERVATION_TIMEOUT_SECS: i64 = 300;

fn reservation_timeout() -> Duration {
    Duration::seconds(RESERVATION_TIMEOUT_SECS)
}

/// Caller-supplied pull request details.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Pull request title. Defaults to the configured title.
    pub title: Option<String>,
    /// Pull request description. Defaults to a list of changed files.
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published(PublishReceipt),
    /// Nothing was written to the forge.
    Conflicts { conflicts: Vec<Conflict> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub branch: BranchName,
    pub commit_hash: CommitHash,
    pub pr_number: u64,
    pub pr_url: String,
    pub summary: BatchSummary,
    /// Full repository paths written by this publish.
    pub files: Vec<RepoPath>,
}

/// Per-action item counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl BatchSummary {
    fn count(&mut self, change: &Change) {
        match change {
            Change::Create(_) => self.created += 1,
            Change::Update(_) => self.updated += 1,
            Change::Delete => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            (self.created, "created"),
            (self.updated, "updated"),
            (self.deleted, "deleted"),
        ]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{n} {label}"))
        .collect();
        if parts.is_empty() {
            write!(f, "no changes")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Where a batch item came from, for post-commit bookkeeping.
#[derive(Debug, Clone)]
enum Source {
    CreateOp { op: OpId, doc: Option<DocumentId> },
    DeleteOp { op: OpId, doc: Option<DocumentId> },
    Dirty(DocumentId),
}

#[derive(Debug, Clone)]
struct BatchItem {
    change: FileChange,
    source: Source,
}

impl Engine {
    /// Publish the project's pending work.
    ///
    /// Returns [`PublishOutcome::Conflicts`] without touching the forge if
    /// any remote file moved under a staged change.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if `requester` does not own the project
    /// - `Validation` for a blank title
    /// - `NothingToPublish` with no pending ops, dirty documents or
    ///   unfinished pull request
    /// - `Forge` if a read before the commit, the branch creation or the
    ///   commit fails; nothing has been recorded locally in that case
    /// - `Forge` if opening the pull request fails after the commit; the
    ///   commit is recorded and the next publish retries the pull request
    pub async fn publish(
        &self,
        project_id: &ProjectId,
        requester: &UserId,
        request: PublishRequest,
    ) -> Result<PublishOutcome, EngineError> {
        let project = self.db.projects().get(project_id)?;
        if !project.is_owned_by(requester) {
            return Err(EngineError::Unauthorized(format!(
                "{requester} may not publish project '{}'",
                project.name
            )));
        }
        if request.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(EngineError::Validation(
                "pull request title cannot be empty".into(),
            ));
        }

        let pending = self.db.ops().list_pending(project_id)?;
        let docs: BTreeMap<RepoPath, Document> = self
            .db
            .documents()
            .list(project_id)?
            .into_iter()
            .map(|d| (d.file_path.clone(), d))
            .collect();
        let staged: BTreeSet<&RepoPath> = pending.iter().map(|op| &op.file_path).collect();
        let dirty: Vec<Document> = docs
            .values()
            .filter(|d| d.is_dirty() && !staged.contains(&d.file_path))
            .cloned()
            .collect();
        let active = self.db.branches().active(project_id)?;

        if pending.is_empty() && dirty.is_empty() {
            if let Some(branch) = active.filter(|b| b.pr_number.is_none()) {
                if let Some(commit) = branch.last_commit_hash.clone() {
                    return self.resume_pull_request(&project, branch, commit, &request).await;
                }
            }
            return Err(EngineError::NothingToPublish);
        }
        info!(
            project = %project.name,
            ops = pending.len(),
            dirty = dirty.len(),
            "publishing"
        );

        let git_ref = active
            .as_ref()
            .filter(|b| b.remote_created)
            .map(|b| b.branch_name.clone())
            .unwrap_or_else(|| project.base_branch.clone());
        let forge = self.forge()?;
        let checks = plan_checks(&pending, &dirty, &project.content_root);
        let remote = fetch_remote_hashes(
            forge,
            &git_ref,
            &checks,
            self.settings.max_concurrent_reads,
        )
        .await?;
        let conflicts = detect(&checks, &remote);
        if !conflicts.is_empty() {
            warn!(
                project = %project.name,
                conflicts = conflicts.len(),
                "publish blocked by conflicts"
            );
            return Ok(PublishOutcome::Conflicts { conflicts });
        }
        debug!(checked = checks.len(), git_ref = %git_ref, "conflict checks passed");

        let items = self.materialize(&project, &pending, &dirty, &docs)?;
        let changes: Vec<FileChange> = items.iter().map(|i| i.change.clone()).collect();
        let mut summary = BatchSummary::default();
        for change in &changes {
            summary.count(&change.change);
        }

        let branch = self.ensure_branch(&project).await?;
        let message = format!("{}: {}", self.settings.default_pr_title, summary);
        let commit = forge
            .commit_batch(&branch.branch_name, &changes, &message)
            .await?;
        info!(
            branch = %branch.branch_name,
            commit = %commit.short(12),
            summary = %summary,
            "batch committed"
        );

        let files: Vec<RepoPath> = changes.iter().map(|c| c.path.clone()).collect();
        self.record_commit(&branch, &commit, &files, &items);
        self.refresh_hashes(forge, &project, &branch.branch_name, &items)
            .await;

        let pr = match self.existing_pull_request(&branch) {
            Some(pr) => pr,
            None => {
                let body = request
                    .description
                    .clone()
                    .unwrap_or_else(|| describe_changes(&summary, &changes));
                self.open_pull_request(&project, &branch, &request, body).await?
            }
        };

        Ok(PublishOutcome::Published(PublishReceipt {
            branch: branch.branch_name,
            commit_hash: commit,
            pr_number: pr.number,
            pr_url: pr.url,
            summary,
            files,
        }))
    }

    /// Build the file changes for this batch.
    ///
    /// A create uses the document's current content when it has a body,
    /// and the op's initial content otherwise.
    fn materialize(
        &self,
        project: &Project,
        pending: &[ExplorerOp],
        dirty: &[Document],
        docs: &BTreeMap<RepoPath, Document>,
    ) -> Result<Vec<BatchItem>, EngineError> {
        let root = &project.content_root;
        let mut items = Vec::with_capacity(pending.len() + dirty.len());

        for op in pending {
            let doc = docs.get(&op.file_path);
            let (change, source) = match &op.kind {
                OpKind::Create {
                    initial_body,
                    initial_frontmatter,
                    ..
                } => {
                    let content = match doc.and_then(|d| d.body.as_deref().map(|b| (d, b))) {
                        Some((d, body)) => self.codec.serialize(&d.frontmatter, body)?,
                        None => self.codec.serialize(initial_frontmatter, initial_body)?,
                    };
                    let source = Source::CreateOp {
                        op: op.id,
                        doc: doc.map(|d| d.id),
                    };
                    (Change::Create(content), source)
                }
                OpKind::Delete { .. } => {
                    let source = Source::DeleteOp {
                        op: op.id,
                        doc: doc.map(|d| d.id),
                    };
                    (Change::Delete, source)
                }
            };
            items.push(BatchItem {
                change: FileChange {
                    path: root.to_repo_path(&op.file_path),
                    change,
                },
                source,
            });
        }

        for doc in dirty {
            let body = doc.body.as_deref().unwrap_or_default();
            let content = self.codec.serialize(&doc.frontmatter, body)?;
            let change = if doc.is_synced() {
                Change::Update(content)
            } else {
                Change::Create(content)
            };
            items.push(BatchItem {
                change: FileChange {
                    path: root.to_repo_path(&doc.file_path),
                    change,
                },
                source: Source::Dirty(doc.id),
            });
        }

        Ok(items)
    }

    /// The active branch, creating it on the forge if it was just reserved.
    async fn ensure_branch(&self, project: &Project) -> Result<PublishBranch, EngineError> {
        let branches = self.db.branches();
        let (mut branch, mut created) =
            branches.get_or_create_active(&project.id, &self.settings.branch_prefix)?;

        if !created && !branch.remote_created {
            if Utc::now() - branch.updated_at < reservation_timeout() {
                return Err(EngineError::Busy(format!(
                    "branch {} is still being created by another publish",
                    branch.branch_name
                )));
            }
            warn!(branch = %branch.branch_name, "dropping stale branch reservation");
            branches.remove(&branch.id)?;
            (branch, created) =
                branches.get_or_create_active(&project.id, &self.settings.branch_prefix)?;
            if !created {
                return Err(EngineError::Busy(format!(
                    "branch {} was reserved by another publish",
                    branch.branch_name
                )));
            }
        }
        if !created {
            return Ok(branch);
        }

        if let Err(e) = self
            .forge()?
            .create_branch(&project.base_branch, &branch.branch_name)
            .await
        {
            if let Err(cleanup) = self.db.branches().remove(&branch.id) {
                warn!(branch = %branch.branch_name, error = %cleanup, "failed to drop branch record");
            }
            return Err(e.into());
        }
        info!(branch = %branch.branch_name, base = %project.base_branch, "branch created");
        Ok(branches.confirm(&branch.id)?)
    }

    /// Branch bookkeeping and op status after a successful commit.
    ///
    /// Failures are logged; the commit already happened.
    fn record_commit(
        &self,
        branch: &PublishBranch,
        commit: &CommitHash,
        files: &[RepoPath],
        items: &[BatchItem],
    ) {
        let patch = BranchPatch {
            last_commit_hash: Some(commit.clone()),
            committed_paths: files.iter().cloned().collect(),
            ..BranchPatch::default()
        };
        if let Err(e) = self.db.branches().update(&branch.id, patch) {
            warn!(branch = %branch.branch_name, error = %e, "failed to record commit on branch");
        }

        let op_ids: Vec<OpId> = items
            .iter()
            .filter_map(|item| match item.source {
                Source::CreateOp { op, .. } | Source::DeleteOp { op, .. } => Some(op),
                Source::Dirty(_) => None,
            })
            .collect();
        if op_ids.is_empty() {
            return;
        }
        match self.db.ops().mark_committed(&op_ids, commit) {
            Ok(n) => debug!(ops = n, "ops marked committed"),
            Err(e) => warn!(error = %e, "failed to mark ops committed"),
        }
    }

    fn existing_pull_request(&self, branch: &PublishBranch) -> Option<PullRequest> {
        let number = branch.pr_number?;
        Some(PullRequest {
            number,
            url: branch.pr_url.clone().unwrap_or_default(),
            head: branch.branch_name.to_string(),
            base: branch.base_branch.to_string(),
            title: String::new(),
        })
    }

    async fn open_pull_request(
        &self,
        project: &Project,
        branch: &PublishBranch,
        request: &PublishRequest,
        body: String,
    ) -> Result<PullRequest, EngineError> {
        let title = request
            .title
            .clone()
            .unwrap_or_else(|| self.settings.default_pr_title.clone());
        let pr = self
            .forge()?
            .create_pr(CreatePrRequest {
                head: branch.branch_name.clone(),
                base: project.base_branch.clone(),
                title,
                body: Some(body),
                draft: false,
            })
            .await
            .inspect_err(|e| {
                warn!(
                    branch = %branch.branch_name,
                    error = %e,
                    "pull request not opened; the next publish will retry"
                )
            })?;
        info!(number = pr.number, url = %pr.url, "pull request opened");

        let patch = BranchPatch {
            pr_number: Some(pr.number),
            pr_url: Some(pr.url.clone()),
            ..BranchPatch::default()
        };
        if let Err(e) = self.db.branches().update(&branch.id, patch) {
            warn!(number = pr.number, error = %e, "failed to record pull request");
        }
        Ok(pr)
    }

    async fn resume_pull_request(
        &self,
        project: &Project,
        branch: PublishBranch,
        commit: CommitHash,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, EngineError> {
        info!(branch = %branch.branch_name, "opening pull request for earlier commit");
        let files: Vec<RepoPath> = branch.committed_file_paths.iter().cloned().collect();
        let body = request.description.clone().unwrap_or_else(|| {
            let mut body = String::from("Changed files:\n");
            for path in &files {
                body.push_str(&format!("\n- `{path}`"));
            }
            body
        });
        let pr = self.open_pull_request(project, &branch, request, body).await?;
        Ok(PublishOutcome::Published(PublishReceipt {
            branch: branch.branch_name,
            commit_hash: commit,
            pr_number: pr.number,
            pr_url: pr.url,
            summary: BatchSummary::default(),
            files,
        }))
    }

    /// Record sync state for the documents carried by the batch.
    ///
    /// Documents whose content was written get the blob hash now on the
    /// branch. Documents behind a delete op are only marked synced. Read
    /// failures leave the previous hash in place.
    async fn refresh_hashes(
        &self,
        forge: &Arc<dyn Forge>,
        project: &Project,
        branch: &BranchName,
        items: &[BatchItem],
    ) {
        let documents = self.db.documents();
        let mut to_fetch = BTreeMap::new();
        for item in items {
            match &item.source {
                Source::Dirty(doc) | Source::CreateOp { doc: Some(doc), .. } => {
                    to_fetch.insert(item.change.path.clone(), *doc);
                }
                Source::DeleteOp { doc: Some(doc), .. } => {
                    if let Err(e) = documents.record_sync(doc, None) {
                        warn!(path = %item.change.path, error = %e, "failed to record sync");
                    }
                }
                _ => {}
            }
        }
        if to_fetch.is_empty() {
            return;
        }

        let paths: Vec<RepoPath> = to_fetch.keys().cloned().collect();
        let reads = match read_files(
            forge,
            branch,
            paths,
            self.settings.max_concurrent_reads,
        )
        .await
        {
            Ok(reads) => reads,
            Err(e) => {
                warn!(project = %project.name, error = %e, "hash refresh skipped");
                Vec::new()
            }
        };
        let mut hashes: BTreeMap<RepoPath, _> = BTreeMap::new();
        for (path, result) in reads {
            match result {
                Ok(Some(file)) => {
                    hashes.insert(path, file.hash);
                }
                Ok(None) => warn!(path = %path, "committed file missing on branch"),
                Err(e) => warn!(path = %path, error = %e, "hash refresh failed"),
            }
        }

        for (path, doc) in to_fetch {
            let hash = hashes.remove(&path);
            if let Err(e) = documents.record_sync(&doc, hash) {
                warn!(path = %path, error = %e, "failed to record sync");
            }
        }
    }
}

fn describe_changes(summary: &BatchSummary, changes: &[FileChange]) -> String {
    let mut body = format!("{summary}\n");
    for change in changes {
        body.push_str(&format!("\n- {} `{}`", change.change.action(), change.path));
    }
    body
}
