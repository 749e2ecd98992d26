//! store::ops
//!
//! Explorer op store: staged creates and deletes.
//!
//! At most one op per `(project, path)` may be pending. Staging a second
//! one fails with [`StoreError::PendingOpExists`]; the unique index in
//! [`Database`] backs this up for concurrent callers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use super::documents::{insert_document, push_snapshot, NewDocument};
use super::{Database, StoreError, Tables};
use crate::core::frontmatter::Frontmatter;
use crate::core::model::{ExplorerOp, OpKind, OpStatus};
use crate::core::status::DocumentStatus;
use crate::core::types::{BlobHash, CommitHash, OpId, ProjectId, RepoPath, UserId};

/// Store for explorer operations.
pub struct ExplorerOpStore<'a> {
    db: &'a Database,
}

impl<'a> ExplorerOpStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Stage creation of a file.
    ///
    /// An existing `published` or `archived` document at the path is reset
    /// to a `draft` holding the initial content, with its remote hash and
    /// publish time cleared; the old content is kept in history. Any other
    /// existing document is kept as is. Without a document, a new draft is
    /// created from the initial content.
    pub fn stage_create(
        &self,
        project: &ProjectId,
        path: RepoPath,
        created_by: &UserId,
        title: &str,
        initial_body: &str,
        initial_frontmatter: Frontmatter,
    ) -> Result<ExplorerOp, StoreError> {
        self.db.transact(|t| {
            t.project(project)?;
            ensure_no_pending(t, project, &path)?;
            let now = Utc::now();

            let existing = t.document_at(project, &path).map(|d| d.id);
            match existing {
                Some(id) => {
                    let prior = t.document_mut(&id)?.clone();
                    if matches!(
                        prior.status,
                        DocumentStatus::Published | DocumentStatus::Archived
                    ) {
                        let message = Some(format!("Superseded by re-creating {path}"));
                        push_snapshot(t, &prior, created_by, None, message, now);
                        let doc = t.document_mut(&id)?;
                        doc.title = title.to_string();
                        doc.body = Some(initial_body.to_string());
                        doc.frontmatter = initial_frontmatter.clone();
                        doc.status = DocumentStatus::Draft;
                        doc.remote_hash = None;
                        doc.synced_digest = None;
                        doc.published_at = None;
                        doc.updated_at = now;
                    }
                }
                None => {
                    insert_document(
                        t,
                        NewDocument {
                            project_id: *project,
                            file_path: path.clone(),
                            title: title.to_string(),
                            body: Some(initial_body.to_string()),
                            frontmatter: initial_frontmatter.clone(),
                        },
                        now,
                    )?;
                }
            }

            let kind = OpKind::Create {
                title: title.to_string(),
                initial_body: initial_body.to_string(),
                initial_frontmatter,
            };
            Ok(insert_op(t, project, path, kind, created_by))
        })
    }

    /// Stage deletion of a file, carrying the remote hash expected now.
    pub fn stage_delete(
        &self,
        project: &ProjectId,
        path: RepoPath,
        created_by: &UserId,
        previous_hash: Option<BlobHash>,
    ) -> Result<ExplorerOp, StoreError> {
        self.db.transact(|t| {
            t.project(project)?;
            ensure_no_pending(t, project, &path)?;
            let kind = OpKind::Delete { previous_hash };
            Ok(insert_op(t, project, path, kind, created_by))
        })
    }

    /// Undo a pending op.
    ///
    /// Undoing a create also removes its document, but only while that
    /// document is still a `draft`.
    pub fn undo(&self, id: &OpId) -> Result<ExplorerOp, StoreError> {
        self.db.transact(|t| {
            let op = t
                .ops
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("op", id))?;
            if !op.is_pending() {
                return Err(StoreError::OpNotPending {
                    id: *id,
                    status: op.status.to_string(),
                });
            }
            op.status = OpStatus::Undone;
            op.updated_at = Utc::now();
            let op = op.clone();

            if op.kind.is_create() {
                let draft = t
                    .document_at(&op.project_id, &op.file_path)
                    .filter(|d| d.status == DocumentStatus::Draft)
                    .map(|d| d.id);
                if let Some(doc_id) = draft {
                    t.documents.remove(&doc_id);
                    t.history.retain(|h| h.document_id != doc_id);
                }
            }
            Ok(op)
        })
    }

    /// Mark ops committed. Ops that are no longer pending are skipped.
    ///
    /// Returns how many ops changed.
    pub fn mark_committed(&self, ids: &[OpId], commit: &CommitHash) -> Result<usize, StoreError> {
        self.db.transact(|t| {
            let now = Utc::now();
            let mut changed = 0;
            for id in ids {
                if let Some(op) = t.ops.get_mut(id).filter(|op| op.is_pending()) {
                    op.status = OpStatus::Committed;
                    op.commit_hash = Some(commit.clone());
                    op.updated_at = now;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    /// Delete every committed op of a project. Returns how many were removed.
    pub fn clear_committed(&self, project: &ProjectId) -> Result<usize, StoreError> {
        self.db.transact(|t| {
            let before = t.ops.len();
            t.ops
                .retain(|_, op| !(&op.project_id == project && op.status == OpStatus::Committed));
            Ok(before - t.ops.len())
        })
    }

    /// Paths whose most recent committed op in the project is a delete.
    pub fn committed_deletes(&self, project: &ProjectId) -> Result<BTreeSet<RepoPath>, StoreError> {
        self.db.read(|t| {
            let mut latest: BTreeMap<&RepoPath, &ExplorerOp> = BTreeMap::new();
            for op in t
                .ops
                .values()
                .filter(|op| &op.project_id == project && op.status == OpStatus::Committed)
            {
                let entry = latest.entry(&op.file_path).or_insert(op);
                if (op.updated_at, op.created_at) > (entry.updated_at, entry.created_at) {
                    *entry = op;
                }
            }
            latest
                .into_iter()
                .filter(|(_, op)| !op.kind.is_create())
                .map(|(path, _)| path.clone())
                .collect()
        })
    }

    /// Pending ops of a project, ordered by path.
    pub fn list_pending(&self, project: &ProjectId) -> Result<Vec<ExplorerOp>, StoreError> {
        self.db.read(|t| {
            let mut ops: Vec<ExplorerOp> = t
                .ops
                .values()
                .filter(|op| &op.project_id == project && op.is_pending())
                .cloned()
                .collect();
            ops.sort_by(|a, b| a.file_path.cmp(&b.file_path));
            ops
        })
    }

    pub fn get(&self, id: &OpId) -> Result<ExplorerOp, StoreError> {
        self.db.read(|t| {
            t.ops
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("op", id))
        })?
    }
}

fn ensure_no_pending(t: &Tables, project: &ProjectId, path: &RepoPath) -> Result<(), StoreError> {
    if t.pending_op_at(project, path).is_some() {
        return Err(StoreError::PendingOpExists(path.clone()));
    }
    Ok(())
}

fn insert_op(
    t: &mut Tables,
    project: &ProjectId,
    path: RepoPath,
    kind: OpKind,
    created_by: &UserId,
) -> ExplorerOp {
    let now = Utc::now();
    let op = ExplorerOp {
        id: OpId::new(),
        project_id: *project,
        file_path: path,
        kind,
        status: OpStatus::Pending,
        commit_hash: None,
        created_by: created_by.clone(),
        created_at: now,
        updated_at: now,
    };
    t.ops.insert(op.id, op.clone());
    op
}
