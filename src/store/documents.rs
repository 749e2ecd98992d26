//! store::documents
//!
//! Document store: draft content, history snapshots and status.
//!
//! # Snapshots
//!
//! `save_draft` snapshots the previous content into history before
//! overwriting it, unless the previous body was empty. `publish` always
//! snapshots. History entries are never modified.
//!
//! # Status
//!
//! `transition_status` goes through [`next_status`], so `published` can
//! only be reached through [`DocumentStore::publish`] and
//! [`DocumentStore::publish_paths`], which callers invoke once a remote
//! commit is confirmed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::{Database, StoreError, Tables};
use crate::core::frontmatter::Frontmatter;
use crate::core::model::{Document, HistoryEntry};
use crate::core::status::{next_status, DocumentStatus, StatusAction};
use crate::core::types::{
    BlobHash, CommitHash, DocumentId, HistoryId, ProjectId, RepoPath, UserId,
};

/// Fields for a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub project_id: ProjectId,
    pub file_path: RepoPath,
    pub title: String,
    pub body: Option<String>,
    pub frontmatter: Frontmatter,
}

/// Partial update of a document. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub frontmatter: Option<Frontmatter>,
}

/// Details recorded when a document is marked published.
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub editor: UserId,
    /// Blob hash of the published content, when known.
    pub remote_hash: Option<BlobHash>,
    /// Commit that carried the content. Only written to history.
    pub commit_hash: Option<CommitHash>,
    pub message: Option<String>,
}

/// Store for documents and their history.
pub struct DocumentStore<'a> {
    db: &'a Database,
}

impl<'a> DocumentStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a draft document.
    ///
    /// # Errors
    ///
    /// `StoreError::UniqueViolation` if a document already exists at the path.
    pub fn create(&self, new: NewDocument) -> Result<Document, StoreError> {
        self.db.transact(|t| insert_document(t, new, Utc::now()))
    }

    /// Apply a patch and bump `updated_at`.
    pub fn update(&self, id: &DocumentId, patch: DocumentPatch) -> Result<Document, StoreError> {
        self.db.transact(|t| {
            let doc = t.document_mut(id)?;
            if let Some(title) = patch.title {
                doc.title = title;
            }
            if let Some(body) = patch.body {
                doc.body = Some(body);
            }
            if let Some(frontmatter) = patch.frontmatter {
                doc.frontmatter = frontmatter;
            }
            doc.updated_at = Utc::now();
            Ok(doc.clone())
        })
    }

    /// Overwrite body and frontmatter, snapshotting non-empty prior content.
    pub fn save_draft(
        &self,
        id: &DocumentId,
        editor: &UserId,
        body: String,
        frontmatter: Frontmatter,
        message: Option<String>,
    ) -> Result<Document, StoreError> {
        self.db.transact(|t| {
            let now = Utc::now();
            let prior = t.document_mut(id)?.clone();
            if prior.body.as_deref().is_some_and(|b| !b.is_empty()) {
                push_snapshot(t, &prior, editor, None, message, now);
            }
            let doc = t.document_mut(id)?;
            doc.body = Some(body);
            doc.frontmatter = frontmatter;
            doc.updated_at = now;
            Ok(doc.clone())
        })
    }

    /// Mark a document published after its content reached the remote.
    pub fn publish(&self, id: &DocumentId, record: PublishRecord) -> Result<Document, StoreError> {
        self.db.transact(|t| apply_publish(t, id, &record, Utc::now()))
    }

    /// Publish every promotable document of a project whose path is in `paths`.
    ///
    /// Documents in `draft`, `in_review`, `approved` or `scheduled` with a
    /// non-null body are promoted; everything else is left as is. Returns
    /// the promoted documents.
    pub fn publish_paths(
        &self,
        project: &ProjectId,
        paths: &BTreeSet<RepoPath>,
        record: PublishRecord,
    ) -> Result<Vec<Document>, StoreError> {
        self.db.transact(|t| {
            let now = Utc::now();
            let ids: Vec<DocumentId> = t
                .documents
                .values()
                .filter(|d| {
                    &d.project_id == project
                        && paths.contains(&d.file_path)
                        && d.status.is_promotable_on_merge()
                        && d.body.is_some()
                })
                .map(|d| d.id)
                .collect();

            ids.iter()
                .map(|id| apply_publish(t, id, &record, now))
                .collect()
        })
    }

    /// Archive the documents of a project whose files were deleted upstream.
    ///
    /// Documents already archived or with a pending op at their path are
    /// skipped. The remote hash and publish time are cleared; the prior
    /// content is kept in history. Returns the archived documents.
    pub fn retire_paths(
        &self,
        project: &ProjectId,
        paths: &BTreeSet<RepoPath>,
        record: PublishRecord,
    ) -> Result<Vec<Document>, StoreError> {
        self.db.transact(|t| {
            let now = Utc::now();
            let ids: Vec<DocumentId> = t
                .documents
                .values()
                .filter(|d| {
                    &d.project_id == project
                        && paths.contains(&d.file_path)
                        && d.status != DocumentStatus::Archived
                        && t.pending_op_at(project, &d.file_path).is_none()
                })
                .map(|d| d.id)
                .collect();

            let mut retired = Vec::with_capacity(ids.len());
            for id in ids {
                let prior = t.document_mut(&id)?.clone();
                push_snapshot(
                    t,
                    &prior,
                    &record.editor,
                    record.commit_hash.clone(),
                    record.message.clone(),
                    now,
                );
                let doc = t.document_mut(&id)?;
                doc.status = DocumentStatus::Archived;
                doc.remote_hash = None;
                doc.synced_digest = None;
                doc.published_at = None;
                doc.updated_at = now;
                retired.push(doc.clone());
            }
            Ok(retired)
        })
    }

    /// Apply a user-initiated status change.
    pub fn transition_status(
        &self,
        id: &DocumentId,
        action: StatusAction,
    ) -> Result<Document, StoreError> {
        self.db.transact(|t| {
            let doc = t.document_mut(id)?;
            doc.status = next_status(doc.status, action)?;
            doc.updated_at = Utc::now();
            Ok(doc.clone())
        })
    }

    /// Record that the current content matches the remote.
    ///
    /// Stores `remote_hash` when given; status is unchanged.
    pub fn record_sync(
        &self,
        id: &DocumentId,
        remote_hash: Option<BlobHash>,
    ) -> Result<Document, StoreError> {
        self.db.transact(|t| {
            let doc = t.document_mut(id)?;
            if let Some(hash) = remote_hash {
                doc.remote_hash = Some(hash);
            }
            doc.synced_digest = Some(doc.digest());
            doc.last_synced_at = Some(Utc::now());
            Ok(doc.clone())
        })
    }

    /// Take `remote_hash` as the document's new baseline.
    ///
    /// The local content is kept and counts as unpublished, so the next
    /// publish pushes it as an update checked against this hash.
    pub fn adopt_remote(
        &self,
        id: &DocumentId,
        remote_hash: BlobHash,
    ) -> Result<Document, StoreError> {
        self.db.transact(|t| {
            let doc = t.document_mut(id)?;
            doc.remote_hash = Some(remote_hash);
            doc.synced_digest = None;
            doc.updated_at = Utc::now();
            Ok(doc.clone())
        })
    }

    /// Remove a document and its history.
    pub fn delete(&self, id: &DocumentId) -> Result<Document, StoreError> {
        self.db.transact(|t| {
            let doc = t
                .documents
                .remove(id)
                .ok_or_else(|| StoreError::not_found("document", id))?;
            t.history.retain(|h| &h.document_id != id);
            Ok(doc)
        })
    }

    pub fn get(&self, id: &DocumentId) -> Result<Document, StoreError> {
        self.db.read(|t| {
            t.documents
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("document", id))
        })?
    }

    pub fn find_by_path(
        &self,
        project: &ProjectId,
        path: &RepoPath,
    ) -> Result<Option<Document>, StoreError> {
        self.db.read(|t| t.document_at(project, path).cloned())
    }

    /// All documents of a project, ordered by path.
    pub fn list(&self, project: &ProjectId) -> Result<Vec<Document>, StoreError> {
        self.select(project, |_| true)
    }

    pub fn list_by_status(
        &self,
        project: &ProjectId,
        status: DocumentStatus,
    ) -> Result<Vec<Document>, StoreError> {
        self.select(project, |d| d.status == status)
    }

    /// Documents whose title or path contains `query`, ignoring case.
    pub fn search(&self, project: &ProjectId, query: &str) -> Result<Vec<Document>, StoreError> {
        let needle = query.to_lowercase();
        self.select(project, |d| {
            d.title.to_lowercase().contains(&needle)
                || d.file_path.as_str().to_lowercase().contains(&needle)
        })
    }

    /// Documents eligible for the next publish.
    pub fn list_dirty(&self, project: &ProjectId) -> Result<Vec<Document>, StoreError> {
        self.select(project, Document::is_dirty)
    }

    /// History of a document, newest first.
    pub fn history(&self, id: &DocumentId) -> Result<Vec<HistoryEntry>, StoreError> {
        self.db.read(|t| {
            let mut entries: Vec<HistoryEntry> = t
                .history
                .iter()
                .filter(|h| &h.document_id == id)
                .cloned()
                .collect();
            entries.reverse();
            entries
        })
    }

    fn select(
        &self,
        project: &ProjectId,
        keep: impl Fn(&Document) -> bool,
    ) -> Result<Vec<Document>, StoreError> {
        self.db.read(|t| {
            let mut docs: Vec<Document> = t
                .documents
                .values()
                .filter(|d| &d.project_id == project && keep(d))
                .cloned()
                .collect();
            docs.sort_by(|a, b| a.file_path.cmp(&b.file_path));
            docs
        })
    }
}

/// Insert a new draft document inside an open transaction.
pub(crate) fn insert_document(
    t: &mut Tables,
    new: NewDocument,
    now: DateTime<Utc>,
) -> Result<Document, StoreError> {
    t.project(&new.project_id)?;
    if t.document_at(&new.project_id, &new.file_path).is_some() {
        return Err(StoreError::UniqueViolation(format!(
            "document already exists at '{}'",
            new.file_path
        )));
    }
    let doc = Document {
        id: DocumentId::new(),
        project_id: new.project_id,
        file_path: new.file_path,
        title: new.title,
        status: DocumentStatus::Draft,
        body: new.body,
        frontmatter: new.frontmatter,
        remote_hash: None,
        synced_digest: None,
        last_synced_at: None,
        published_at: None,
        created_at: now,
        updated_at: now,
    };
    t.documents.insert(doc.id, doc.clone());
    Ok(doc)
}

pub(crate) fn push_snapshot(
    t: &mut Tables,
    doc: &Document,
    editor: &UserId,
    commit_hash: Option<CommitHash>,
    message: Option<String>,
    now: DateTime<Utc>,
) {
    t.history.push(HistoryEntry {
        id: HistoryId::new(),
        document_id: doc.id,
        body: doc.body.clone(),
        frontmatter: doc.frontmatter.clone(),
        editor: editor.clone(),
        commit_hash,
        message,
        created_at: now,
    });
}

fn apply_publish(
    t: &mut Tables,
    id: &DocumentId,
    record: &PublishRecord,
    now: DateTime<Utc>,
) -> Result<Document, StoreError> {
    let prior = t.document_mut(id)?.clone();
    push_snapshot(
        t,
        &prior,
        &record.editor,
        record.commit_hash.clone(),
        record.message.clone(),
        now,
    );
    let doc = t.document_mut(id)?;
    doc.status = DocumentStatus::Published;
    if let Some(hash) = &record.remote_hash {
        doc.remote_hash = Some(hash.clone());
    }
    doc.synced_digest = Some(doc.digest());
    doc.published_at = Some(now);
    doc.last_synced_at = Some(now);
    doc.updated_at = now;
    Ok(doc.clone())
}
