//! store
//!
//! Persistence for projects, documents, explorer operations and publish
//! branches.
//!
//! # Architecture
//!
//! [`Database`] owns every table behind a single mutex. Mutations run as
//! transactions: the closure edits a copy of the tables, the unique indexes
//! are checked, and only then is the copy swapped in (and written to the
//! snapshot file, if one is configured). A failed closure or a violated
//! index leaves the committed state untouched.
//!
//! A file-backed database may be shared by several processes. Each read
//! and transaction locks `<snapshot>.lock` (shared for reads, exclusive
//! for transactions) and reloads the snapshot first, so the unique indexes
//! are checked against what every process has committed.
//!
//! Unique indexes:
//! - document `(project, file_path)`
//! - pending op `(project, file_path)`
//! - active publish branch `(project)`
//!
//! The lock is never held across an `.await`: every store call is
//! synchronous and completes before the engine touches the forge.
//!
//! # Modules
//!
//! - [`documents`]: Document store (drafts, history, status transitions)
//! - [`ops`]: Explorer op store (staged creates and deletes)
//! - [`branches`]: Publish branch store
//! - [`projects`]: Project registry
//! - `lock`: Snapshot file locking

pub mod branches;
pub mod documents;
mod lock;
pub mod ops;
pub mod projects;

pub use branches::{BranchPatch, BranchStore};
pub use documents::{DocumentPatch, DocumentStore, NewDocument, PublishRecord};
pub use ops::ExplorerOpStore;
pub use projects::ProjectStore;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::lock::{LockMode, SnapshotLock};
use crate::core::model::{Document, ExplorerOp, HistoryEntry, Project, PublishBranch};
use crate::core::status::TransitionError;
use crate::core::types::{BranchId, DocumentId, OpId, ProjectId, RepoPath};

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A unique index would be violated by the transaction.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A pending operation already exists for the path.
    #[error("a pending operation already exists for '{0}'")]
    PendingOpExists(RepoPath),

    /// The operation is no longer pending.
    #[error("operation {id} is {status}, not pending")]
    OpNotPending { id: OpId, status: String },

    /// A status transition was rejected by the state machine.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Invalid input to a store operation.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Another thread panicked while holding the database lock.
    #[error("database lock poisoned")]
    Poisoned,

    /// Failed to lock the snapshot file.
    #[error("failed to lock database '{path}': {source}")]
    LockError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the snapshot file.
    #[error("failed to read database '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the snapshot file.
    #[error("failed to write database '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The snapshot file could not be (de)serialized.
    #[error("failed to parse database '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// All persisted records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub projects: BTreeMap<ProjectId, Project>,
    #[serde(default)]
    pub documents: BTreeMap<DocumentId, Document>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub ops: BTreeMap<OpId, ExplorerOp>,
    #[serde(default)]
    pub branches: BTreeMap<BranchId, PublishBranch>,
}

impl Tables {
    /// Check every unique index.
    fn check_unique(&self) -> Result<(), StoreError> {
        let mut doc_paths = HashSet::new();
        for doc in self.documents.values() {
            if !doc_paths.insert((doc.project_id, &doc.file_path)) {
                return Err(StoreError::UniqueViolation(format!(
                    "document path '{}' in project {}",
                    doc.file_path, doc.project_id
                )));
            }
        }

        let mut pending_paths = HashSet::new();
        for op in self.ops.values().filter(|op| op.is_pending()) {
            if !pending_paths.insert((op.project_id, &op.file_path)) {
                return Err(StoreError::UniqueViolation(format!(
                    "pending op for '{}' in project {}",
                    op.file_path, op.project_id
                )));
            }
        }

        let mut active = HashSet::new();
        for branch in self.branches.values().filter(|b| b.is_active()) {
            if !active.insert(branch.project_id) {
                return Err(StoreError::UniqueViolation(format!(
                    "active publish branch in project {}",
                    branch.project_id
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn project(&self, id: &ProjectId) -> Result<&Project, StoreError> {
        self.projects
            .get(id)
            .ok_or_else(|| StoreError::not_found("project", id))
    }

    pub(crate) fn document_mut(&mut self, id: &DocumentId) -> Result<&mut Document, StoreError> {
        self.documents
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("document", id))
    }

    pub(crate) fn document_at(&self, project: &ProjectId, path: &RepoPath) -> Option<&Document> {
        self.documents
            .values()
            .find(|d| &d.project_id == project && &d.file_path == path)
    }

    pub(crate) fn pending_op_at(&self, project: &ProjectId, path: &RepoPath) -> Option<&ExplorerOp> {
        self.ops
            .values()
            .find(|op| op.is_pending() && &op.project_id == project && &op.file_path == path)
    }
}

/// Transactional record store.
///
/// Cheap to clone; clones share the same tables. Separate [`Database::open`]
/// calls on one file, in this process or another, see each other's
/// committed transactions.
///
/// # Example
///
/// ```
/// use inkpress::store::Database;
///
/// let db = Database::in_memory();
/// let count = db.read(|t| t.projects.len()).unwrap();
/// assert_eq!(count, 0);
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Mutex<Tables>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Create an empty database that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tables::default())),
            path: None,
        }
    }

    /// Open a database backed by a JSON snapshot file.
    ///
    /// A missing file starts an empty database; it is created on the
    /// first committed transaction.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = {
            let _lock = SnapshotLock::acquire(&path, LockMode::Shared)?;
            load_snapshot(&path)?
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(tables)),
            path: Some(path),
        })
    }

    /// The snapshot file, if this database is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a read-only closure against the committed tables.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let _lock = self.lock_snapshot(LockMode::Shared)?;
        self.reload(&mut guard)?;
        Ok(f(&guard))
    }

    /// Run a mutation as a transaction.
    ///
    /// The closure works on a copy of the latest snapshot; the copy is
    /// committed only if the closure succeeds and every unique index holds.
    /// The snapshot stays exclusively locked until the copy is written.
    pub fn transact<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let _lock = self.lock_snapshot(LockMode::Exclusive)?;
        self.reload(&mut guard)?;
        let mut working = guard.clone();
        let result = f(&mut working)?;
        working.check_unique()?;
        if let Some(path) = &self.path {
            write_snapshot(path, &working)?;
        }
        *guard = working;
        Ok(result)
    }

    fn lock_snapshot(&self, mode: LockMode) -> Result<Option<SnapshotLock>, StoreError> {
        self.path
            .as_deref()
            .map(|path| SnapshotLock::acquire(path, mode))
            .transpose()
    }

    /// Replace the cached tables with what is on disk.
    fn reload(&self, tables: &mut Tables) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            *tables = load_snapshot(path)?;
        }
        Ok(())
    }

    pub fn projects(&self) -> ProjectStore<'_> {
        ProjectStore::new(self)
    }

    pub fn documents(&self) -> DocumentStore<'_> {
        DocumentStore::new(self)
    }

    pub fn ops(&self) -> ExplorerOpStore<'_> {
        ExplorerOpStore::new(self)
    }

    pub fn branches(&self) -> BranchStore<'_> {
        BranchStore::new(self)
    }
}

/// Read a snapshot; a missing file is an empty database.
fn load_snapshot(path: &Path) -> Result<Tables, StoreError> {
    if !path.exists() {
        return Ok(Tables::default());
    }
    let contents = fs::read_to_string(path).map_err(|e| StoreError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let tables: Tables = serde_json::from_str(&contents).map_err(|e| StoreError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tables.check_unique()?;
    Ok(tables)
}

/// Write the snapshot atomically (temp file in the same directory, then rename).
fn write_snapshot(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
    }

    let contents = serde_json::to_string_pretty(tables).map_err(|e| StoreError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path).map_err(|e| write_error(&temp_path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| write_error(&temp_path, e))?;
    file.sync_all().map_err(|e| write_error(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| write_error(path, e))?;

    Ok(())
}

fn write_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::WriteError {
        path: path.to_path_buf(),
        source,
    }
}
