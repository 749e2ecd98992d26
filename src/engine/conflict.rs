//! engine::conflict
//!
//! Optimistic concurrency checks run before any remote write.
//!
//! Three rules, each comparing a locally recorded blob hash with the one
//! currently on the remote:
//!
//! - a pending create conflicts if the file already exists
//! - a pending delete conflicts if the file changed since staging
//! - a dirty document conflicts if the file changed since the last sync
//!
//! A dirty document that was never synced is pushed as a new file, so it is
//! checked like a pending create.
//!
//! Planning and detection are pure; only [`fetch_remote_hashes`] talks to
//! the forge.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::fanout::read_files;
use crate::core::model::{Document, ExplorerOp, OpKind};
use crate::core::types::{BlobHash, BranchName, ContentRoot, RepoPath};
use crate::forge::{Forge, ForgeError};

/// A detected conflict, reported against the document-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub path: RepoPath,
    pub reason: ConflictReason,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    AlreadyExists {
        current: BlobHash,
    },
    ModifiedSinceStaging {
        expected: BlobHash,
        current: Option<BlobHash>,
    },
    ModifiedSinceSync {
        expected: BlobHash,
        current: Option<BlobHash>,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::AlreadyExists { current } => {
                write!(f, "already exists, hash={}", current.short(12))
            }
            ConflictReason::ModifiedSinceStaging { expected, current } => write!(
                f,
                "modified since staging, expected={} current={}",
                expected.short(12),
                display_current(current)
            ),
            ConflictReason::ModifiedSinceSync { expected, current } => write!(
                f,
                "modified since last sync, expected={} current={}",
                expected.short(12),
                display_current(current)
            ),
        }
    }
}

fn display_current(current: &Option<BlobHash>) -> &str {
    current.as_ref().map(|h| h.short(12)).unwrap_or("deleted")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    Create,
    Delete { expected: BlobHash },
    Sync { expected: BlobHash },
}

/// One hash comparison to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCheck {
    /// Document-relative path.
    pub path: RepoPath,
    /// Full repository path read from the forge.
    pub repo_path: RepoPath,
    pub kind: CheckKind,
}

/// Work out which paths need a remote hash, and what to compare it with.
///
/// Deletes staged without a hash have nothing to compare against and are
/// skipped, as are synced documents whose hash is unknown. Never-synced
/// documents get a create check. Dirty documents whose path also has a
/// pending op are covered by that op.
pub fn plan_checks(
    pending: &[ExplorerOp],
    dirty: &[Document],
    root: &ContentRoot,
) -> Vec<ConflictCheck> {
    let mut checks = Vec::new();
    let mut covered = BTreeSet::new();

    for op in pending.iter().filter(|op| op.is_pending()) {
        covered.insert(&op.file_path);
        let kind = match &op.kind {
            OpKind::Create { .. } => CheckKind::Create,
            OpKind::Delete {
                previous_hash: Some(expected),
            } => CheckKind::Delete {
                expected: expected.clone(),
            },
            OpKind::Delete {
                previous_hash: None,
            } => continue,
        };
        checks.push(ConflictCheck {
            path: op.file_path.clone(),
            repo_path: root.to_repo_path(&op.file_path),
            kind,
        });
    }

    for doc in dirty {
        if covered.contains(&doc.file_path) {
            continue;
        }
        let kind = match &doc.remote_hash {
            Some(expected) => CheckKind::Sync {
                expected: expected.clone(),
            },
            None if !doc.is_synced() => CheckKind::Create,
            None => continue,
        };
        checks.push(ConflictCheck {
            path: doc.file_path.clone(),
            repo_path: root.to_repo_path(&doc.file_path),
            kind,
        });
    }

    checks
}

/// Compare planned checks with the remote hashes.
///
/// `remote` maps full repository paths to the current hash, `None` when the
/// file is absent. Paths missing from the map count as absent.
pub fn detect(
    checks: &[ConflictCheck],
    remote: &BTreeMap<RepoPath, Option<BlobHash>>,
) -> Vec<Conflict> {
    checks
        .iter()
        .filter_map(|check| {
            let current = remote.get(&check.repo_path).cloned().flatten();
            let reason = match &check.kind {
                CheckKind::Create => ConflictReason::AlreadyExists { current: current? },
                CheckKind::Delete { expected } if current.as_ref() != Some(expected) => {
                    ConflictReason::ModifiedSinceStaging {
                        expected: expected.clone(),
                        current,
                    }
                }
                CheckKind::Sync { expected } if current.as_ref() != Some(expected) => {
                    ConflictReason::ModifiedSinceSync {
                        expected: expected.clone(),
                        current,
                    }
                }
                _ => return None,
            };
            Some(Conflict {
                path: check.path.clone(),
                reason,
            })
        })
        .collect()
}

/// Read the current hash of every checked path at `git_ref`.
///
/// # Errors
///
/// Any failed read fails the whole fetch, so that no check passes on
/// missing data.
pub async fn fetch_remote_hashes(
    forge: &Arc<dyn Forge>,
    git_ref: &BranchName,
    checks: &[ConflictCheck],
    max_concurrent: usize,
) -> Result<BTreeMap<RepoPath, Option<BlobHash>>, ForgeError> {
    let paths: BTreeSet<RepoPath> = checks.iter().map(|c| c.repo_path.clone()).collect();
    let reads = read_files(forge, git_ref, paths.into_iter().collect(), max_concurrent).await?;

    let mut hashes = BTreeMap::new();
    for (path, result) in reads {
        hashes.insert(path, result?.map(|file| file.hash));
    }
    Ok(hashes)
}
