//! engine::fanout
//!
//! Bounded concurrent file reads against the forge.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::types::{BranchName, RepoPath};
use crate::forge::{Forge, ForgeError, RemoteFile};

/// Result of one read, keyed by the full repository path.
pub(crate) type ReadResult = (RepoPath, Result<Option<RemoteFile>, ForgeError>);

/// Read every path at `git_ref`, at most `limit` requests in flight.
///
/// Per-path failures are returned alongside successes. A task that panics
/// or is cancelled fails the whole call, since its path would otherwise go
/// missing from the results.
pub(crate) async fn read_files(
    forge: &Arc<dyn Forge>,
    git_ref: &BranchName,
    paths: Vec<RepoPath>,
    limit: usize,
) -> Result<Vec<ReadResult>, ForgeError> {
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for path in paths {
        let forge = Arc::clone(forge);
        let git_ref = git_ref.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = forge.read_file(&path, &git_ref).await;
            (path, result)
        });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let read = joined
            .map_err(|e| ForgeError::NetworkError(format!("remote read task failed: {e}")))?;
        results.push(read);
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}
