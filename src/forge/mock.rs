//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock keeps branches in memory as `path → content` maps. Blob
//! hashes are computed git-style over the content (`blob <len>\0<content>`,
//! SHA-256), so identical content always hashes the same on every branch,
//! while every commit gets a fresh commit hash. Failures can be injected
//! per operation, and every call is recorded for verification.
//!
//! A new mock has one empty branch, `main`.
//!
//! # Example
//!
//! ```
//! use inkpress::core::types::{BranchName, RepoPath};
//! use inkpress::forge::mock::MockForge;
//! use inkpress::forge::Forge;
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//! let main = BranchName::new("main").unwrap();
//! let path = RepoPath::new("docs/x.md").unwrap();
//! forge.set_file("main", &path, "hello");
//!
//! let file = forge.read_file(&path, &main).await.unwrap().unwrap();
//! assert_eq!(file.content, "hello");
//! assert_eq!(file.hash, MockForge::blob_hash("hello"));
//! # });
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::{
    Change, CreatePrRequest, EntryKind, FileChange, Forge, ForgeError, PullRequest, RemoteFile,
    TreeEntry,
};
use crate::core::types::{BlobHash, BranchName, CommitHash, ContentRoot, RepoPath};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug)]
struct MockForgeInner {
    branches: BTreeMap<String, MockBranch>,
    prs: BTreeMap<u64, PullRequest>,
    next_pr_number: u64,
    commit_counter: u64,
    fail_on: Vec<FailOn>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Clone)]
struct MockBranch {
    files: BTreeMap<RepoPath, String>,
    head: CommitHash,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail every read_file with the given error.
    ReadFile(ForgeError),
    /// Fail read_file for one path only.
    ReadPath(RepoPath, ForgeError),
    ReadTree(ForgeError),
    CreateBranch(ForgeError),
    CommitBatch(ForgeError),
    CreatePr(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOperation {
    ReadFile {
        path: RepoPath,
        git_ref: String,
    },
    ReadTree {
        git_ref: String,
    },
    CreateBranch {
        base: String,
        name: String,
    },
    CommitBatch {
        branch: String,
        /// `(path, action)` per change
        changes: Vec<(RepoPath, &'static str)>,
        message: String,
    },
    CreatePr {
        head: String,
        base: String,
        title: String,
        body: Option<String>,
    },
}

impl MockOperation {
    /// Whether the operation changes remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MockOperation::CreateBranch { .. }
                | MockOperation::CommitBatch { .. }
                | MockOperation::CreatePr { .. }
        )
    }
}

impl MockForge {
    /// Create a mock with one empty `main` branch.
    pub fn new() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(
            "main".to_string(),
            MockBranch {
                files: BTreeMap::new(),
                head: commit_hash_for(0, "main", "initial"),
            },
        );
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                branches,
                prs: BTreeMap::new(),
                next_pr_number: 1,
                commit_counter: 0,
                fail_on: Vec::new(),
                operations: Vec::new(),
            })),
        }
    }

    /// Git-style blob hash of `content`.
    pub fn blob_hash(content: &str) -> BlobHash {
        let mut hasher = Sha256::new();
        hasher.update(format!("blob {}\0", content.len()).as_bytes());
        hasher.update(content.as_bytes());
        BlobHash::from_sha256(hasher.finalize().into())
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use inkpress::forge::mock::{FailOn, MockForge};
    /// use inkpress::forge::ForgeError;
    ///
    /// let forge = MockForge::new().fail_on(FailOn::CommitBatch(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.state().fail_on.push(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.state().fail_on.clear();
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Number of recorded operations that change remote state.
    pub fn write_count(&self) -> usize {
        self.state()
            .operations
            .iter()
            .filter(|op| op.is_write())
            .count()
    }

    /// Write a file directly on a branch, bypassing the trait.
    ///
    /// Simulates a change made elsewhere. Creates the branch if needed.
    pub fn set_file(&self, branch: &str, path: &RepoPath, content: &str) {
        let mut state = self.state();
        let head = state.next_commit(branch, "external change");
        let entry = state
            .branches
            .entry(branch.to_string())
            .or_insert_with(|| MockBranch {
                files: BTreeMap::new(),
                head: head.clone(),
            });
        entry.files.insert(path.clone(), content.to_string());
        entry.head = head;
    }

    /// Remove a file directly from a branch.
    pub fn remove_file(&self, branch: &str, path: &RepoPath) {
        let mut state = self.state();
        let head = state.next_commit(branch, "external removal");
        if let Some(entry) = state.branches.get_mut(branch) {
            entry.files.remove(path);
            entry.head = head;
        }
    }

    /// Content of a file on a branch.
    pub fn file(&self, branch: &str, path: &RepoPath) -> Option<String> {
        self.state()
            .branches
            .get(branch)
            .and_then(|b| b.files.get(path).cloned())
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.state().branches.contains_key(branch)
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.state().branches.keys().cloned().collect()
    }

    /// Tip commit of a branch.
    pub fn head(&self, branch: &str) -> Option<CommitHash> {
        self.state().branches.get(branch).map(|b| b.head.clone())
    }

    pub fn pr(&self, number: u64) -> Option<PullRequest> {
        self.state().prs.get(&number).cloned()
    }

    pub fn pr_count(&self) -> usize {
        self.state().prs.len()
    }

    /// Merge a pull request: its head's files replace the base's files.
    ///
    /// Returns the merge commit hash.
    pub fn merge_pr(&self, number: u64) -> Result<CommitHash, ForgeError> {
        let mut state = self.state();
        let pr = state
            .prs
            .get(&number)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", number)))?;
        let head_files = state
            .branches
            .get(&pr.head)
            .map(|b| b.files.clone())
            .ok_or_else(|| ForgeError::NotFound(format!("branch {}", pr.head)))?;
        let merge = state.next_commit(&pr.base, &format!("Merge #{}", number));
        let base = state
            .branches
            .get_mut(&pr.base)
            .ok_or_else(|| ForgeError::NotFound(format!("branch {}", pr.base)))?;
        base.files = head_files;
        base.head = merge.clone();
        Ok(merge)
    }

    fn state(&self) -> MutexGuard<'_, MockForgeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockForgeInner {
    fn record(&mut self, op: MockOperation) {
        self.operations.push(op);
    }

    /// Injected failure for an operation, if configured.
    fn failure(&self, matches: impl Fn(&FailOn) -> Option<&ForgeError>) -> Option<ForgeError> {
        self.fail_on.iter().find_map(|f| matches(f).cloned())
    }

    fn next_commit(&mut self, branch: &str, message: &str) -> CommitHash {
        self.commit_counter += 1;
        commit_hash_for(self.commit_counter, branch, message)
    }

    fn branch(&self, name: &str) -> Result<&MockBranch, ForgeError> {
        self.branches
            .get(name)
            .ok_or_else(|| ForgeError::NotFound(format!("ref refs/heads/{}", name)))
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

fn commit_hash_for(counter: u64, branch: &str, message: &str) -> CommitHash {
    let digest = Sha256::digest(format!("commit {} {} {}", counter, branch, message).as_bytes());
    CommitHash::from_sha256(digest.into())
}

/// Directories strictly between `prefix` and `path`.
fn ancestor_dirs(path: &RepoPath, prefix: &ContentRoot) -> Vec<RepoPath> {
    let mut dirs = Vec::new();
    let mut current = path.parent();
    while let Some(dir) = current {
        if prefix.strip(&dir).is_none() {
            break;
        }
        current = dir.parent();
        dirs.push(dir);
    }
    dirs
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn read_file(
        &self,
        path: &RepoPath,
        git_ref: &BranchName,
    ) -> Result<Option<RemoteFile>, ForgeError> {
        let mut state = self.state();
        state.record(MockOperation::ReadFile {
            path: path.clone(),
            git_ref: git_ref.to_string(),
        });
        if let Some(err) = state.failure(|f| match f {
            FailOn::ReadFile(e) => Some(e),
            FailOn::ReadPath(p, e) if p == path => Some(e),
            _ => None,
        }) {
            return Err(err);
        }

        let branch = state.branch(git_ref.as_str())?;
        Ok(branch.files.get(path).map(|content| RemoteFile {
            content: content.clone(),
            hash: Self::blob_hash(content),
        }))
    }

    async fn read_tree(
        &self,
        git_ref: &BranchName,
        prefix: &ContentRoot,
    ) -> Result<Vec<TreeEntry>, ForgeError> {
        let mut state = self.state();
        state.record(MockOperation::ReadTree {
            git_ref: git_ref.to_string(),
        });
        if let Some(err) = state.failure(|f| match f {
            FailOn::ReadTree(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }

        let branch = state.branch(git_ref.as_str())?;
        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for (path, content) in &branch.files {
            if prefix.strip(path).is_none() {
                continue;
            }
            dirs.extend(ancestor_dirs(path, prefix));
            entries.push(TreeEntry {
                path: path.clone(),
                kind: EntryKind::File,
                hash: Some(Self::blob_hash(content)),
            });
        }
        entries.extend(dirs.into_iter().map(|path| TreeEntry {
            path,
            kind: EntryKind::Dir,
            hash: None,
        }));
        Ok(entries)
    }

    async fn create_branch(
        &self,
        base: &BranchName,
        name: &BranchName,
    ) -> Result<CommitHash, ForgeError> {
        let mut state = self.state();
        state.record(MockOperation::CreateBranch {
            base: base.to_string(),
            name: name.to_string(),
        });
        if let Some(err) = state.failure(|f| match f {
            FailOn::CreateBranch(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }

        if state.branches.contains_key(name.as_str()) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: "Reference already exists".into(),
            });
        }
        let branch = state.branch(base.as_str())?.clone();
        let head = branch.head.clone();
        state.branches.insert(name.to_string(), branch);
        Ok(head)
    }

    async fn commit_batch(
        &self,
        branch: &BranchName,
        changes: &[FileChange],
        message: &str,
    ) -> Result<CommitHash, ForgeError> {
        let mut state = self.state();
        state.record(MockOperation::CommitBatch {
            branch: branch.to_string(),
            changes: changes
                .iter()
                .map(|c| (c.path.clone(), c.change.action()))
                .collect(),
            message: message.to_string(),
        });
        if let Some(err) = state.failure(|f| match f {
            FailOn::CommitBatch(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }

        let mut files = state.branch(branch.as_str())?.files.clone();
        for change in changes {
            match &change.change {
                Change::Create(content) | Change::Update(content) => {
                    files.insert(change.path.clone(), content.clone());
                }
                Change::Delete => {
                    if files.remove(&change.path).is_none() {
                        return Err(ForgeError::ApiError {
                            status: 422,
                            message: format!("path '{}' does not exist", change.path),
                        });
                    }
                }
            }
        }

        let head = state.next_commit(branch.as_str(), message);
        let entry = state
            .branches
            .get_mut(branch.as_str())
            .ok_or_else(|| ForgeError::NotFound(format!("ref refs/heads/{}", branch)))?;
        entry.files = files;
        entry.head = head.clone();
        Ok(head)
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let mut state = self.state();
        state.record(MockOperation::CreatePr {
            head: request.head.to_string(),
            base: request.base.to_string(),
            title: request.title.clone(),
            body: request.body.clone(),
        });
        if let Some(err) = state.failure(|f| match f {
            FailOn::CreatePr(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }

        state.branch(request.head.as_str())?;
        state.branch(request.base.as_str())?;

        let number = state.next_pr_number;
        state.next_pr_number += 1;
        let pr = PullRequest {
            number,
            url: format!("https://github.com/mock/repo/pull/{}", number),
            head: request.head.to_string(),
            base: request.base.to_string(),
            title: request.title,
        };
        state.prs.insert(number, pr.clone());
        Ok(pr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_branch() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let forge = MockForge::new();
        assert!(forge.read_file(&path("a.md"), &main_branch()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_ref_is_not_found() {
        let forge = MockForge::new();
        let other = BranchName::new("nope").unwrap();
        let result = forge.read_file(&path("a.md"), &other).await;
        assert!(matches!(result, Err(ForgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn blob_hash_is_stable_across_branches() {
        let forge = MockForge::new();
        forge.set_file("main", &path("a.md"), "same");
        let feature = BranchName::new("feature").unwrap();
        forge.create_branch(&main_branch(), &feature).await.unwrap();

        let on_main = forge.read_file(&path("a.md"), &main_branch()).await.unwrap().unwrap();
        let on_feature = forge
            .read_file(&path("a.md"), &feature)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(on_main.hash, on_feature.hash);
    }

    #[tokio::test]
    async fn commit_batch_is_atomic() {
        let forge = MockForge::new();
        forge.set_file("main", &path("keep.md"), "k");
        let before = forge.head("main").unwrap();

        let result = forge
            .commit_batch(
                &main_branch(),
                &[
                    FileChange {
                        path: path("new.md"),
                        change: Change::Create("n".into()),
                    },
                    FileChange {
                        path: path("missing.md"),
                        change: Change::Delete,
                    },
                ],
                "mixed",
            )
            .await;

        assert!(result.is_err());
        assert!(forge.file("main", &path("new.md")).is_none());
        assert_eq!(forge.head("main").unwrap(), before);
    }

    #[tokio::test]
    async fn commit_batch_applies_all_changes() {
        let forge = MockForge::new();
        forge.set_file("main", &path("old.md"), "o");
        forge.set_file("main", &path("edit.md"), "1");

        let commit = forge
            .commit_batch(
                &main_branch(),
                &[
                    FileChange {
                        path: path("old.md"),
                        change: Change::Delete,
                    },
                    FileChange {
                        path: path("edit.md"),
                        change: Change::Update("2".into()),
                    },
                    FileChange {
                        path: path("dir/new.md"),
                        change: Change::Create("n".into()),
                    },
                ],
                "batch",
            )
            .await
            .unwrap();

        assert_eq!(forge.head("main").unwrap(), commit);
        assert!(forge.file("main", &path("old.md")).is_none());
        assert_eq!(forge.file("main", &path("edit.md")).as_deref(), Some("2"));
        assert_eq!(forge.file("main", &path("dir/new.md")).as_deref(), Some("n"));
    }

    #[tokio::test]
    async fn read_tree_includes_directories_under_prefix() {
        let forge = MockForge::new();
        forge.set_file("main", &path("content/blog/a.md"), "a");
        forge.set_file("main", &path("README.md"), "r");

        let entries = forge
            .read_tree(&main_branch(), &ContentRoot::new("content").unwrap())
            .await
            .unwrap();
        let dirs: Vec<_> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Dir)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(dirs, vec!["content/blog"]);
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_branch_rejected() {
        let forge = MockForge::new();
        let feature = BranchName::new("feature").unwrap();
        forge.create_branch(&main_branch(), &feature).await.unwrap();
        let again = forge.create_branch(&main_branch(), &feature).await;
        assert!(matches!(again, Err(ForgeError::ApiError { status: 422, .. })));
    }

    #[tokio::test]
    async fn prs_get_sequential_numbers_and_merge() {
        let forge = MockForge::new();
        let feature = BranchName::new("feature").unwrap();
        forge.create_branch(&main_branch(), &feature).await.unwrap();
        forge.set_file("feature", &path("a.md"), "a");

        let pr = forge
            .create_pr(CreatePrRequest {
                head: feature.clone(),
                base: main_branch(),
                title: "Update".into(),
                body: None,
                draft: false,
            })
            .await
            .unwrap();
        assert_eq!(pr.number, 1);

        forge.merge_pr(pr.number).unwrap();
        assert_eq!(forge.file("main", &path("a.md")).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn fail_on_read_path_only_hits_that_path() {
        let forge = MockForge::new()
            .fail_on(FailOn::ReadPath(path("bad.md"), ForgeError::RateLimited));

        assert!(forge.read_file(&path("bad.md"), &main_branch()).await.is_err());
        assert!(forge.read_file(&path("good.md"), &main_branch()).await.is_ok());
    }

    #[tokio::test]
    async fn writes_are_counted() {
        let forge = MockForge::new();
        forge.read_file(&path("a.md"), &main_branch()).await.unwrap();
        assert_eq!(forge.write_count(), 0);

        forge
            .create_branch(&main_branch(), &BranchName::new("x").unwrap())
            .await
            .unwrap();
        assert_eq!(forge.write_count(), 1);
        assert_eq!(forge.operations().len(), 2);
    }
}
