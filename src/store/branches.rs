//! store::branches
//!
//! Publish branch records.
//!
//! A project has at most one `active` branch. [`BranchStore::get_or_create_active`]
//! reserves the record in a single transaction so concurrent first
//! publishes agree on one branch; the loser of a race sees the winner's
//! record instead of creating a second one.

use std::collections::BTreeSet;

use chrono::Utc;

use super::{Database, StoreError};
use crate::core::model::{BranchStatus, PublishBranch};
use crate::core::naming::publish_branch_name;
use crate::core::types::{BranchId, CommitHash, ProjectId, RepoPath};

/// Bookkeeping recorded after a commit. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct BranchPatch {
    pub last_commit_hash: Option<CommitHash>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    /// Paths added to `committed_file_paths`.
    pub committed_paths: BTreeSet<RepoPath>,
}

/// Store for publish branches.
pub struct BranchStore<'a> {
    db: &'a Database,
}

impl<'a> BranchStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// The project's active branch, if any.
    pub fn active(&self, project: &ProjectId) -> Result<Option<PublishBranch>, StoreError> {
        self.db.read(|t| {
            t.branches
                .values()
                .find(|b| &b.project_id == project && b.is_active())
                .cloned()
        })
    }

    /// Return the active branch, reserving a new record if there is none.
    ///
    /// The boolean is `true` when the record was created by this call; the
    /// caller must then create the remote branch and [`confirm`] the record,
    /// or [`remove`] it if that fails.
    ///
    /// [`confirm`]: BranchStore::confirm
    /// [`remove`]: BranchStore::remove
    pub fn get_or_create_active(
        &self,
        project: &ProjectId,
        branch_prefix: &str,
    ) -> Result<(PublishBranch, bool), StoreError> {
        self.db.transact(|t| {
            if let Some(existing) = t
                .branches
                .values()
                .find(|b| &b.project_id == project && b.is_active())
            {
                return Ok((existing.clone(), false));
            }

            let project = t.project(project)?.clone();
            let id = BranchId::new();
            let now = Utc::now();
            let branch_name =
                publish_branch_name(branch_prefix, &project.name, &project.id, &id, now)
                    .map_err(|e| StoreError::Invalid(e.to_string()))?;

            let branch = PublishBranch {
                id,
                project_id: project.id,
                branch_name,
                base_branch: project.base_branch.clone(),
                pr_number: None,
                pr_url: None,
                status: BranchStatus::Active,
                last_commit_hash: None,
                committed_file_paths: BTreeSet::new(),
                remote_created: false,
                created_at: now,
                updated_at: now,
            };
            t.branches.insert(id, branch.clone());
            Ok((branch, true))
        })
    }

    /// Mark a reserved branch as existing on the host.
    pub fn confirm(&self, id: &BranchId) -> Result<PublishBranch, StoreError> {
        self.db.transact(|t| {
            let branch = t
                .branches
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("branch", id))?;
            branch.remote_created = true;
            branch.updated_at = Utc::now();
            Ok(branch.clone())
        })
    }

    /// Delete a branch record.
    pub fn remove(&self, id: &BranchId) -> Result<(), StoreError> {
        self.db.transact(|t| {
            t.branches
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("branch", id))
        })
    }

    pub fn get(&self, id: &BranchId) -> Result<PublishBranch, StoreError> {
        self.db.read(|t| {
            t.branches
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("branch", id))
        })?
    }

    /// Branch whose pull request has the given number.
    ///
    /// When several records share a number, the active one wins, then the
    /// most recently updated.
    pub fn find_by_pr(&self, pr_number: u64) -> Result<Option<PublishBranch>, StoreError> {
        self.db.read(|t| {
            t.branches
                .values()
                .filter(|b| b.pr_number == Some(pr_number))
                .max_by_key(|b| (b.is_active(), b.updated_at))
                .cloned()
        })
    }

    /// Branches of a project, newest first.
    pub fn list(&self, project: &ProjectId) -> Result<Vec<PublishBranch>, StoreError> {
        self.db.read(|t| {
            let mut branches: Vec<PublishBranch> = t
                .branches
                .values()
                .filter(|b| &b.project_id == project)
                .cloned()
                .collect();
            branches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            branches
        })
    }

    pub fn update(&self, id: &BranchId, patch: BranchPatch) -> Result<PublishBranch, StoreError> {
        self.db.transact(|t| {
            let branch = t
                .branches
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("branch", id))?;
            if let Some(hash) = patch.last_commit_hash {
                branch.last_commit_hash = Some(hash);
            }
            if let Some(number) = patch.pr_number {
                branch.pr_number = Some(number);
            }
            if let Some(url) = patch.pr_url {
                branch.pr_url = Some(url);
            }
            branch.committed_file_paths.extend(patch.committed_paths);
            branch.updated_at = Utc::now();
            Ok(branch.clone())
        })
    }

    pub fn set_status(
        &self,
        id: &BranchId,
        status: BranchStatus,
    ) -> Result<PublishBranch, StoreError> {
        self.db.transact(|t| {
            let branch = t
                .branches
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("branch", id))?;
            branch.status = status;
            branch.updated_at = Utc::now();
            Ok(branch.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BranchName, ContentRoot, UserId};
    use std::sync::Arc;
    use std::thread;

    fn setup() -> (Database, ProjectId) {
        let db = Database::in_memory();
        let project = db
            .projects()
            .create(
                "Docs Site",
                UserId::new("owner").unwrap(),
                "https://github.com/acme/docs",
                BranchName::new("main").unwrap(),
                ContentRoot::repo_root(),
            )
            .unwrap();
        (db, project.id)
    }

    #[test]
    fn get_or_create_reuses_active_branch() {
        let (db, project) = setup();
        let (first, created) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        assert!(created);
        assert!(first.branch_name.as_str().starts_with("inkpress/docs-site-"));
        assert_eq!(first.base_branch.as_str(), "main");

        let (second, created) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn concurrent_get_or_create_yields_one_active_branch() {
        let (db, project) = setup();
        let db = Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    db.branches()
                        .get_or_create_active(&project, "inkpress")
                        .unwrap()
                        .0
                        .id
                })
            })
            .collect();
        let ids: BTreeSet<BranchId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(ids.len(), 1);
        assert_eq!(db.branches().list(&project).unwrap().len(), 1);
    }

    #[test]
    fn merged_branch_makes_room_for_new_one() {
        let (db, project) = setup();
        let (first, _) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        db.branches().set_status(&first.id, BranchStatus::Merged).unwrap();

        let (second, created) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        assert!(created);
        assert_ne!(first.id, second.id);
        assert_ne!(first.branch_name, second.branch_name);
    }

    #[test]
    fn update_unions_committed_paths() {
        let (db, project) = setup();
        let (branch, _) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        let path = |p: &str| RepoPath::new(p).unwrap();

        db.branches()
            .update(
                &branch.id,
                BranchPatch {
                    pr_number: Some(7),
                    committed_paths: [path("a.md"), path("b.md")].into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let updated = db
            .branches()
            .update(
                &branch.id,
                BranchPatch {
                    committed_paths: [path("b.md"), path("c.md")].into(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.pr_number, Some(7));
        assert_eq!(updated.committed_file_paths.len(), 3);
        assert_eq!(db.branches().find_by_pr(7).unwrap().unwrap().id, branch.id);
        assert!(db.branches().find_by_pr(8).unwrap().is_none());
    }

    #[test]
    fn reservation_is_unconfirmed_until_confirmed() {
        let (db, project) = setup();
        let (branch, _) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        assert!(!branch.remote_created);

        let confirmed = db.branches().confirm(&branch.id).unwrap();
        assert!(confirmed.remote_created);
        let (again, created) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        assert!(!created);
        assert!(again.remote_created);
    }

    #[test]
    fn records_without_confirmation_flag_load_as_created() {
        let (db, project) = setup();
        let (branch, _) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        let mut value = serde_json::to_value(&branch).unwrap();
        value.as_object_mut().unwrap().remove("remote_created");

        let loaded: PublishBranch = serde_json::from_value(value).unwrap();
        assert!(loaded.remote_created);
    }

    #[test]
    fn remove_releases_reservation() {
        let (db, project) = setup();
        let (branch, _) = db.branches().get_or_create_active(&project, "inkpress").unwrap();
        db.branches().remove(&branch.id).unwrap();
        assert!(db.branches().active(&project).unwrap().is_none());
    }
}
