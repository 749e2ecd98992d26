//! store::projects
//!
//! Project registry.

use chrono::Utc;

use super::{Database, StoreError};
use crate::core::model::Project;
use crate::core::types::{BranchName, ContentRoot, ProjectId, UserId};

/// Registry of projects.
pub struct ProjectStore<'a> {
    db: &'a Database,
}

impl<'a> ProjectStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a new project.
    pub fn create(
        &self,
        name: &str,
        owner: UserId,
        remote_url: &str,
        base_branch: BranchName,
        content_root: ContentRoot,
    ) -> Result<Project, StoreError> {
        if remote_url.trim().is_empty() {
            return Err(StoreError::Invalid("remote url cannot be empty".into()));
        }
        let project = Project {
            id: ProjectId::new(),
            name: name.trim().to_string(),
            owner,
            remote_url: remote_url.trim().to_string(),
            base_branch,
            content_root,
            created_at: Utc::now(),
        };
        self.db.transact(|t| {
            t.projects.insert(project.id, project.clone());
            Ok(project)
        })
    }

    pub fn get(&self, id: &ProjectId) -> Result<Project, StoreError> {
        self.db.read(|t| t.project(id).cloned())?
    }

    pub fn list(&self) -> Result<Vec<Project>, StoreError> {
        self.db.read(|t| t.projects.values().cloned().collect())
    }
}
