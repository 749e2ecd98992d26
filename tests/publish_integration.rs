//! End-to-end publish tests against the mock forge.
//!
//! Each test drives the engine through staging and drafting, then checks
//! both the local records and what reached the forge.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use inkpress::core::config::PublishSettings;
use inkpress::core::frontmatter::Frontmatter;
use inkpress::core::model::{BranchStatus, OpStatus, Project};
use inkpress::core::types::{BranchName, ContentRoot, RepoPath, UserId};
use inkpress::engine::{
    ConflictReason, Engine, EngineError, NewFile, PublishOutcome, PublishReceipt, PublishRequest,
};
use inkpress::forge::mock::{FailOn, MockForge, MockOperation};
use inkpress::forge::ForgeError;
use inkpress::store::Database;

struct Harness {
    forge: MockForge,
    engine: Engine,
    project: Project,
    owner: UserId,
}

fn harness() -> Harness {
    let forge = MockForge::new();
    let engine = Engine::new(
        Database::in_memory(),
        Arc::new(forge.clone()),
        PublishSettings::default(),
    );
    let owner = UserId::new("owner").unwrap();
    let project = engine
        .register_project(
            "Docs Site",
            owner.clone(),
            "https://github.com/acme/site",
            BranchName::new("main").unwrap(),
            ContentRoot::new("content").unwrap(),
        )
        .unwrap();
    Harness {
        forge,
        engine,
        project,
        owner,
    }
}

fn path(p: &str) -> RepoPath {
    RepoPath::new(p).unwrap()
}

/// Repository path of a document path under the `content` root.
fn remote(p: &str) -> RepoPath {
    RepoPath::new(format!("content/{p}")).unwrap()
}

fn new_file(body: &str) -> NewFile {
    NewFile {
        title: None,
        body: body.to_string(),
        frontmatter: Frontmatter::new(),
    }
}

impl Harness {
    async fn publish(&self) -> Result<PublishOutcome, EngineError> {
        self.engine
            .publish(&self.project.id, &self.owner, PublishRequest::default())
            .await
    }

    async fn publish_ok(&self) -> PublishReceipt {
        match self.publish().await.unwrap() {
            PublishOutcome::Published(receipt) => receipt,
            PublishOutcome::Conflicts { conflicts } => {
                panic!("unexpected conflicts: {conflicts:?}")
            }
        }
    }

    /// Put a file on `main` and pull it in as an in-sync document.
    async fn synced_doc(&self, doc_path: &str, content: &str) {
        self.forge.set_file("main", &remote(doc_path), content);
        self.engine
            .pull_remote(&self.project.id, path(doc_path))
            .await
            .unwrap();
    }

    fn edit(&self, doc_path: &str, body: &str) {
        self.engine
            .save_draft(
                &self.project.id,
                path(doc_path),
                &self.owner,
                body.to_string(),
                Frontmatter::new(),
                None,
            )
            .unwrap();
    }

    fn commit_messages(&self) -> Vec<String> {
        self.forge
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::CommitBatch { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

// ===========================================================================
// Staged creates
// ===========================================================================

mod create_tests {
    use super::*;

    #[tokio::test]
    async fn create_on_free_path_opens_pr_and_commits_op() {
        let h = harness();
        let op = h
            .engine
            .stage_create(&h.project.id, path("blog/a.mdx"), &h.owner, new_file("Hello"))
            .unwrap();

        let receipt = h.publish_ok().await;

        assert_eq!(receipt.files, vec![remote("blog/a.mdx")]);
        assert_eq!(receipt.summary.created, 1);
        assert_eq!(receipt.summary.total(), 1);

        let committed = h.engine.db().ops().get(&op.id).unwrap();
        assert_eq!(committed.status, OpStatus::Committed);
        assert_eq!(committed.commit_hash.as_ref(), Some(&receipt.commit_hash));

        let pr = h.forge.pr(receipt.pr_number).unwrap();
        assert_eq!(pr.base, "main");
        assert_eq!(pr.head, receipt.branch.as_str());
        assert_eq!(pr.title, "Content update");

        let content = h
            .forge
            .file(receipt.branch.as_str(), &remote("blog/a.mdx"))
            .unwrap();
        assert!(content.contains("Hello"));
        assert!(h.forge.file("main", &remote("blog/a.mdx")).is_none());

        let branch = h.engine.db().branches().active(&h.project.id).unwrap().unwrap();
        assert_eq!(branch.pr_number, Some(receipt.pr_number));
        assert_eq!(branch.last_commit_hash, Some(receipt.commit_hash));
        assert!(branch.committed_file_paths.contains(&remote("blog/a.mdx")));
    }

    #[tokio::test]
    async fn create_on_taken_path_reports_conflict_and_writes_nothing() {
        let h = harness();
        h.forge.set_file("main", &remote("blog/a.mdx"), "already here");
        let op = h
            .engine
            .stage_create(&h.project.id, path("blog/a.mdx"), &h.owner, new_file("Hello"))
            .unwrap();

        let outcome = h.publish().await.unwrap();

        let PublishOutcome::Conflicts { conflicts } = outcome else {
            panic!("expected conflicts, got {outcome:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, path("blog/a.mdx"));
        assert_eq!(
            conflicts[0].reason,
            ConflictReason::AlreadyExists {
                current: MockForge::blob_hash("already here")
            }
        );

        assert_eq!(h.forge.write_count(), 0);
        assert!(h.engine.db().branches().list(&h.project.id).unwrap().is_empty());
        assert!(h.engine.db().ops().get(&op.id).unwrap().is_pending());
    }

    #[tokio::test]
    async fn create_uses_edited_draft_content() {
        let h = harness();
        h.engine
            .stage_create(&h.project.id, path("a.md"), &h.owner, new_file("initial"))
            .unwrap();
        h.edit("a.md", "edited before publish");

        let receipt = h.publish_ok().await;

        let content = h.forge.file(receipt.branch.as_str(), &remote("a.md")).unwrap();
        assert!(content.contains("edited before publish"));
        assert!(!content.contains("initial"));
        // The create carries the draft; it is not pushed a second time.
        assert_eq!(receipt.files.len(), 1);
    }
}

// ===========================================================================
// Staged deletes
// ===========================================================================

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn delete_with_stale_hash_names_both_hashes() {
        let h = harness();
        h.forge.set_file("main", &remote("docs/x.md"), "v1");
        h.engine
            .stage_delete(
                &h.project.id,
                path("docs/x.md"),
                &h.owner,
                Some(MockForge::blob_hash("v1")),
            )
            .unwrap();
        h.forge.set_file("main", &remote("docs/x.md"), "v2");

        let outcome = h.publish().await.unwrap();

        let PublishOutcome::Conflicts { conflicts } = outcome else {
            panic!("expected conflicts, got {outcome:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].reason,
            ConflictReason::ModifiedSinceStaging {
                expected: MockForge::blob_hash("v1"),
                current: Some(MockForge::blob_hash("v2")),
            }
        );
        let text = conflicts[0].to_string();
        assert!(text.contains(MockForge::blob_hash("v1").short(12)));
        assert!(text.contains(MockForge::blob_hash("v2").short(12)));
        assert_eq!(h.forge.write_count(), 0);
    }

    #[tokio::test]
    async fn delete_with_current_hash_removes_file_on_branch() {
        let h = harness();
        h.synced_doc("docs/x.md", "v1").await;
        h.engine
            .stage_delete(&h.project.id, path("docs/x.md"), &h.owner, None)
            .unwrap();

        let receipt = h.publish_ok().await;

        assert_eq!(receipt.summary.deleted, 1);
        assert!(h.forge.file(receipt.branch.as_str(), &remote("docs/x.md")).is_none());
        assert!(h.forge.file("main", &remote("docs/x.md")).is_some());
        assert_eq!(h.commit_messages(), vec!["Content update: 1 deleted".to_string()]);
    }

    #[tokio::test]
    async fn delete_of_vanished_file_conflicts() {
        let h = harness();
        h.synced_doc("docs/x.md", "v1").await;
        h.engine
            .stage_delete(&h.project.id, path("docs/x.md"), &h.owner, None)
            .unwrap();
        h.forge.remove_file("main", &remote("docs/x.md"));

        let outcome = h.publish().await.unwrap();

        let PublishOutcome::Conflicts { conflicts } = outcome else {
            panic!("expected conflicts, got {outcome:?}");
        };
        assert_eq!(
            conflicts[0].reason,
            ConflictReason::ModifiedSinceStaging {
                expected: MockForge::blob_hash("v1"),
                current: None,
            }
        );
        assert!(conflicts[0].to_string().contains("current=deleted"));
    }
}

// ===========================================================================
// Dirty drafts
// ===========================================================================

mod draft_tests {
    use super::*;

    #[tokio::test]
    async fn only_the_stale_draft_conflicts() {
        let h = harness();
        h.synced_doc("fresh.md", "fresh v1").await;
        h.synced_doc("stale.md", "stale v1").await;
        h.edit("fresh.md", "fresh v2");
        h.edit("stale.md", "stale v2");
        h.forge.set_file("main", &remote("stale.md"), "changed elsewhere");

        let outcome = h.publish().await.unwrap();

        let PublishOutcome::Conflicts { conflicts } = outcome else {
            panic!("expected conflicts, got {outcome:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, path("stale.md"));
        assert_eq!(
            conflicts[0].reason,
            ConflictReason::ModifiedSinceSync {
                expected: MockForge::blob_hash("stale v1"),
                current: Some(MockForge::blob_hash("changed elsewhere")),
            }
        );
        assert_eq!(h.forge.write_count(), 0);

        // Take the remote version as the new base, then edit again.
        h.engine
            .pull_remote(&h.project.id, path("stale.md"))
            .await
            .unwrap();
        h.edit("stale.md", "stale v3");

        let receipt = h.publish_ok().await;
        assert_eq!(receipt.summary.updated, 2);
        assert_eq!(receipt.files, vec![remote("fresh.md"), remote("stale.md")]);
    }

    #[tokio::test]
    async fn remote_hash_matches_pushed_blob() {
        let h = harness();
        h.synced_doc("a.md", "v1").await;
        h.edit("a.md", "v2");

        let receipt = h.publish_ok().await;

        let pushed = h.forge.file(receipt.branch.as_str(), &remote("a.md")).unwrap();
        let doc = h.engine.document_at(&h.project.id, &path("a.md")).unwrap();
        assert_eq!(doc.remote_hash, Some(MockForge::blob_hash(&pushed)));
        assert_ne!(doc.remote_hash, Some(MockForge::blob_hash("v1")));
        assert!(!doc.is_dirty());
    }

    #[tokio::test]
    async fn never_synced_draft_is_pushed_as_create() {
        let h = harness();
        h.edit("new.md", "first words");

        let receipt = h.publish_ok().await;

        assert_eq!(receipt.summary.created, 1);
        let doc = h.engine.document_at(&h.project.id, &path("new.md")).unwrap();
        assert!(doc.remote_hash.is_some());
    }

    #[tokio::test]
    async fn first_edit_over_existing_remote_file_conflicts() {
        let h = harness();
        h.forge.set_file("main", &remote("a.md"), "upstream text");
        h.edit("a.md", "mine");

        let outcome = h.publish().await.unwrap();

        let PublishOutcome::Conflicts { conflicts } = outcome else {
            panic!("expected conflicts, got {outcome:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].reason,
            ConflictReason::AlreadyExists {
                current: MockForge::blob_hash("upstream text")
            }
        );
        assert_eq!(h.forge.write_count(), 0);
        assert_eq!(
            h.forge.file("main", &remote("a.md")).as_deref(),
            Some("upstream text")
        );

        let doc = h
            .engine
            .pull_remote(&h.project.id, path("a.md"))
            .await
            .unwrap();
        assert_eq!(doc.body.as_deref(), Some("mine"));
        assert_eq!(doc.remote_hash, Some(MockForge::blob_hash("upstream text")));
        assert!(doc.is_dirty());

        let receipt = h.publish_ok().await;
        assert_eq!(receipt.summary.updated, 1);
        assert_eq!(receipt.summary.created, 0);
        let pushed = h.forge.file(receipt.branch.as_str(), &remote("a.md")).unwrap();
        assert!(pushed.contains("mine"));
    }

    #[tokio::test]
    async fn pull_of_missing_remote_file_is_not_found() {
        let h = harness();
        let result = h.engine.pull_remote(&h.project.id, path("nope.md")).await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
        assert!(h.engine.document_at(&h.project.id, &path("nope.md")).is_err());
    }

    #[tokio::test]
    async fn clean_documents_are_nothing_to_publish() {
        let h = harness();
        h.synced_doc("a.md", "v1").await;
        let before = h.forge.operations().len();

        let result = h.publish().await;
        assert!(matches!(result, Err(EngineError::NothingToPublish)));
        assert_eq!(h.forge.operations().len(), before);
    }
}

// ===========================================================================
// Branch lifecycle
// ===========================================================================

mod branch_tests {
    use super::*;

    #[tokio::test]
    async fn later_publishes_reuse_the_active_branch() {
        let h = harness();
        h.edit("a.md", "one");
        let first = h.publish_ok().await;

        h.edit("b.md", "two");
        let second = h.publish_ok().await;

        assert_eq!(first.branch, second.branch);
        assert_eq!(first.pr_number, second.pr_number);
        assert_ne!(first.commit_hash, second.commit_hash);
        assert_eq!(h.forge.pr_count(), 1);

        let branches = h.engine.db().branches().list(&h.project.id).unwrap();
        assert_eq!(branches.len(), 1);
        assert!(branches[0].committed_file_paths.contains(&remote("a.md")));
        assert!(branches[0].committed_file_paths.contains(&remote("b.md")));
    }

    #[tokio::test]
    async fn closed_branch_is_replaced_on_next_publish() {
        let h = harness();
        h.edit("a.md", "one");
        let first = h.publish_ok().await;
        h.engine.on_closed(first.pr_number).unwrap();

        h.edit("b.md", "two");
        let second = h.publish_ok().await;

        assert_ne!(first.branch, second.branch);
        assert_ne!(first.pr_number, second.pr_number);
        let branches = h.engine.db().branches().list(&h.project.id).unwrap();
        let active: Vec<_> = branches.iter().filter(|b| b.is_active()).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].branch_name, second.branch);
    }

    #[tokio::test]
    async fn failed_branch_creation_leaves_no_record() {
        let h = harness();
        h.edit("a.md", "one");
        let _ = h
            .forge
            .clone()
            .fail_on(FailOn::CreateBranch(ForgeError::RateLimited));

        let result = h.publish().await;
        assert!(matches!(
            result,
            Err(EngineError::Forge(ForgeError::RateLimited))
        ));
        assert!(h.engine.db().branches().list(&h.project.id).unwrap().is_empty());

        h.forge.clear_fail_on();
        let receipt = h.publish_ok().await;
        assert!(h.forge.branch_exists(receipt.branch.as_str()));
    }

    #[tokio::test]
    async fn unconfirmed_reservation_makes_publish_busy() {
        let h = harness();
        h.edit("a.md", "one");
        let (reserved, created) = h
            .engine
            .db()
            .branches()
            .get_or_create_active(&h.project.id, "inkpress")
            .unwrap();
        assert!(created);

        let result = h.publish().await;

        assert!(matches!(result, Err(EngineError::Busy(_))));
        assert_eq!(h.forge.write_count(), 0);
        assert_eq!(h.engine.db().branches().list(&h.project.id).unwrap().len(), 1);
        assert!(!h.forge.branch_exists(reserved.branch_name.as_str()));
    }

    #[tokio::test]
    async fn stale_reservation_is_replaced() {
        let h = harness();
        h.edit("a.md", "one");
        let (reserved, _) = h
            .engine
            .db()
            .branches()
            .get_or_create_active(&h.project.id, "inkpress")
            .unwrap();
        h.engine
            .db()
            .transact(|t| {
                let branch = t.branches.get_mut(&reserved.id).unwrap();
                branch.updated_at = Utc::now() - Duration::minutes(30);
                Ok(())
            })
            .unwrap();

        let receipt = h.publish_ok().await;

        assert_ne!(receipt.branch, reserved.branch_name);
        assert!(h.forge.branch_exists(receipt.branch.as_str()));
        let branches = h.engine.db().branches().list(&h.project.id).unwrap();
        assert_eq!(branches.len(), 1);
        assert!(branches[0].remote_created);
    }

    #[tokio::test]
    async fn failed_commit_keeps_ops_pending() {
        let h = harness();
        let op = h
            .engine
            .stage_create(&h.project.id, path("a.md"), &h.owner, new_file("A"))
            .unwrap();
        let _ = h.forge.clone().fail_on(FailOn::CommitBatch(ForgeError::NetworkError(
            "connection reset".into(),
        )));

        let result = h.publish().await;

        assert!(matches!(result, Err(EngineError::Forge(_))));
        assert!(h.engine.db().ops().get(&op.id).unwrap().is_pending());
        let branch = h.engine.db().branches().active(&h.project.id).unwrap().unwrap();
        assert!(branch.last_commit_hash.is_none());
    }

    #[tokio::test]
    async fn pr_failure_after_commit_is_retried_without_recommitting() {
        let h = harness();
        let op = h
            .engine
            .stage_create(&h.project.id, path("a.md"), &h.owner, new_file("A"))
            .unwrap();
        let _ = h.forge.clone().fail_on(FailOn::CreatePr(ForgeError::RateLimited));

        let result = h.publish().await;
        assert!(matches!(
            result,
            Err(EngineError::Forge(ForgeError::RateLimited))
        ));
        let committed = h.engine.db().ops().get(&op.id).unwrap();
        assert_eq!(committed.status, OpStatus::Committed);
        let branch = h.engine.db().branches().active(&h.project.id).unwrap().unwrap();
        assert!(branch.pr_number.is_none());
        let commit = branch.last_commit_hash.clone().unwrap();

        h.forge.clear_fail_on();
        let receipt = h.publish_ok().await;

        assert_eq!(receipt.commit_hash, commit);
        assert_eq!(receipt.files, vec![remote("a.md")]);
        assert_eq!(h.commit_messages().len(), 1);
        assert_eq!(h.forge.pr_count(), 1);
        let branch = h.engine.db().branches().get(&branch.id).unwrap();
        assert_eq!(branch.pr_number, Some(receipt.pr_number));
        assert_eq!(branch.status, BranchStatus::Active);
    }
}

// ===========================================================================
// Preconditions
// ===========================================================================

mod precondition_tests {
    use super::*;

    #[tokio::test]
    async fn non_owner_is_rejected() {
        let h = harness();
        h.edit("a.md", "one");
        let stranger = UserId::new("stranger").unwrap();

        let result = h
            .engine
            .publish(&h.project.id, &stranger, PublishRequest::default())
            .await;

        assert!(matches!(result, Err(EngineError::Unauthorized(_))));
        assert!(h.forge.operations().is_empty());
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let h = harness();
        h.edit("a.md", "one");

        let result = h
            .engine
            .publish(
                &h.project.id,
                &h.owner,
                PublishRequest {
                    title: Some("   ".into()),
                    description: None,
                },
            )
            .await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_project_has_nothing_to_publish() {
        let h = harness();
        assert!(matches!(
            h.publish().await,
            Err(EngineError::NothingToPublish)
        ));
    }

    #[tokio::test]
    async fn read_failure_aborts_before_any_write() {
        let h = harness();
        h.synced_doc("a.md", "v1").await;
        h.edit("a.md", "v2");
        let _ = h
            .forge
            .clone()
            .fail_on(FailOn::ReadFile(ForgeError::NetworkError("timeout".into())));

        let result = h.publish().await;

        assert!(matches!(result, Err(EngineError::Forge(_))));
        assert_eq!(h.forge.write_count(), 0);
    }

    #[tokio::test]
    async fn custom_title_and_description_reach_the_pr() {
        let h = harness();
        h.edit("a.md", "one");

        let outcome = h
            .engine
            .publish(
                &h.project.id,
                &h.owner,
                PublishRequest {
                    title: Some("Spring launch".into()),
                    description: Some("Posts for the launch".into()),
                },
            )
            .await
            .unwrap();

        let PublishOutcome::Published(receipt) = outcome else {
            panic!("expected a publish");
        };
        let pr = h.forge.pr(receipt.pr_number).unwrap();
        assert_eq!(pr.title, "Spring launch");
        let body = h.forge.operations().into_iter().find_map(|op| match op {
            MockOperation::CreatePr { body, .. } => body,
            _ => None,
        });
        assert_eq!(body.as_deref(), Some("Posts for the launch"));
    }

    #[tokio::test]
    async fn offline_engine_cannot_publish() {
        let engine = Engine::offline(Database::in_memory(), PublishSettings::default());
        let owner = UserId::new("owner").unwrap();
        let project = engine
            .register_project(
                "docs",
                owner.clone(),
                "https://github.com/acme/site",
                BranchName::new("main").unwrap(),
                ContentRoot::repo_root(),
            )
            .unwrap();
        engine
            .save_draft(
                &project.id,
                path("a.md"),
                &owner,
                "one".into(),
                Frontmatter::new(),
                None,
            )
            .unwrap();

        let result = engine
            .publish(&project.id, &owner, PublishRequest::default())
            .await;
        assert!(matches!(result, Err(EngineError::Offline)));
    }
}

// ===========================================================================
// Engines on one database file
// ===========================================================================

mod shared_file_tests {
    use super::*;

    fn engine_at(db_path: &Path, forge: &MockForge) -> Engine {
        Engine::new(
            Database::open(db_path).unwrap(),
            Arc::new(forge.clone()),
            PublishSettings::default(),
        )
    }

    #[tokio::test]
    async fn engines_share_pending_ops_and_the_branch() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("db.json");
        let forge = MockForge::new();
        let a = engine_at(&db_path, &forge);
        let b = engine_at(&db_path, &forge);
        let owner = UserId::new("owner").unwrap();
        let project = a
            .register_project(
                "Docs Site",
                owner.clone(),
                "https://github.com/acme/site",
                BranchName::new("main").unwrap(),
                ContentRoot::new("content").unwrap(),
            )
            .unwrap();

        a.stage_create(&project.id, path("a.md"), &owner, new_file("from a"))
            .unwrap();
        assert_eq!(b.list_pending(&project.id).unwrap().len(), 1);
        assert!(matches!(
            b.stage_create(&project.id, path("a.md"), &owner, new_file("from b")),
            Err(EngineError::Validation(_))
        ));

        let receipt = match a
            .publish(&project.id, &owner, PublishRequest::default())
            .await
            .unwrap()
        {
            PublishOutcome::Published(receipt) => receipt,
            other => panic!("expected a publish, got {other:?}"),
        };
        assert!(matches!(
            b.publish(&project.id, &owner, PublishRequest::default()).await,
            Err(EngineError::NothingToPublish)
        ));

        b.save_draft(
            &project.id,
            path("b.md"),
            &owner,
            "from b".to_string(),
            Frontmatter::new(),
            None,
        )
        .unwrap();
        let second = match b
            .publish(&project.id, &owner, PublishRequest::default())
            .await
            .unwrap()
        {
            PublishOutcome::Published(receipt) => receipt,
            other => panic!("expected a publish, got {other:?}"),
        };

        assert_eq!(second.branch, receipt.branch);
        assert_eq!(second.pr_number, receipt.pr_number);
        assert_eq!(forge.pr_count(), 1);
        let reopened = Database::open(&db_path).unwrap();
        assert_eq!(reopened.branches().list(&project.id).unwrap().len(), 1);
    }
}
