//! Property-based tests for core types and the tree overlay.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeSet;

use chrono::Utc;
use proptest::prelude::*;

use inkpress::core::frontmatter::{FrontBlockCodec, Frontmatter, YamlFrontBlock};
use inkpress::core::model::{ExplorerOp, OpKind, OpStatus};
use inkpress::core::naming::{publish_branch_name, slugify};
use inkpress::core::types::{BranchId, ContentRoot, OpId, ProjectId, RepoPath, UserId};
use inkpress::engine::overlay::{build_tree, overlay};
use inkpress::engine::TreeNode;
use inkpress::forge::mock::MockForge;
use inkpress::forge::{EntryKind, TreeEntry};

/// Strategy for one directory component.
fn dir_component() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,5}"
}

/// Strategy for document paths: zero to three directories, then a
/// `.md` file. No file path is ever a directory of another.
fn doc_path() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(dir_component(), 0..3),
        "[a-z][a-z0-9]{0,5}",
    )
        .prop_map(|(dirs, stem)| {
            let mut parts = dirs;
            parts.push(format!("{stem}.md"));
            parts.join("/")
        })
}

fn content_root() -> impl Strategy<Value = ContentRoot> {
    prop_oneof![
        Just(ContentRoot::repo_root()),
        prop::collection::vec(dir_component(), 1..3)
            .prop_map(|parts| ContentRoot::new(parts.join("/")).unwrap()),
    ]
}

fn pending(path: RepoPath, kind: OpKind) -> ExplorerOp {
    let now = Utc::now();
    ExplorerOp {
        id: OpId::new(),
        project_id: ProjectId::new(),
        file_path: path,
        kind,
        status: OpStatus::Pending,
        commit_hash: None,
        created_by: UserId::new("prop").unwrap(),
        created_at: now,
        updated_at: now,
    }
}

fn create(path: RepoPath) -> ExplorerOp {
    pending(
        path,
        OpKind::Create {
            title: "t".into(),
            initial_body: String::new(),
            initial_frontmatter: Frontmatter::new(),
        },
    )
}

/// Remote listing for document paths under `root`, directories included.
fn listing(paths: &BTreeSet<String>, root: &ContentRoot) -> Vec<TreeEntry> {
    let mut dirs = BTreeSet::new();
    let mut entries = Vec::new();
    for p in paths {
        let full = root.to_repo_path(&RepoPath::new(p.as_str()).unwrap());
        let mut parent = full.parent();
        while let Some(dir) = parent {
            if root.strip(&dir).is_none() {
                break;
            }
            parent = dir.parent();
            dirs.insert(dir);
        }
        entries.push(TreeEntry {
            hash: Some(MockForge::blob_hash(p)),
            path: full,
            kind: EntryKind::File,
        });
    }
    entries.extend(dirs.into_iter().map(|path| TreeEntry {
        path,
        kind: EntryKind::Dir,
        hash: None,
    }));
    entries
}

/// Every file node, depth first.
fn files(nodes: &[TreeNode]) -> Vec<&TreeNode> {
    let mut out = Vec::new();
    for node in nodes {
        if node.is_dir() {
            out.extend(files(&node.children));
        } else {
            out.push(node);
        }
    }
    out
}

fn is_sorted(nodes: &[TreeNode]) -> bool {
    nodes
        .windows(2)
        .all(|w| (!w[0].is_dir(), &w[0].name) <= (!w[1].is_dir(), &w[1].name))
        && nodes.iter().all(|n| is_sorted(&n.children))
}

// ===========================================================================
// Paths
// ===========================================================================

mod path_tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_paths_are_valid(p in doc_path()) {
            let path = RepoPath::new(p.as_str()).unwrap();
            let rebuilt: Vec<&str> = path.components().collect();
            prop_assert_eq!(rebuilt.join("/"), p);
        }

        #[test]
        fn parent_is_an_ancestor(p in doc_path()) {
            let path = RepoPath::new(p.as_str()).unwrap();
            if let Some(parent) = path.parent() {
                prop_assert!(path.starts_with(&parent));
                prop_assert_eq!(
                    format!("{}/{}", parent, path.file_name()),
                    p
                );
            } else {
                prop_assert_eq!(path.file_name(), p.as_str());
            }
        }

        #[test]
        fn content_root_strip_inverts_join(root in content_root(), p in doc_path()) {
            let doc = RepoPath::new(p).unwrap();
            let full = root.to_repo_path(&doc);
            prop_assert_eq!(root.strip(&full), Some(doc));
        }

        #[test]
        fn traversal_is_always_rejected(
            before in prop::collection::vec(dir_component(), 0..3),
            after in prop::collection::vec(dir_component(), 0..3),
            dots in prop_oneof![Just(".."), Just(".")],
        ) {
            let mut parts = before;
            parts.push(dots.to_string());
            parts.extend(after);
            prop_assert!(RepoPath::new(parts.join("/")).is_err());
        }
    }
}

// ===========================================================================
// Naming
// ===========================================================================

mod naming_tests {
    use super::*;

    proptest! {
        #[test]
        fn slugs_are_branch_safe(text in ".{0,80}") {
            let slug = slugify(&text);
            prop_assert!(slug.len() <= 40);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slugify_is_idempotent(text in "[A-Za-z0-9 _#-]{0,60}") {
            let once = slugify(&text);
            prop_assert_eq!(slugify(&once), once);
        }

        #[test]
        fn branch_names_are_valid_for_any_project_name(name in ".{0,60}") {
            let branch = publish_branch_name(
                "inkpress",
                &name,
                &ProjectId::new(),
                &BranchId::new(),
                Utc::now(),
            );
            prop_assert!(branch.is_ok());
            prop_assert!(branch.unwrap().as_str().starts_with("inkpress/"));
        }
    }
}

// ===========================================================================
// Tree overlay
// ===========================================================================

mod overlay_tests {
    use super::*;

    proptest! {
        #[test]
        fn no_ops_leaves_the_tree_unchanged(
            root in content_root(),
            paths in prop::collection::btree_set(doc_path(), 0..12),
        ) {
            let remote = build_tree(&listing(&paths, &root), &root);
            prop_assert_eq!(overlay(&remote, &[], &root), remote.clone());
            prop_assert!(is_sorted(&remote));
            prop_assert_eq!(files(&remote).len(), paths.len());
        }

        #[test]
        fn creates_add_new_files_and_keep_remote_ones(
            root in content_root(),
            existing in prop::collection::btree_set(doc_path(), 0..10),
            created in prop::collection::btree_set(doc_path(), 1..6),
        ) {
            let remote = build_tree(&listing(&existing, &root), &root);
            let ops: Vec<ExplorerOp> = created
                .iter()
                .map(|p| create(RepoPath::new(p.as_str()).unwrap()))
                .collect();

            let tree = overlay(&remote, &ops, &root);

            prop_assert!(is_sorted(&tree));
            let leaves = files(&tree);
            prop_assert_eq!(leaves.len(), existing.union(&created).count());
            for leaf in leaves {
                let doc = root.strip(&leaf.path).unwrap();
                let fresh = !existing.contains(doc.as_str());
                prop_assert_eq!(leaf.is_new, fresh);
                prop_assert!(!leaf.is_deleted);
                if fresh {
                    prop_assert!(created.contains(doc.as_str()));
                    prop_assert!(leaf.hash.is_none());
                }
            }
            // The input tree is untouched.
            prop_assert!(files(&remote).iter().all(|n| !n.is_new));
        }

        #[test]
        fn deletes_mark_exactly_their_targets(
            root in content_root(),
            existing in prop::collection::btree_set(doc_path(), 1..10),
            pick in any::<prop::sample::Index>(),
        ) {
            let remote = build_tree(&listing(&existing, &root), &root);
            let target = existing.iter().nth(pick.index(existing.len())).unwrap().clone();
            let ops = vec![pending(
                RepoPath::new(target.as_str()).unwrap(),
                OpKind::Delete { previous_hash: None },
            )];

            let tree = overlay(&remote, &ops, &root);

            for leaf in files(&tree) {
                let doc = root.strip(&leaf.path).unwrap();
                prop_assert_eq!(leaf.is_deleted, doc.as_str() == target);
            }
        }

        #[test]
        fn settled_ops_are_ignored(
            root in content_root(),
            created in prop::collection::btree_set(doc_path(), 1..5),
        ) {
            let ops: Vec<ExplorerOp> = created
                .iter()
                .map(|p| {
                    let mut op = create(RepoPath::new(p.as_str()).unwrap());
                    op.status = OpStatus::Committed;
                    op
                })
                .collect();

            prop_assert!(overlay(&[], &ops, &root).is_empty());
        }
    }
}

// ===========================================================================
// Front block
// ===========================================================================

mod codec_tests {
    use super::*;

    proptest! {
        #[test]
        fn yaml_front_block_preserves_content(
            entries in prop::collection::btree_map("k[a-z]{0,6}", "v[a-z0-9 ]{0,10}[a-z0-9]", 0..5),
            body in "([a-z][a-z .,]{0,30}\n){0,4}",
        ) {
            let mut fm = Frontmatter::new();
            for (k, v) in entries {
                fm.insert(k, v.into());
            }

            let text = YamlFrontBlock.serialize(&fm, &body).unwrap();
            let (parsed, parsed_body) = YamlFrontBlock.parse(&text).unwrap();

            prop_assert_eq!(parsed, fm);
            prop_assert_eq!(parsed_body, body);
        }
    }
}
