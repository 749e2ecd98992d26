//! engine::overlay
//!
//! Tree overlay projector.
//!
//! Turns a remote tree listing into a display tree and projects pending
//! explorer ops onto it: pending deletes mark existing nodes, pending
//! creates add nodes (and any missing ancestor directories) flagged as new.
//! Every function here is pure; inputs are never mutated.
//!
//! Node paths are full repository paths. Op paths are relative to the
//! content root and are mapped through it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::model::{ExplorerOp, OpKind};
use crate::core::types::{BlobHash, ContentRoot, RepoPath};
use crate::forge::{EntryKind, TreeEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Dir,
    File,
}

/// One node of the display tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub path: RepoPath,
    pub kind: NodeKind,
    pub hash: Option<BlobHash>,
    /// Synthesized from a pending create.
    pub is_new: bool,
    /// Targeted by a pending delete.
    pub is_deleted: bool,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn file(path: RepoPath, hash: Option<BlobHash>) -> Self {
        Self::new(path, NodeKind::File, hash)
    }

    pub fn dir(path: RepoPath) -> Self {
        Self::new(path, NodeKind::Dir, None)
    }

    fn new(path: RepoPath, kind: NodeKind, hash: Option<BlobHash>) -> Self {
        Self {
            name: path.file_name().to_string(),
            path,
            kind,
            hash,
            is_new: false,
            is_deleted: false,
            children: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    fn marked_new(mut self) -> Self {
        self.is_new = true;
        self
    }
}

/// Build a sorted display tree from a flat listing.
///
/// The top level holds the direct children of `root`; entries outside it
/// are dropped.
pub fn build_tree(entries: &[TreeEntry], root: &ContentRoot) -> Vec<TreeNode> {
    let mut nodes = Vec::new();
    for entry in entries {
        let Some(chain) = ancestors_within(&entry.path, root) else {
            continue;
        };
        let leaf = match entry.kind {
            EntryKind::File => TreeNode::file(entry.path.clone(), entry.hash.clone()),
            EntryKind::Dir => TreeNode::dir(entry.path.clone()),
        };
        insert(&mut nodes, &chain, leaf, false);
    }
    sort_nodes(&mut nodes);
    nodes
}

/// Project pending ops onto a remote tree.
///
/// Ops that are not pending are ignored. A create whose path already
/// exists remotely adds nothing; a delete whose path is absent is ignored.
pub fn overlay(remote: &[TreeNode], ops: &[ExplorerOp], root: &ContentRoot) -> Vec<TreeNode> {
    let mut tree = remote.to_vec();

    for op in ops.iter().filter(|op| op.is_pending()) {
        let full = root.to_repo_path(&op.file_path);
        match &op.kind {
            OpKind::Delete { .. } => {
                if let Some(node) = find_mut(&mut tree, &full) {
                    node.is_deleted = true;
                }
            }
            OpKind::Create { .. } => {
                if find_mut(&mut tree, &full).is_some() {
                    continue;
                }
                let Some(chain) = ancestors_within(&full, root) else {
                    continue;
                };
                insert(&mut tree, &chain, TreeNode::file(full, None).marked_new(), true);
            }
        }
    }

    sort_nodes(&mut tree);
    tree
}

/// Keep nodes whose name, path or display title contains `query`.
///
/// Matching ignores case. Directories with a matching descendant are kept
/// with just the matching part of their subtree; a matching directory is
/// kept whole. An empty query keeps everything.
pub fn filter_tree(
    tree: &[TreeNode],
    query: &str,
    titles: &BTreeMap<RepoPath, String>,
) -> Vec<TreeNode> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return tree.to_vec();
    }
    tree.iter()
        .filter_map(|node| filter_node(node, &needle, titles))
        .collect()
}

fn filter_node(
    node: &TreeNode,
    needle: &str,
    titles: &BTreeMap<RepoPath, String>,
) -> Option<TreeNode> {
    let matches = node.name.to_lowercase().contains(needle)
        || node.path.as_str().to_lowercase().contains(needle)
        || titles
            .get(&node.path)
            .is_some_and(|t| t.to_lowercase().contains(needle));
    if matches {
        return Some(node.clone());
    }

    let children: Vec<TreeNode> = node
        .children
        .iter()
        .filter_map(|child| filter_node(child, needle, titles))
        .collect();
    if children.is_empty() {
        return None;
    }
    Some(TreeNode {
        children,
        ..node.clone()
    })
}

/// Directories below `root` that contain `path`, outermost first.
///
/// `None` if `path` is not strictly inside `root`.
fn ancestors_within(path: &RepoPath, root: &ContentRoot) -> Option<Vec<RepoPath>> {
    root.strip(path)?;
    let mut chain = Vec::new();
    let mut current = path.parent();
    while let Some(dir) = current {
        if root.strip(&dir).is_none() {
            break;
        }
        current = dir.parent();
        chain.push(dir);
    }
    chain.reverse();
    Some(chain)
}

/// Insert `leaf` below the directory chain, creating missing directories.
///
/// Returns `false` if a node already sits at the leaf's path or a file is
/// in the way.
fn insert(nodes: &mut Vec<TreeNode>, chain: &[RepoPath], leaf: TreeNode, mark_new: bool) -> bool {
    match chain.split_first() {
        None => {
            if nodes.iter().any(|n| n.path == leaf.path) {
                return false;
            }
            nodes.push(leaf);
            true
        }
        Some((dir, rest)) => {
            let index = match nodes.iter().position(|n| &n.path == dir) {
                Some(index) => index,
                None => {
                    let node = TreeNode::dir(dir.clone());
                    nodes.push(if mark_new { node.marked_new() } else { node });
                    nodes.len() - 1
                }
            };
            let parent = &mut nodes[index];
            if !parent.is_dir() {
                return false;
            }
            insert(&mut parent.children, rest, leaf, mark_new)
        }
    }
}

fn find_mut<'a>(nodes: &'a mut [TreeNode], path: &RepoPath) -> Option<&'a mut TreeNode> {
    for node in nodes.iter_mut() {
        if &node.path == path {
            return Some(node);
        }
        if node.is_dir() && path.starts_with(&node.path) {
            return find_mut(&mut node.children, path);
        }
    }
    None
}

/// Directories first, then by name, recursively.
fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
    for node in nodes.iter_mut() {
        sort_nodes(&mut node.children);
    }
}
