//! cli::commands::tree
//!
//! Render the overlaid file tree.

use std::process::ExitCode;

use anyhow::Result;

use super::{resolve_project, runtime, Context};
use crate::engine::TreeNode;

pub fn tree(ctx: &Context, project: &str, filter: Option<&str>) -> Result<ExitCode> {
    let db = ctx.open_db()?;
    let project = resolve_project(&db, project)?;
    let engine = ctx.remote_engine(db, &project)?;

    let nodes = runtime()?.block_on(engine.tree(&project.id, filter))?;

    ctx.emit(&nodes, || {
        if nodes.is_empty() {
            println!("(empty)");
        }
        let mut out = String::new();
        render(&nodes, 0, &mut out);
        print!("{out}");
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Indented listing with `+` for new and `-` for deleted entries.
pub(crate) fn render(nodes: &[TreeNode], depth: usize, out: &mut String) {
    for node in nodes {
        let marker = if node.is_deleted {
            '-'
        } else if node.is_new {
            '+'
        } else {
            ' '
        };
        let suffix = if node.is_dir() { "/" } else { "" };
        out.push_str(&format!(
            "{marker} {}{}{suffix}\n",
            "  ".repeat(depth),
            node.name
        ));
        render(&node.children, depth + 1, out);
    }
}
