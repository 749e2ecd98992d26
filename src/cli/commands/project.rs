//! cli::commands::project
//!
//! Project registration and branch listing.

use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::{resolve_project, Context};
use crate::core::types::{BranchName, ContentRoot};

/// Register a repository as a project owned by the acting user.
pub fn add(ctx: &Context, name: &str, remote: &str, base: &str, root: &str) -> Result<ExitCode> {
    let owner = ctx.user()?;
    let base = BranchName::new(base).context("Invalid base branch")?;
    let root = ContentRoot::new(root).context("Invalid content root")?;

    let engine = ctx.offline_engine()?;
    let project = engine.register_project(name, owner, remote, base, root)?;

    ctx.emit(&project, || {
        println!("Registered project '{}' ({})", project.name, project.id);
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn list(ctx: &Context) -> Result<ExitCode> {
    let db = ctx.open_db()?;
    let projects = db.projects().list()?;

    ctx.emit(&projects, || {
        if projects.is_empty() {
            println!("No projects registered.");
        }
        for p in &projects {
            let root = if p.content_root.as_str().is_empty() {
                "/"
            } else {
                p.content_root.as_str()
            };
            println!(
                "{}  {:<20} {} ({} @ {})",
                p.id.short(),
                p.name,
                p.remote_url,
                p.base_branch,
                root
            );
        }
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Publish branches of a project, newest first.
pub fn branches(ctx: &Context, project: &str) -> Result<ExitCode> {
    let db = ctx.open_db()?;
    let project = resolve_project(&db, project)?;
    let branches = db.branches().list(&project.id)?;

    ctx.emit(&branches, || {
        if branches.is_empty() {
            println!("No publish branches.");
        }
        for b in &branches {
            let pr = b
                .pr_number
                .map(|n| format!("#{n}"))
                .unwrap_or_else(|| "no PR".into());
            println!(
                "{:<8} {}  {}  {} file(s)",
                b.status.to_string(),
                b.branch_name,
                pr,
                b.committed_file_paths.len()
            );
        }
    })?;
    Ok(ExitCode::SUCCESS)
}
