//! cli::commands::draft
//!
//! Draft editing, inspection and status changes.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::{parse_path, resolve_project, runtime, Context};
use crate::core::model::Document;
use crate::core::status::StatusAction;

pub fn save(
    ctx: &Context,
    project: &str,
    path: &str,
    file: &Path,
    message: Option<String>,
) -> Result<ExitCode> {
    let user = ctx.user()?;
    let path = parse_path(path)?;
    let text =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let doc = engine.save_draft_text(&project.id, path, &user, &text, message)?;

    ctx.emit(&doc, || {
        let state = if doc.is_dirty() { "unpublished changes" } else { "in sync" };
        println!("Saved {} ({}, {})", doc.file_path, doc.status, state);
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn pull(ctx: &Context, project: &str, path: &str) -> Result<ExitCode> {
    let path = parse_path(path)?;
    let db = ctx.open_db()?;
    let project = resolve_project(&db, project)?;
    let engine = ctx.remote_engine(db, &project)?;
    let doc = runtime()?.block_on(engine.pull_remote(&project.id, path))?;

    ctx.emit(&doc, || {
        let state = if doc.is_dirty() { "local changes kept" } else { "in sync" };
        println!("Pulled {} ({}, {})", doc.file_path, doc.status, state);
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn show(ctx: &Context, project: &str, path: &str) -> Result<ExitCode> {
    let path = parse_path(path)?;
    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let doc = engine.document_at(&project.id, &path)?;

    ctx.emit(&doc, || print_document(&doc))?;
    Ok(ExitCode::SUCCESS)
}

fn print_document(doc: &Document) {
    println!("{}  \"{}\"", doc.file_path, doc.title);
    println!("  status:      {}", doc.status);
    println!(
        "  remote hash: {}",
        doc.remote_hash
            .as_ref()
            .map(|h| h.short(12).to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!("  dirty:       {}", doc.is_dirty());
    if let Some(at) = doc.published_at {
        println!("  published:   {}", at.to_rfc3339());
    }
    if let Some(body) = &doc.body {
        println!();
        println!("{body}");
    }
}

pub fn history(ctx: &Context, project: &str, path: &str) -> Result<ExitCode> {
    let path = parse_path(path)?;
    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let doc = engine.document_at(&project.id, &path)?;
    let entries = engine.history(&doc.id)?;

    ctx.emit(&entries, || {
        if entries.is_empty() {
            println!("No history for {}.", doc.file_path);
        }
        for entry in &entries {
            let commit = entry
                .commit_hash
                .as_ref()
                .map(|c| format!(" [{}]", c.short(8)))
                .unwrap_or_default();
            println!(
                "{}  {}{}  {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.editor,
                commit,
                entry.message.as_deref().unwrap_or("")
            );
        }
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn list(ctx: &Context, project: &str, search: Option<&str>) -> Result<ExitCode> {
    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let docs = match search {
        Some(query) => engine.db().documents().search(&project.id, query)?,
        None => engine.db().documents().list(&project.id)?,
    };

    ctx.emit(&docs, || {
        for doc in &docs {
            let marker = if doc.is_dirty() { '*' } else { ' ' };
            println!("{marker} {:<10} {}  \"{}\"", doc.status.to_string(), doc.file_path, doc.title);
        }
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn status(ctx: &Context, project: &str, path: &str, action: &str) -> Result<ExitCode> {
    let path = parse_path(path)?;
    let action: StatusAction = action.parse()?;
    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let doc = engine.document_at(&project.id, &path)?;
    let doc = engine.transition_status(&doc.id, action)?;

    ctx.emit(&doc, || {
        println!("{} is now {}", doc.file_path, doc.status);
    })?;
    Ok(ExitCode::SUCCESS)
}
