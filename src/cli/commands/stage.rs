//! cli::commands::stage
//!
//! Staging, undoing and listing explorer ops.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::{parse_path, resolve_project, Context};
use crate::core::frontmatter::{FrontBlockCodec, YamlFrontBlock};
use crate::core::model::OpKind;
use crate::core::types::{BlobHash, OpId};
use crate::engine::NewFile;

pub fn create(
    ctx: &Context,
    project: &str,
    path: &str,
    title: Option<String>,
    body_file: Option<&Path>,
) -> Result<ExitCode> {
    let user = ctx.user()?;
    let path = parse_path(path)?;
    let (frontmatter, body) = match body_file {
        Some(file) => {
            let text = fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            YamlFrontBlock.parse(&text)?
        }
        None => Default::default(),
    };

    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let op = engine.stage_create(
        &project.id,
        path,
        &user,
        NewFile {
            title,
            body,
            frontmatter,
        },
    )?;

    ctx.emit(&op, || {
        println!("Staged create of {} (op {})", op.file_path, op.id.short());
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn delete(ctx: &Context, project: &str, path: &str, hash: Option<&str>) -> Result<ExitCode> {
    let user = ctx.user()?;
    let path = parse_path(path)?;
    let hash = hash
        .map(BlobHash::new)
        .transpose()
        .context("Invalid blob hash")?;

    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let op = engine.stage_delete(&project.id, path, &user, hash)?;

    ctx.emit(&op, || {
        println!("Staged delete of {} (op {})", op.file_path, op.id.short());
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn undo(ctx: &Context, op: &str) -> Result<ExitCode> {
    let id = OpId::parse(op).context("Invalid op id")?;
    let engine = ctx.offline_engine()?;
    let op = engine.undo_op(&id)?;

    ctx.emit(&op, || {
        println!("Undid {} of {}", op.kind.label(), op.file_path);
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn pending(ctx: &Context, project: &str) -> Result<ExitCode> {
    let engine = ctx.offline_engine()?;
    let project = resolve_project(engine.db(), project)?;
    let ops = engine.list_pending(&project.id)?;

    ctx.emit(&ops, || {
        if ops.is_empty() {
            println!("Nothing staged.");
        }
        for op in &ops {
            let detail = match &op.kind {
                OpKind::Create { title, .. } => format!("\"{title}\""),
                OpKind::Delete {
                    previous_hash: Some(hash),
                } => format!("expects {}", hash.short(12)),
                OpKind::Delete {
                    previous_hash: None,
                } => "no expected hash".into(),
            };
            println!(
                "{}  {:<6} {}  {}  by {}",
                op.id.short(),
                op.kind.label(),
                op.file_path,
                detail,
                op.created_by
            );
        }
    })?;
    Ok(ExitCode::SUCCESS)
}
