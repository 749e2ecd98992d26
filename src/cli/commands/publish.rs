//! cli::commands::publish
//!
//! Publish a project and report the outcome.
//!
//! Exit codes: `0` published, `2` blocked by conflicts.

use std::process::ExitCode;

use anyhow::Result;

use super::{resolve_project, runtime, Context};
use crate::engine::{EngineError, PublishOutcome, PublishRequest};

const EXIT_CONFLICTS: u8 = 2;

pub fn publish(
    ctx: &Context,
    project: &str,
    title: Option<String>,
    description: Option<String>,
) -> Result<ExitCode> {
    let user = ctx.user()?;
    let db = ctx.open_db()?;
    let project = resolve_project(&db, project)?;
    let engine = ctx.remote_engine(db, &project)?;

    let request = PublishRequest { title, description };
    let outcome = match runtime()?.block_on(engine.publish(&project.id, &user, request)) {
        Ok(outcome) => outcome,
        Err(EngineError::NothingToPublish) => {
            println!("Nothing to publish.");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => return Err(e.into()),
    };

    ctx.emit(&outcome, || match &outcome {
        PublishOutcome::Published(receipt) => {
            println!(
                "Published {} to {} ({})",
                receipt.summary,
                receipt.branch,
                receipt.commit_hash.short(8)
            );
            println!("Pull request #{}: {}", receipt.pr_number, receipt.pr_url);
        }
        PublishOutcome::Conflicts { conflicts } => {
            println!("Publish blocked; nothing was written.");
            for conflict in conflicts {
                println!("  {conflict}");
            }
            println!(
                "Use `ink draft pull {} <path>` to rebase a draft on the remote file.",
                project.name
            );
        }
    })?;

    Ok(match outcome {
        PublishOutcome::Published(_) => ExitCode::SUCCESS,
        PublishOutcome::Conflicts { .. } => ExitCode::from(EXIT_CONFLICTS),
    })
}
