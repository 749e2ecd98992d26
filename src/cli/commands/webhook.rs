//! cli::commands::webhook
//!
//! Apply a webhook delivery captured to a file or piped on stdin.

use std::fs;
use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::Context;
use crate::cli::args::WebhookArgs;
use crate::engine::WebhookOutcome;

pub fn webhook(ctx: &Context, args: &WebhookArgs) -> Result<ExitCode> {
    let env = ctx.config.webhook_secret_env();
    let secret = std::env::var(env).unwrap_or_default();

    let body = if args.payload.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read payload from stdin")?;
        buf
    } else {
        fs::read(&args.payload)
            .with_context(|| format!("Failed to read {}", args.payload.display()))?
    };

    let engine = ctx.offline_engine()?;
    let outcome = engine
        .handle_webhook(&secret, args.signature.as_deref(), args.event.as_deref(), &body)
        .with_context(|| format!("Webhook rejected (secret from {env})"))?;

    ctx.emit(&outcome, || match &outcome {
        WebhookOutcome::Merged(report) => println!(
            "PR #{} merged: {} document(s) published, {} archived, {} op(s) cleared",
            report.pr_number,
            report.promoted.len(),
            report.retired.len(),
            report.cleared_ops
        ),
        WebhookOutcome::Closed { .. } => println!("Pull request closed without merge."),
        WebhookOutcome::UnknownPr { pr_number } => {
            println!("No publish branch for PR #{pr_number}; ignored.")
        }
        WebhookOutcome::Ignored { event } => println!("Event '{event}' ignored."),
    })?;
    Ok(ExitCode::SUCCESS)
}
