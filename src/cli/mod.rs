//! cli
//!
//! Command-line interface layer for inkpress.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and set up logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`]. All state changes flow through the engine and stores.

pub mod args;
pub mod commands;

pub use args::Cli;

use std::process::ExitCode;

use anyhow::{Context as _, Result};

use crate::core::config::Config;
use crate::telemetry::{self, LogOptions};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();

    telemetry::init(LogOptions {
        debug: cli.debug,
        quiet: cli.quiet,
        json: cli.json_logs,
    });

    let cwd = match cli.cwd.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let loaded = Config::load(Some(&cwd)).context("Failed to load configuration")?;
    for source in &loaded.sources {
        tracing::debug!(path = %source.display(), "config loaded");
    }

    let ctx = commands::Context::new(loaded.config, cli.db, cli.user, cli.json)?;
    commands::dispatch(cli.command, &ctx)
}
