//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Directory whose `.inkpress/config.toml` applies
//! - `--db <path>`: Database file
//! - `--as <user>`: Acting user (or `INKPRESS_USER`)
//! - `--json`: Machine-readable output
//! - `--debug` / `--quiet` / `--json-logs`: Logging

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// inkpress - stage content edits and publish them as one pull request
#[derive(Parser, Debug)]
#[command(name = "ink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if ink was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Database file (defaults to the configured store path)
    #[arg(long, global = true, env = "INKPRESS_DB")]
    pub db: Option<PathBuf>,

    /// Act as this user
    #[arg(long = "as", global = true, env = "INKPRESS_USER", value_name = "USER")]
    pub user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register and list projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Stage a file create or delete
    #[command(
        subcommand,
        after_help = "\
EXAMPLES:
    # Stage a new post with an initial body
    ink stage create docs blog/launch.mdx --title Launch --body-file launch.mdx

    # Stage a delete; the hash defaults to the last synced one
    ink stage delete docs blog/old.mdx"
    )]
    Stage(StageCommand),

    /// Undo a pending op
    Undo {
        /// Op id
        op: String,
    },

    /// List pending ops of a project
    Pending {
        /// Project id or name
        project: String,
    },

    /// Show the file tree with pending ops applied
    #[command(
        long_about = "Show the project's file tree with pending ops applied.\n\n\
            The tree is read from the project's working branch if one is active, \
            otherwise from the base branch. Files staged for creation are marked \
            '+', files staged for deletion are marked '-'."
    )]
    Tree {
        /// Project id or name
        project: String,

        /// Only show entries whose name, path or title contains this text
        #[arg(long, short)]
        filter: Option<String>,
    },

    /// Edit and inspect drafts
    #[command(subcommand)]
    Draft(DraftCommand),

    /// Apply a status action to a document
    Status {
        /// Project id or name
        project: String,

        /// Document path relative to the content root
        path: String,

        /// One of: submit, approve, request-changes, unpublish, archive, restore
        action: String,
    },

    /// Publish pending ops and dirty drafts as one commit and pull request
    #[command(
        long_about = "Publish pending ops and dirty drafts.\n\n\
            Every staged change is checked against the remote first. If any file \
            changed under a staged change, the publish stops with a conflict report \
            and nothing is written. Otherwise all changes land in one commit on the \
            project's working branch, and a pull request is opened if none exists.",
        after_help = "\
EXAMPLES:
    # Publish with the default pull request title
    ink publish docs

    # Publish with a custom title and description
    ink publish docs --title \"Spring launch\" --description \"Posts for the launch\""
    )]
    Publish {
        /// Project id or name
        project: String,

        /// Pull request title
        #[arg(long)]
        title: Option<String>,

        /// Pull request description
        #[arg(long)]
        description: Option<String>,
    },

    /// List publish branches of a project
    Branches {
        /// Project id or name
        project: String,
    },

    /// Apply a signed webhook payload
    Webhook(WebhookArgs),
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Register a repository
    Add {
        /// Project name
        name: String,

        /// Git remote URL of the repository
        #[arg(long)]
        remote: String,

        /// Branch pull requests target
        #[arg(long, default_value = "main")]
        base: String,

        /// Directory inside the repository that holds content
        #[arg(long, default_value = "")]
        root: String,
    },

    /// List registered projects
    List,
}

#[derive(Subcommand, Debug)]
pub enum StageCommand {
    /// Stage creation of a file
    Create {
        /// Project id or name
        project: String,

        /// Path relative to the content root
        path: String,

        /// Display title
        #[arg(long)]
        title: Option<String>,

        /// File whose contents (front block included) become the initial content
        #[arg(long)]
        body_file: Option<PathBuf>,
    },

    /// Stage deletion of a file
    Delete {
        /// Project id or name
        project: String,

        /// Path relative to the content root
        path: String,

        /// Remote blob hash the file is expected to have
        #[arg(long)]
        hash: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DraftCommand {
    /// Save draft content from a file
    Save {
        /// Project id or name
        project: String,

        /// Path relative to the content root
        path: String,

        /// File to read (front block included)
        #[arg(long)]
        file: PathBuf,

        /// Note stored with the snapshot of the previous content
        #[arg(long, short)]
        message: Option<String>,
    },

    /// Record the remote file as the document's base, importing it if new
    Pull {
        /// Project id or name
        project: String,

        /// Path relative to the content root
        path: String,
    },

    /// Show a document
    Show {
        /// Project id or name
        project: String,

        /// Path relative to the content root
        path: String,
    },

    /// Show a document's history, newest first
    History {
        /// Project id or name
        project: String,

        /// Path relative to the content root
        path: String,
    },

    /// List documents of a project
    List {
        /// Project id or name
        project: String,

        /// Only documents whose title or path contains this text
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct WebhookArgs {
    /// File holding the raw request body (`-` for stdin)
    #[arg(long, default_value = "-")]
    pub payload: PathBuf,

    /// Signature header value (`sha256=<hex>`)
    #[arg(long)]
    pub signature: Option<String>,

    /// Event name header value (e.g. `pull_request`)
    #[arg(long)]
    pub event: Option<String>,
}
