//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Resolves the project and acting user
//! 2. Calls the engine
//! 3. Formats and displays output (text, or JSON with `--json`)
//!
//! # Async Commands
//!
//! `tree` and `publish` talk to the forge. Their handlers build a tokio
//! runtime and block on the engine call.

mod draft;
mod project;
mod publish;
mod stage;
mod tree;
mod webhook;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context as _, Result};
use serde::Serialize;

use crate::cli::args::{Command, DraftCommand, ProjectCommand, StageCommand};
use crate::core::config::Config;
use crate::core::model::Project;
use crate::core::types::{ProjectId, RepoPath, UserId};
use crate::engine::Engine;
use crate::forge::create_forge;
use crate::store::Database;

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub db_path: PathBuf,
    pub user: Option<String>,
    pub json: bool,
}

impl Context {
    /// Build a context, resolving the database path.
    ///
    /// Precedence: `--db`, then the configured store path, then
    /// `<data dir>/inkpress/db.json`.
    pub fn new(
        config: Config,
        db: Option<PathBuf>,
        user: Option<String>,
        json: bool,
    ) -> Result<Self> {
        let db_path = match db.or_else(|| config.store_path().map(PathBuf::from)) {
            Some(path) => path,
            None => dirs::data_dir()
                .context("No data directory; pass --db")?
                .join("inkpress/db.json"),
        };
        Ok(Self {
            config,
            db_path,
            user,
            json,
        })
    }

    /// The acting user.
    pub fn user(&self) -> Result<UserId> {
        let raw = self
            .user
            .as_deref()
            .context("No acting user. Pass --as or set INKPRESS_USER.")?;
        UserId::new(raw).context("Invalid user id")
    }

    pub fn open_db(&self) -> Result<Database> {
        Database::open(&self.db_path)
            .with_context(|| format!("Failed to open database {}", self.db_path.display()))
    }

    /// Engine for commands that never touch the forge.
    pub fn offline_engine(&self) -> Result<Engine> {
        Ok(Engine::offline(self.open_db()?, self.config.publish_settings()))
    }

    /// Engine connected to the project's forge.
    pub fn remote_engine(&self, db: Database, project: &Project) -> Result<Engine> {
        let env = self.config.token_env();
        let token = std::env::var(env).unwrap_or_default();
        if token.trim().is_empty() {
            bail!("No forge token. Set {env}.");
        }
        let forge = create_forge(&project.remote_url, &token, self.config.api_base())
            .with_context(|| format!("Failed to connect to {}", project.remote_url))?;
        Ok(Engine::new(db, forge, self.config.publish_settings()))
    }

    /// Print `value` as JSON, or run `text` to print it for humans.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

/// Find a project by id or by exact name.
pub fn resolve_project(db: &Database, key: &str) -> Result<Project> {
    if let Ok(id) = ProjectId::parse(key) {
        return db.projects().get(&id).context("Project not found");
    }
    let matches: Vec<Project> = db
        .projects()
        .list()?
        .into_iter()
        .filter(|p| p.name == key)
        .collect();
    match matches.len() {
        0 => bail!("No project named '{key}'"),
        1 => Ok(matches.into_iter().next().context("Project not found")?),
        n => bail!("{n} projects are named '{key}'; use the project id"),
    }
}

pub fn parse_path(raw: &str) -> Result<RepoPath> {
    RepoPath::new(raw.trim_start_matches("./")).with_context(|| format!("Invalid path '{raw}'"))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<ExitCode> {
    match command {
        Command::Project(ProjectCommand::Add {
            name,
            remote,
            base,
            root,
        }) => project::add(ctx, &name, &remote, &base, &root),
        Command::Project(ProjectCommand::List) => project::list(ctx),
        Command::Branches { project } => project::branches(ctx, &project),

        Command::Stage(StageCommand::Create {
            project,
            path,
            title,
            body_file,
        }) => stage::create(ctx, &project, &path, title, body_file.as_deref()),
        Command::Stage(StageCommand::Delete {
            project,
            path,
            hash,
        }) => stage::delete(ctx, &project, &path, hash.as_deref()),
        Command::Undo { op } => stage::undo(ctx, &op),
        Command::Pending { project } => stage::pending(ctx, &project),

        Command::Tree { project, filter } => tree::tree(ctx, &project, filter.as_deref()),

        Command::Draft(DraftCommand::Save {
            project,
            path,
            file,
            message,
        }) => draft::save(ctx, &project, &path, &file, message),
        Command::Draft(DraftCommand::Pull { project, path }) => draft::pull(ctx, &project, &path),
        Command::Draft(DraftCommand::Show { project, path }) => draft::show(ctx, &project, &path),
        Command::Draft(DraftCommand::History { project, path }) => {
            draft::history(ctx, &project, &path)
        }
        Command::Draft(DraftCommand::List { project, search }) => {
            draft::list(ctx, &project, search.as_deref())
        }
        Command::Status {
            project,
            path,
            action,
        } => draft::status(ctx, &project, &path, &action),

        Command::Publish {
            project,
            title,
            description,
        } => publish::publish(ctx, &project, title, description),

        Command::Webhook(args) => webhook::webhook(ctx, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BranchName, ContentRoot};
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> Context {
        Context::new(
            Config::default(),
            Some(temp.path().join("db.json")),
            Some("owner".into()),
            false,
        )
        .unwrap()
    }

    #[test]
    fn resolves_projects_by_name_and_id() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let db = ctx.open_db().unwrap();
        let project = db
            .projects()
            .create(
                "docs",
                UserId::new("owner").unwrap(),
                "https://github.com/acme/docs",
                BranchName::new("main").unwrap(),
                ContentRoot::repo_root(),
            )
            .unwrap();

        assert_eq!(resolve_project(&db, "docs").unwrap().id, project.id);
        assert_eq!(
            resolve_project(&db, &project.id.to_string()).unwrap().id,
            project.id
        );
        assert!(resolve_project(&db, "other").is_err());
    }

    #[test]
    fn missing_user_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context(&temp);
        ctx.user = None;
        assert!(ctx.user().is_err());
    }

    #[test]
    fn paths_lose_leading_dot_slash() {
        assert_eq!(parse_path("./blog/a.md").unwrap().as_str(), "blog/a.md");
        assert!(parse_path("/abs.md").is_err());
    }
}
