use gitmeta::audit::AuditLogger;
use gitmeta::config::{Config, ConfigError};
use gitmeta::error::{AppError, AppResult, GitError, NotFoundKind};
use gitmeta::git::{ExecutorOptions, GitExecutor, GitVersion, Repository, RepositoryLocator};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "gitmeta <repo-path | owner/name> <command> [args...]

commands:
  branches                    branch names, default branch first
  last-commit <ref> [path]    most recent commit for a ref or path
  tree <ref> [dir]            directory listing with last commits
  object <ref> <path>         hash and kind of an object
  empty                       whether the repository has no commits
  count <ref>                 commits reachable from a ref";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(std::env::args().skip(1).collect()).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            match &e {
                AppError::Git(err) if err.is_not_found() => ExitCode::from(1),
                _ => ExitCode::from(2),
            }
        }
    }
}

/// Config file if present, defaults otherwise
fn load_config() -> AppResult<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(ConfigError::ReadError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config file, using defaults");
            Ok(Config::default_config())
        }
        Err(e) => Err(e.into()),
    }
}

/// A directory on disk, or `owner/name` under the configured storage root
fn resolve_repository(target: &str, config: &Config) -> AppResult<PathBuf> {
    if Path::new(target).is_dir() {
        return Ok(PathBuf::from(target));
    }

    let locator = RepositoryLocator::new(&config.storage.root);
    match target.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.contains('/') => {
            Ok(locator.locate_existing(owner, name)?)
        }
        _ => Err(GitError::NotFound(NotFoundKind::Repository(PathBuf::from(target))).into()),
    }
}

async fn run(args: Vec<String>) -> AppResult<String> {
    let (target, command, rest) = match args.as_slice() {
        [target, command, rest @ ..] => (target.as_str(), command.as_str(), rest),
        _ => return Err(AppError::Usage(USAGE.to_string())),
    };

    let config = load_config()?;

    let mut executor = GitExecutor::new(ExecutorOptions::from(&config));
    if let Some(path) = config.audit_log_path()? {
        executor = executor.with_audit(Arc::new(AuditLogger::with_path(path)?));
    }

    let version = GitVersion::validate(&executor).await?;
    debug!(%version, "git version ok");

    let path = resolve_repository(target, &config)?;
    info!(repo = %path.display(), %command, "inspecting repository");
    let repo = Repository::from_config(&path, Arc::new(executor), &config);

    let value: Value = match (command, rest) {
        ("branches", []) => serde_json::to_value(repo.branches_default_first().await?)?,
        ("last-commit", [reference]) => {
            serde_json::to_value(repo.last_commit(reference, None).await?)?
        }
        ("last-commit", [reference, file]) => {
            serde_json::to_value(repo.last_commit(reference, Some(file.as_str())).await?)?
        }
        ("tree", [reference]) => serde_json::to_value(repo.tree_entries(reference, "").await?)?,
        ("tree", [reference, dir]) => {
            serde_json::to_value(repo.tree_entries(reference, dir).await?)?
        }
        ("object", [reference, file]) => {
            serde_json::to_value(repo.resolve_object(reference, file).await?)?
        }
        ("empty", []) => Value::Bool(repo.is_empty().await?),
        ("count", [reference]) => Value::from(repo.commit_count(reference).await?),
        _ => return Err(AppError::Usage(USAGE.to_string())),
    };

    Ok(serde_json::to_string_pretty(&value)?)
}
