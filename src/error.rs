use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// Import module-level errors for AppError
use crate::config::settings::ConfigError;
use crate::security::validator::ValidationError;

/// What a well-formed query failed to find
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundKind {
    Commit,
    Object,
    Folder,
    Branch(String),
    Repository(PathBuf),
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundKind::Commit => write!(f, "Commit does not exist"),
            NotFoundKind::Object => write!(f, "Object does not exist"),
            NotFoundKind::Folder => write!(f, "Folder does not exist"),
            NotFoundKind::Branch(name) => write!(f, "Branch \"{}\" does not exist", name),
            NotFoundKind::Repository(path) => {
                write!(f, "Repository {} does not exist", path.display())
            }
        }
    }
}

/// Errors that can occur during git operations
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Command '{command}' failed with exit code {exit_code}: {stderr}")]
    ProcessFailure {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to launch git: {0}")]
    Launch(#[source] io::Error),

    #[error("Command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("{0}")]
    NotFound(NotFoundKind),

    #[error("Invalid repository state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("Failed to parse git output: {0}")]
    ParseError(String),

    #[error("Git version {0} is too old. Minimum required: 2.20")]
    GitVersionTooOld(String),
}

impl GitError {
    /// The query was valid but the ref, path or repository does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitError::NotFound(_))
    }

    /// The external tool misbehaved or could not be run
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            GitError::ProcessFailure { .. } | GitError::Launch(_) | GitError::Timeout { .. }
        )
    }
}

/// Top-level application error that wraps all module-specific errors
///
/// Used by the binary; library callers normally only see `GitError`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Security validation error: {0}")]
    Security(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Usage: {0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for git operations
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;
