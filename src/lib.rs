pub mod audit;
pub mod config;
pub mod error;
pub mod git;
pub mod security;

// Re-export commonly used types for convenience
pub use error::{AppError, GitError, GitResult, NotFoundKind};
pub use git::{
    Commit, GitExecutor, GitRunner, GitVersion, ObjectIdentity, ObjectKind, Repository,
    RepositoryLocator, RepositoryState, TreeEntry,
};
