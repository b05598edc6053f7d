pub mod executor;
pub mod locator;
pub mod parser;
pub mod repository;
pub mod version;

// Re-export commonly used types
pub use executor::{CommandOutput, ExecutorOptions, GitExecutor, GitRunner};
pub use locator::RepositoryLocator;
pub use parser::{Commit, ObjectIdentity, ObjectKind, TreeEntry};
pub use repository::{put_default_branch_to_front, Repository, RepositoryState};
pub use version::GitVersion;
