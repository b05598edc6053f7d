use crate::error::{GitError, GitResult, NotFoundKind};
use std::path::{Path, PathBuf};

/// Maps `(owner, name)` to `<root>/<owner>/<name>.git`
///
/// Owner and name must already be sanitized identifiers; they become a
/// working directory, never a command argument.
#[derive(Debug, Clone)]
pub struct RepositoryLocator {
    root: PathBuf,
}

impl RepositoryLocator {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the bare repository for `owner/name` lives. No I/O.
    pub fn locate(&self, owner: &str, name: &str) -> PathBuf {
        self.root.join(owner).join(format!("{}.git", name))
    }

    /// Like [`locate`](Self::locate), but fails when nothing is there
    pub fn locate_existing(&self, owner: &str, name: &str) -> GitResult<PathBuf> {
        let path = self.locate(owner, name);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(GitError::NotFound(NotFoundKind::Repository(path)))
        }
    }
}
