use crate::config::Config;
use crate::error::{GitError, GitResult, NotFoundKind};
use crate::git::executor::GitRunner;
use crate::git::parser::{self, Commit, ObjectIdentity, ObjectKind, Peel, TreeEntry};
use crate::security::validator::{validate_path, validate_ref};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Branch name treated as the default when none is configured
pub const DEFAULT_BRANCH: &str = "master";

/// Concurrent commit lookups per tree listing when none is configured
pub const DEFAULT_TREE_FANOUT: usize = 8;

/// Whether a repository has any history yet
///
/// A repository only moves from `Empty` to `Initialized` (first push); this
/// layer never observes the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    /// No commits and therefore no branches
    Empty,
    /// At least one commit
    Initialized,
}

/// Move `default_name` to the front, keeping the relative order of the rest
///
/// Only meaningful for a repository that has commits; an empty branch list
/// fails like any other list without `default_name`.
pub fn put_default_branch_to_front(
    branches: &[String],
    default_name: &str,
) -> GitResult<Vec<String>> {
    let index = branches
        .iter()
        .position(|b| b == default_name)
        .ok_or_else(|| GitError::NotFound(NotFoundKind::Branch(default_name.to_string())))?;

    let mut ordered = Vec::with_capacity(branches.len());
    ordered.push(branches[index].clone());
    ordered.extend(branches[..index].iter().cloned());
    ordered.extend(branches[index + 1..].iter().cloned());
    Ok(ordered)
}

/// Read-only view of one bare repository
///
/// Nothing is cached: every call runs git against the repository as it is
/// at that moment, so two calls may observe different states if a push lands
/// in between.
#[derive(Clone)]
pub struct Repository {
    path: PathBuf,
    runner: Arc<dyn GitRunner>,
    default_branch: String,
    tree_fanout: usize,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("default_branch", &self.default_branch)
            .field("tree_fanout", &self.tree_fanout)
            .finish()
    }
}

impl Repository {
    /// Open the repository at `path` (as produced by `RepositoryLocator`)
    pub fn new<P: AsRef<Path>>(path: P, runner: Arc<dyn GitRunner>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            runner,
            default_branch: DEFAULT_BRANCH.to_string(),
            tree_fanout: DEFAULT_TREE_FANOUT,
        }
    }

    /// Open with the default branch and fan-out from `config`
    pub fn from_config<P: AsRef<Path>>(path: P, runner: Arc<dyn GitRunner>, config: &Config) -> Self {
        Self::new(path, runner)
            .with_default_branch(&config.git.default_branch)
            .with_tree_fanout(config.git.tree_fanout)
    }

    pub fn with_default_branch(mut self, name: &str) -> Self {
        self.default_branch = name.to_string();
        self
    }

    pub fn with_tree_fanout(mut self, fanout: usize) -> Self {
        self.tree_fanout = fanout.max(1);
        self
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, args: Vec<OsString>) -> GitResult<String> {
        self.runner.run(&self.path, &args).await
    }

    async fn run_raw(&self, args: Vec<OsString>) -> GitResult<Vec<u8>> {
        self.runner.run_raw(&self.path, &args).await
    }

    /// Does `reference` name an object that peels to `peel`?
    async fn resolves(&self, reference: &str, peel: Peel) -> GitResult<Option<String>> {
        let output = self
            .runner
            .execute(&self.path, &parser::verify_args(reference, peel))
            .await?;
        let stdout = output.stdout_lossy();
        let hash = stdout.trim();
        if output.success && !hash.is_empty() {
            Ok(Some(hash.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Re-classify a failed query as `NotFound` when its ref does not exist.
    ///
    /// git reports an unknown revision as a fatal error, which would
    /// otherwise be indistinguishable from a broken repository.
    async fn explain_failure(
        &self,
        err: GitError,
        reference: &str,
        peel: Peel,
        missing: NotFoundKind,
    ) -> GitError {
        if !matches!(err, GitError::ProcessFailure { .. }) {
            return err;
        }

        match self.resolves(reference, peel).await {
            Ok(None) => GitError::NotFound(missing),
            Ok(Some(_)) => err,
            Err(probe) => {
                warn!(repo = %self.path.display(), %reference, error = %probe, "ref probe failed");
                err
            }
        }
    }

    /// Short names of all branches, in git's order (alphabetical)
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn all_branches(&self) -> GitResult<Vec<String>> {
        let stdout = self.run(parser::branch_list_args()).await?;
        Ok(parser::parse_branch_list(&stdout))
    }

    /// All branches with the default branch first
    ///
    /// An empty repository has no branches and yields an empty list; an
    /// initialized repository without the default branch is `NotFound`.
    pub async fn branches_default_first(&self) -> GitResult<Vec<String>> {
        let branches = self.all_branches().await?;
        if branches.is_empty() {
            return Ok(branches);
        }
        put_default_branch_to_front(&branches, &self.default_branch)
    }

    /// Name of the default branch, checked against the repository
    pub async fn default_branch(&self) -> GitResult<String> {
        let branches = self.all_branches().await?;
        if branches.is_empty() {
            return Err(GitError::InvalidState(format!(
                "{} has no commits, so it has no default branch",
                self.path.display()
            )));
        }
        if branches.iter().any(|b| b == &self.default_branch) {
            Ok(self.default_branch.clone())
        } else {
            Err(GitError::NotFound(NotFoundKind::Branch(
                self.default_branch.clone(),
            )))
        }
    }

    /// Most recent commit reachable from `reference`, optionally touching `path`
    ///
    /// All fields come from a single `git log` record, so they always
    /// describe the same commit.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn last_commit(&self, reference: &str, path: Option<&str>) -> GitResult<Commit> {
        let reference = validate_ref(reference)?;
        let path = path.map(validate_path).transpose()?;
        let path = path.as_deref().filter(|p| !p.is_empty());

        self.last_commit_unchecked(reference, path.map(OsStr::new)).await
    }

    /// `path` here is either validated or comes from git itself (a tree
    /// listing), possibly as bytes that are not UTF-8
    async fn last_commit_unchecked(
        &self,
        reference: &str,
        path: Option<&OsStr>,
    ) -> GitResult<Commit> {
        let stdout = match self.run(parser::last_commit_args(reference, path)).await {
            Ok(stdout) => stdout,
            Err(e) => {
                return Err(self
                    .explain_failure(e, reference, Peel::Commit, NotFoundKind::Commit)
                    .await);
            }
        };

        if let Some(commit) = parser::parse_commit(&stdout)? {
            return Ok(commit);
        }

        // git log succeeds silently when the ref names a blob or tree
        match self.resolves(reference, Peel::Commit).await? {
            Some(_) => Err(GitError::NotFound(NotFoundKind::Object)),
            None => Err(GitError::NotFound(NotFoundKind::Commit)),
        }
    }

    /// Immediate children of `dir` at `reference`, each with its last commit
    ///
    /// An empty `dir` lists the root. Commit lookups run concurrently, at
    /// most `tree_fanout` at a time; the result keeps git's listing order and
    /// fails as a whole if any single lookup fails.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn tree_entries(&self, reference: &str, dir: &str) -> GitResult<Vec<TreeEntry>> {
        let reference = validate_ref(reference)?;
        let dir = validate_path(dir)?;

        // Trailing slash lists the directory's children, not the directory
        let pathspec = if dir.is_empty() {
            None
        } else {
            Some(format!("{}/", dir))
        };

        let stdout = match self
            .run_raw(parser::ls_tree_args(reference, pathspec.as_deref().map(OsStr::new)))
            .await
        {
            Ok(stdout) => stdout,
            Err(e) => {
                return Err(self
                    .explain_failure(e, reference, Peel::Tree, NotFoundKind::Folder)
                    .await);
            }
        };

        let listing = parser::parse_ls_tree(&stdout)?;
        if listing.is_empty() {
            return Err(GitError::NotFound(NotFoundKind::Folder));
        }

        stream::iter(listing)
            .map(|entry| async move {
                let last_commit = self
                    .last_commit_unchecked(reference, Some(entry.path.as_os_str()))
                    .await?;
                Ok::<_, GitError>(TreeEntry {
                    kind: entry.kind,
                    path: entry.display_path(),
                    last_commit,
                })
            })
            .buffered(self.tree_fanout)
            .try_collect()
            .await
    }

    /// Hash and kind of the object at `path` in `reference`
    ///
    /// An empty `path` resolves the root tree.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn resolve_object(&self, reference: &str, path: &str) -> GitResult<ObjectIdentity> {
        let reference = validate_ref(reference)?;
        let path = validate_path(path)?;

        if path.is_empty() {
            return match self.resolves(reference, Peel::Tree).await? {
                Some(hash) => Ok(ObjectIdentity {
                    hash,
                    kind: ObjectKind::Tree,
                }),
                None => Err(GitError::NotFound(NotFoundKind::Object)),
            };
        }

        let stdout = match self
            .run_raw(parser::ls_tree_args(reference, Some(OsStr::new(&path))))
            .await
        {
            Ok(stdout) => stdout,
            Err(e) => {
                return Err(self
                    .explain_failure(e, reference, Peel::Tree, NotFoundKind::Object)
                    .await);
            }
        };

        parser::parse_ls_tree(&stdout)?
            .iter()
            .find(|entry| entry.path.as_os_str() == OsStr::new(&path))
            .map(ObjectIdentity::from)
            .ok_or(GitError::NotFound(NotFoundKind::Object))
    }

    /// Content hash of the object at `path` in `reference`
    pub async fn object_hash(&self, reference: &str, path: &str) -> GitResult<String> {
        Ok(self.resolve_object(reference, path).await?.hash)
    }

    /// Kind of the object at `path` in `reference`
    pub async fn object_kind(&self, reference: &str, path: &str) -> GitResult<ObjectKind> {
        Ok(self.resolve_object(reference, path).await?.kind)
    }

    /// True when no ref reaches any commit. Does not assume any branch exists.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn is_empty(&self) -> GitResult<bool> {
        let stdout = self.run(parser::total_commit_count_args()).await?;
        Ok(parser::parse_count(&stdout)? == 0)
    }

    /// Empty or Initialized
    pub async fn state(&self) -> GitResult<RepositoryState> {
        if self.is_empty().await? {
            Ok(RepositoryState::Empty)
        } else {
            Ok(RepositoryState::Initialized)
        }
    }

    /// Number of commits reachable from `reference`
    ///
    /// Zero without running the count at all when the repository has no
    /// branches, since counting would fail on a repository without refs.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn commit_count(&self, reference: &str) -> GitResult<u64> {
        let reference = validate_ref(reference)?;

        if self.all_branches().await?.is_empty() {
            return Ok(0);
        }

        match self.run(parser::commit_count_args(reference)).await {
            Ok(stdout) => parser::parse_count(&stdout),
            Err(e) => Err(self
                .explain_failure(e, reference, Peel::Commit, NotFoundKind::Commit)
                .await),
        }
    }
}
