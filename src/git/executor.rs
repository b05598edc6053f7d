use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{GitError, GitResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Result of executing a git command
///
/// `stdout` is kept as bytes; file names inside it need not be UTF-8.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl CommandOutput {
    /// Standard output of a command that exited 0 and wrote nothing to stderr.
    ///
    /// Anything else is a `ProcessFailure`; a warning on stderr is not
    /// treated as partial success.
    pub fn into_raw_stdout(self, command: &str) -> GitResult<Vec<u8>> {
        if !self.success || !self.stderr.trim().is_empty() {
            return Err(GitError::ProcessFailure {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            });
        }
        Ok(self.stdout)
    }

    /// [`into_raw_stdout`](Self::into_raw_stdout) decoded as text
    pub fn into_stdout(self, command: &str) -> GitResult<String> {
        let raw = self.into_raw_stdout(command)?;
        Ok(String::from_utf8(raw)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    /// Standard output as text, whatever the exit status
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Render an argument vector for logs and error messages
pub fn display_command(args: &[OsString]) -> String {
    let rendered: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
    format!("git {}", rendered.join(" "))
}

/// Runs one git process per call inside a repository directory
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run git with `args` in `repo` and return whatever it produced.
    ///
    /// Only a launch failure or a timeout is an `Err` here; a non-zero exit
    /// is reported through [`CommandOutput`].
    async fn execute(&self, repo: &Path, args: &[OsString]) -> GitResult<CommandOutput>;

    /// Run git and return stdout, failing on a non-zero exit or any stderr output
    async fn run(&self, repo: &Path, args: &[OsString]) -> GitResult<String> {
        let output = self.execute(repo, args).await?;
        output.into_stdout(&display_command(args))
    }

    /// Like [`run`](Self::run) but without decoding stdout
    async fn run_raw(&self, repo: &Path, args: &[OsString]) -> GitResult<Vec<u8>> {
        let output = self.execute(repo, args).await?;
        output.into_raw_stdout(&display_command(args))
    }
}

/// Knobs for [`GitExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub max_concurrent_processes: usize,
    pub locale: Option<String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout: Duration::from_secs(30),
            max_concurrent_processes: 32,
            locale: None,
        }
    }
}

impl From<&Config> for ExecutorOptions {
    fn from(config: &Config) -> Self {
        Self {
            binary: PathBuf::from(&config.git.binary),
            timeout: config.timeout(),
            max_concurrent_processes: config.git.max_concurrent_processes,
            locale: config.git.locale.clone(),
        }
    }
}

/// Executes git commands as tokio child processes
///
/// Cheap to clone; clones share the process budget and the audit log.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    options: ExecutorOptions,
    permits: Arc<Semaphore>,
    audit: Option<Arc<AuditLogger>>,
}

impl GitExecutor {
    /// Create a new GitExecutor
    pub fn new(options: ExecutorOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent_processes.max(1)));
        Self {
            options,
            permits,
            audit: None,
        }
    }

    /// Record every command in `logger`
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    fn command(&self, repo: &Path, args: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.options.binary);
        cmd.args(args)
            .current_dir(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_LITERAL_PATHSPECS", "1")
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Never let discovery climb out of the repository directory
        if let Some(parent) = repo.parent() {
            cmd.env("GIT_CEILING_DIRECTORIES", parent);
        }

        if let Some(locale) = &self.options.locale {
            cmd.env("LC_ALL", locale).env("LANG", locale);
        }

        cmd
    }

    /// Append to the audit log on the blocking pool, off the runtime workers
    async fn audit(&self, repo: &Path, command: &str, exit_code: Option<i32>, elapsed: Duration) {
        let Some(logger) = self.audit.clone() else {
            return;
        };

        let log_path = logger.log_path().to_path_buf();
        let repo = repo.to_path_buf();
        let command = command.to_string();
        let written = tokio::task::spawn_blocking(move || {
            logger.log_command(&repo, &command, exit_code, elapsed)
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, path = %log_path.display(), "failed to write audit log");
            }
            Err(e) => {
                warn!(error = %e, path = %log_path.display(), "audit log task failed");
            }
        }
    }

    /// Process command output into CommandOutput struct
    fn process_output(output: Output) -> CommandOutput {
        CommandOutput {
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
        }
    }
}

impl Default for GitExecutor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

#[async_trait]
impl GitRunner for GitExecutor {
    async fn execute(&self, repo: &Path, args: &[OsString]) -> GitResult<CommandOutput> {
        let command = display_command(args);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GitError::InvalidState("process limiter closed".to_string()))?;

        debug!(repo = %repo.display(), %command, "spawning git");
        let started = Instant::now();

        let child = match self.command(repo, args).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(repo = %repo.display(), %command, error = %e, "failed to launch git");
                self.audit(repo, &command, None, started.elapsed()).await;
                return Err(GitError::Launch(e));
            }
        };

        // Dropping the future on timeout drops the child, which kills it
        let waited = tokio::time::timeout(self.options.timeout, child.wait_with_output()).await;
        let elapsed = started.elapsed();

        match waited {
            Err(_) => {
                warn!(repo = %repo.display(), %command, ?elapsed, "git timed out, killed");
                self.audit(repo, &command, None, elapsed).await;
                Err(GitError::Timeout {
                    command,
                    after: self.options.timeout,
                })
            }
            Ok(Err(e)) => {
                warn!(repo = %repo.display(), %command, error = %e, "failed to collect git output");
                self.audit(repo, &command, None, elapsed).await;
                Err(GitError::Launch(e))
            }
            Ok(Ok(output)) => {
                let output = Self::process_output(output);
                debug!(
                    repo = %repo.display(),
                    %command,
                    exit_code = output.exit_code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "git finished"
                );
                self.audit(repo, &command, Some(output.exit_code), elapsed).await;
                Ok(output)
            }
        }
    }
}
