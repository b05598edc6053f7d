#![allow(dead_code)]

use async_trait::async_trait;
use gitmeta::git::{CommandOutput, GitExecutor, GitRunner, Repository};
use gitmeta::GitResult;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const USER_NAME: &str = "Test User";
pub const USER_EMAIL: &str = "test@example.com";

/// Run git synchronously for fixture setup and return stdout
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A bare repository at `<root>/alice/site.git` fed from a working clone
pub struct Fixture {
    temp: TempDir,
    pub root: PathBuf,
    pub bare: PathBuf,
    pub work: PathBuf,
}

impl Fixture {
    /// Bare repository with no commits; HEAD points at `master`
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("repositories");
        let bare = root.join("alice").join("site.git");
        let work = temp.path().join("work");
        fs::create_dir_all(&bare).expect("Failed to create repository directory");
        fs::create_dir_all(&work).expect("Failed to create work directory");

        git(&bare, &["init", "--bare"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        git(&work, &["init"]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        git(&work, &["config", "user.name", USER_NAME]);
        git(&work, &["config", "user.email", USER_EMAIL]);
        git(&work, &["config", "commit.gpgsign", "false"]);

        Self {
            temp,
            root,
            bare,
            work,
        }
    }

    /// Write `file` (creating directories) and commit it in the work clone
    pub fn commit(&self, file: &str, content: &str, message: &str) -> &Self {
        let path = self.work.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directories");
        }
        fs::write(&path, content).expect("Failed to write file");

        git(&self.work, &["add", "-A"]);
        git(&self.work, &["commit", "-q", "-m", message]);
        self
    }

    /// Push every branch and tag to the bare repository
    pub fn publish(&self) -> &Self {
        let bare = self.bare.to_str().expect("utf-8 temp path");
        git(&self.work, &["push", "-q", bare, "--all"]);
        git(&self.work, &["push", "-q", bare, "--tags"]);
        self
    }

    /// Run git inside the bare repository
    pub fn bare_git(&self, args: &[&str]) -> String {
        git(&self.bare, args)
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn repository(&self) -> Repository {
        Repository::new(&self.bare, Arc::new(GitExecutor::default()))
    }

    pub fn recorded_repository(&self) -> (Repository, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::new(GitExecutor::default()));
        let repo = Repository::new(&self.bare, runner.clone());
        (repo, runner)
    }
}

/// Passes commands to a real executor and remembers them
pub struct RecordingRunner {
    inner: GitExecutor,
    calls: Mutex<Vec<Vec<OsString>>>,
}

impl RecordingRunner {
    pub fn new(inner: GitExecutor) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<OsString>> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any recorded call starts with `prefix`
    pub fn ran(&self, prefix: &[&str]) -> bool {
        self.calls().iter().any(|call| {
            call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b)
        })
    }
}

#[async_trait]
impl GitRunner for RecordingRunner {
    async fn execute(&self, repo: &Path, args: &[OsString]) -> GitResult<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.inner.execute(repo, args).await
    }
}
