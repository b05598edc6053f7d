use crate::error::{GitError, GitResult};
use crate::git::executor::GitRunner;
use std::ffi::OsString;
use std::path::Path;

/// Oldest git whose `branch --format`, `ls-tree -z` and `rev-parse --verify`
/// behave the way the parser expects
const MIN_GIT_VERSION: (u32, u32) = (2, 20);

/// Version reported by `git --version`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Ask the configured git binary for its version
    pub async fn detect(runner: &dyn GitRunner) -> GitResult<Self> {
        let stdout = runner
            .run(Path::new("."), &[OsString::from("--version")])
            .await?;
        Self::parse(&stdout)
    }

    /// Parse `git version 2.39.2`, tolerating vendor suffixes such as
    /// `2.39.2.windows.1` or `2.39.3 (Apple Git-146)`
    pub fn parse(version_str: &str) -> GitResult<Self> {
        let number = version_str
            .trim()
            .strip_prefix("git version ")
            .and_then(|rest| rest.split_whitespace().next())
            .ok_or_else(|| {
                GitError::ParseError(format!("Unexpected git version format: {}", version_str))
            })?;

        let mut components = number.split('.');
        let mut next_number = |required: bool| -> GitResult<u32> {
            match components.next() {
                Some(c) => c.parse::<u32>().or_else(|_| {
                    if required {
                        Err(GitError::ParseError(format!("Invalid git version: {}", number)))
                    } else {
                        Ok(0)
                    }
                }),
                None if required => {
                    Err(GitError::ParseError(format!("Invalid git version: {}", number)))
                }
                None => Ok(0),
            }
        };

        Ok(GitVersion {
            major: next_number(true)?,
            minor: next_number(true)?,
            patch: next_number(false)?,
        })
    }

    pub fn is_supported(&self) -> bool {
        (self.major, self.minor) >= MIN_GIT_VERSION
    }

    /// Detect the version and fail if it is older than 2.20
    pub async fn validate(runner: &dyn GitRunner) -> GitResult<Self> {
        let version = Self::detect(runner).await?;

        if !version.is_supported() {
            return Err(GitError::GitVersionTooOld(version.to_string()));
        }

        Ok(version)
    }
}

impl std::fmt::Display for GitVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
