//! Every git argument vector and output format used by this crate.
//!
//! Output is requested in machine-oriented shapes (NUL separated fields,
//! `-z` records) so that parsing does not depend on the locale or on how git
//! quotes unusual file names. Only `%cr` is human text, and it is passed
//! through untouched.

use crate::error::{GitError, GitResult};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};

/// `git log` format: hash, committer name, committer email, relative date, subject
pub const COMMIT_FORMAT: &str = "--format=%H%x00%cn%x00%ce%x00%cr%x00%s";

/// Short branch names, one per line
pub const BRANCH_FORMAT: &str = "--format=%(refname:short)";

const COMMIT_FIELDS: usize = 5;

fn owned(args: &[&str]) -> Vec<OsString> {
    args.iter().map(|s| OsString::from(*s)).collect()
}

/// `git branch --format=%(refname:short)`
pub fn branch_list_args() -> Vec<OsString> {
    owned(&["branch", BRANCH_FORMAT])
}

/// `git log -1 <format> <ref> -- [path]`
///
/// Paths are `OsStr` so a name read back from `ls-tree` reaches git byte for
/// byte, even when it is not UTF-8.
pub fn last_commit_args(reference: &str, path: Option<&OsStr>) -> Vec<OsString> {
    let mut args = owned(&["log", "-1", COMMIT_FORMAT, reference, "--"]);
    if let Some(path) = path {
        args.push(path.to_os_string());
    }
    args
}

/// `git ls-tree -z <ref> -- [path]`
///
/// With no path the root tree of `reference` is listed.
pub fn ls_tree_args(reference: &str, path: Option<&OsStr>) -> Vec<OsString> {
    let mut args = owned(&["ls-tree", "-z", reference, "--"]);
    if let Some(path) = path {
        args.push(path.to_os_string());
    }
    args
}

/// `git rev-list --count <ref> --`
pub fn commit_count_args(reference: &str) -> Vec<OsString> {
    owned(&["rev-list", "--count", reference, "--"])
}

/// `git rev-list --all --count`, zero on a repository without commits
pub fn total_commit_count_args() -> Vec<OsString> {
    owned(&["rev-list", "--all", "--count"])
}

/// What a ref must peel to in [`verify_args`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peel {
    Commit,
    Tree,
}

/// `git rev-parse --verify --quiet <ref>^{commit|tree}`
///
/// Exits 1 with no output when the ref does not name such an object.
pub fn verify_args(reference: &str, peel: Peel) -> Vec<OsString> {
    let suffix = match peel {
        Peel::Commit => "^{commit}",
        Peel::Tree => "^{tree}",
    };
    owned(&["rev-parse", "--verify", "--quiet", &format!("{}{}", reference, suffix)])
}

/// Parse `git branch --format=%(refname:short)` output
///
/// Blank lines are dropped and surrounding whitespace is trimmed so that
/// trailing spaces can never produce two spellings of one branch. Entries
/// git prints for a detached HEAD, like `(HEAD detached at 1a2b3c)`, are not
/// branches and are skipped.
pub fn parse_branch_list(output: &str) -> Vec<String> {
    let mut branches: Vec<String> = Vec::new();

    for line in output.lines() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('(') {
            continue;
        }
        if !branches.iter().any(|b| b == name) {
            branches.push(name.to_string());
        }
    }

    branches
}

/// Parse a single [`COMMIT_FORMAT`] record
///
/// Returns `Ok(None)` when git matched no commit (empty output or empty
/// hash); a [`Commit`] is never built around an empty hash.
pub fn parse_commit(output: &str) -> GitResult<Option<Commit>> {
    let record = output.trim_end_matches(['\n', '\r']);
    if record.trim().is_empty() {
        return Ok(None);
    }

    // Only the first record matters; `-1` should make it the only one
    let record = record.lines().next().unwrap_or_default();

    let fields: Vec<&str> = record.splitn(COMMIT_FIELDS, '\0').collect();
    if fields.len() != COMMIT_FIELDS {
        return Err(GitError::ParseError(format!(
            "Expected {} commit fields, got {}: {:?}",
            COMMIT_FIELDS,
            fields.len(),
            record
        )));
    }

    let hash = fields[0].trim();
    if hash.is_empty() {
        return Ok(None);
    }

    Ok(Some(Commit {
        commit_hash: hash.to_string(),
        committer_name: fields[1].to_string(),
        committer_email: fields[2].to_string(),
        relative_time: fields[3].to_string(),
        subject: fields[4].to_string(),
    }))
}

/// Parse `git ls-tree -z` output into its records
///
/// Works on raw bytes: git stores file names as bytes and does not promise
/// they are UTF-8.
pub fn parse_ls_tree<B: AsRef<[u8]> + ?Sized>(output: &B) -> GitResult<Vec<LsTreeEntry>> {
    output
        .as_ref()
        .split(|b| *b == 0)
        .map(|record| {
            let start = record.iter().position(|b| *b != b'\n').unwrap_or(record.len());
            &record[start..]
        })
        .filter(|record| !record.is_empty())
        .map(parse_ls_tree_entry)
        .collect()
}

/// Parse one `<mode> SP <kind> SP <hash> TAB <path>` record
pub fn parse_ls_tree_entry(record: &[u8]) -> GitResult<LsTreeEntry> {
    let malformed = |what: &str| {
        GitError::ParseError(format!(
            "{} in ls-tree record: {:?}",
            what,
            String::from_utf8_lossy(record)
        ))
    };

    let tab = record
        .iter()
        .position(|b| *b == b'\t')
        .ok_or_else(|| malformed("Missing path"))?;
    let (meta, path) = (&record[..tab], &record[tab + 1..]);
    let meta = std::str::from_utf8(meta).map_err(|_| malformed("Non-ASCII header"))?;

    let parts: Vec<&str> = meta.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(malformed("Expected mode, kind and hash"));
    }

    let kind = ObjectKind::from_marker(parts[1]).ok_or_else(|| {
        GitError::ParseError(format!("Unknown object kind {:?} in ls-tree record", parts[1]))
    })?;

    if path.is_empty() {
        return Err(malformed("Empty path"));
    }

    Ok(LsTreeEntry {
        mode: parts[0].to_string(),
        kind,
        hash: parts[2].to_string(),
        path: path_from_bytes(path),
    })
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    OsStr::from_bytes(bytes).to_os_string()
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Parse the single number printed by `git rev-list --count`
pub fn parse_count(output: &str) -> GitResult<u64> {
    let trimmed = output.trim();
    trimmed
        .parse::<u64>()
        .map_err(|_| GitError::ParseError(format!("Invalid commit count: {:?}", trimmed)))
}

/// Kind of object a tree entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
}

impl ObjectKind {
    /// Map the kind column of `ls-tree`
    ///
    /// Submodule links (`commit`) have no tree of their own here and are
    /// shown as files.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "blob" | "commit" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent commit for a ref or path
///
/// Only [`parse_commit`] builds these, so `commit_hash` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    commit_hash: String,
    committer_name: String,
    committer_email: String,
    relative_time: String,
    subject: String,
}

impl Commit {
    pub fn commit_hash(&self) -> &str {
        &self.commit_hash
    }

    pub fn committer_name(&self) -> &str {
        &self.committer_name
    }

    pub fn committer_email(&self) -> &str {
        &self.committer_email
    }

    /// Elapsed time as git phrases it, e.g. "3 days ago"
    pub fn relative_time(&self) -> &str {
        &self.relative_time
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// One raw `ls-tree` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsTreeEntry {
    pub mode: String,
    pub kind: ObjectKind,
    pub hash: String,
    /// Exactly as stored in the tree
    pub path: OsString,
}

impl LsTreeEntry {
    /// `path` for display; bytes that are not UTF-8 become U+FFFD
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// One immediate child of a directory, with the last commit touching it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub kind: ObjectKind,
    pub path: String,
    pub last_commit: Commit,
}

/// Content hash and kind of a ref+path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub hash: String,
    pub kind: ObjectKind,
}

impl From<&LsTreeEntry> for ObjectIdentity {
    fn from(entry: &LsTreeEntry) -> Self {
        ObjectIdentity {
            hash: entry.hash.clone(),
            kind: entry.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOB_HASH: &str = "bbdf566e2f8da7288558241c5ffba6c32f943826";
    const TREE_HASH: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    #[test]
    fn test_parse_branch_list() {
        let branches = parse_branch_list("dev\nfeature/x\nmaster\n");
        assert_eq!(branches, vec!["dev", "feature/x", "master"]);
    }

    #[test]
    fn test_parse_branch_list_whitespace_and_blanks() {
        let branches = parse_branch_list("master  \n\n  dev\nmaster\n\n");
        assert_eq!(branches, vec!["master", "dev"]);
    }

    #[test]
    fn test_parse_branch_list_skips_detached_head() {
        let branches = parse_branch_list("(HEAD detached at 1a2b3c4)\nmaster\n");
        assert_eq!(branches, vec!["master"]);
    }

    #[test]
    fn test_parse_commit() {
        let output = format!(
            "{}\0Test User\0test@example.com\02 hours ago\0Add README\n",
            BLOB_HASH
        );
        let commit = parse_commit(&output).unwrap().unwrap();

        assert_eq!(commit.commit_hash(), BLOB_HASH);
        assert_eq!(commit.committer_name(), "Test User");
        assert_eq!(commit.committer_email(), "test@example.com");
        assert_eq!(commit.relative_time(), "2 hours ago");
        assert_eq!(commit.subject(), "Add README");
    }

    #[test]
    fn test_parse_commit_empty_subject() {
        let output = format!("{}\0Test User\0test@example.com\0now\0", BLOB_HASH);
        let commit = parse_commit(&output).unwrap().unwrap();
        assert_eq!(commit.subject(), "");
    }

    #[test]
    fn test_parse_commit_subject_keeps_separators() {
        // splitn leaves anything after the fourth NUL in the subject
        let output = format!("{}\0n\0e\0now\0a\0b", BLOB_HASH);
        let commit = parse_commit(&output).unwrap().unwrap();
        assert_eq!(commit.subject(), "a\0b");
    }

    #[test]
    fn test_parse_commit_no_match() {
        assert_eq!(parse_commit("").unwrap(), None);
        assert_eq!(parse_commit("\n").unwrap(), None);
        assert_eq!(parse_commit("\0\0\0\0").unwrap(), None);
    }

    #[test]
    fn test_parse_commit_malformed() {
        let result = parse_commit("abc123\0only two");
        assert!(matches!(result, Err(GitError::ParseError(_))));
    }

    #[test]
    fn test_parse_ls_tree() {
        let output = format!(
            "100644 blob {}\tREADME.md\0040000 tree {}\tsrc\0",
            BLOB_HASH, TREE_HASH
        );
        let entries = parse_ls_tree(&output).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mode, "100644");
        assert_eq!(entries[0].kind, ObjectKind::Blob);
        assert_eq!(entries[0].hash, BLOB_HASH);
        assert_eq!(entries[0].path, "README.md");
        assert_eq!(entries[1].kind, ObjectKind::Tree);
        assert_eq!(entries[1].path, "src");
    }

    #[test]
    fn test_parse_ls_tree_unusual_names() {
        let output = format!(
            "100644 blob {}\tmy file\twith tab.txt\0100644 blob {}\tsrc/\"quoted\".rs\0",
            BLOB_HASH, BLOB_HASH
        );
        let entries = parse_ls_tree(&output).unwrap();

        assert_eq!(entries[0].path, "my file\twith tab.txt");
        assert_eq!(entries[1].path, "src/\"quoted\".rs");
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_ls_tree_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let mut output = format!("100644 blob {}\t", BLOB_HASH).into_bytes();
        output.extend_from_slice(b"caf\xe9.txt\0");
        let entries = parse_ls_tree(&output).unwrap();

        assert_eq!(entries[0].path.as_bytes(), b"caf\xe9.txt");
        assert_eq!(entries[0].display_path(), "caf\u{FFFD}.txt");
    }

    #[test]
    fn test_parse_ls_tree_submodule() {
        let output = format!("160000 commit {}\tvendor/lib\0", BLOB_HASH);
        let entries = parse_ls_tree(&output).unwrap();
        assert_eq!(entries[0].kind, ObjectKind::Blob);
    }

    #[test]
    fn test_parse_ls_tree_malformed() {
        assert!(parse_ls_tree("100644 blob abc").is_err());
        assert!(parse_ls_tree("100644 blob\tREADME.md").is_err());
        assert!(parse_ls_tree("100644 symlink abc\tREADME.md").is_err());
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("42\n").unwrap(), 42);
        assert_eq!(parse_count("0").unwrap(), 0);
        assert!(parse_count("").is_err());
        assert!(parse_count("many").is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_branch_list("").is_empty());
        assert!(parse_ls_tree("").unwrap().is_empty());
    }

    #[test]
    fn test_argument_vectors() {
        assert_eq!(
            last_commit_args("master", Some(OsStr::new("src/lib.rs"))),
            vec!["log", "-1", COMMIT_FORMAT, "master", "--", "src/lib.rs"]
        );
        assert_eq!(
            last_commit_args("master", None),
            vec!["log", "-1", COMMIT_FORMAT, "master", "--"]
        );
        assert_eq!(
            ls_tree_args("dev", Some(OsStr::new("src/"))),
            vec!["ls-tree", "-z", "dev", "--", "src/"]
        );
        assert_eq!(commit_count_args("dev"), vec!["rev-list", "--count", "dev", "--"]);
        assert_eq!(
            verify_args("dev", Peel::Tree),
            vec!["rev-parse", "--verify", "--quiet", "dev^{tree}"]
        );
    }

    #[test]
    fn test_object_kind_serialization() {
        assert_eq!(serde_json::to_string(&ObjectKind::Blob).unwrap(), "\"blob\"");
        assert_eq!(serde_json::to_string(&ObjectKind::Tree).unwrap(), "\"tree\"");
        assert_eq!(ObjectKind::Tree.to_string(), "tree");
    }

    #[test]
    fn test_commit_serializes_camel_case() {
        let output = format!("{}\0n\0e@x\0now\0s", BLOB_HASH);
        let commit = parse_commit(&output).unwrap().unwrap();
        let json = serde_json::to_value(&commit).unwrap();

        assert_eq!(json["commitHash"], BLOB_HASH);
        assert_eq!(json["committerEmail"], "e@x");
        assert_eq!(json["relativeTime"], "now");
    }
}
