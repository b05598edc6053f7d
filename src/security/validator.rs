use thiserror::Error;

/// Longest ref name accepted from a request
pub const MAX_REF_LEN: usize = 256;

/// Longest repository-relative path accepted from a request
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty ref")]
    EmptyRef,

    #[error("Ref is too long ({0} bytes)")]
    RefTooLong(usize),

    #[error("Ref must not start with '-': {0}")]
    OptionLikeRef(String),

    #[error("Ref contains disallowed character {1:?}: {0}")]
    DisallowedRefChar(String, char),

    #[error("Ref contains disallowed sequence {1:?}: {0}")]
    DisallowedRefSequence(String, &'static str),

    #[error("Path is too long ({0} bytes)")]
    PathTooLong(usize),

    #[error("Path contains a control character")]
    ControlCharInPath,

    #[error("Path must be relative to the repository root: {0}")]
    AbsolutePath(String),

    #[error("Path escapes the repository root: {0}")]
    ParentTraversal(String),
}

/// Characters git itself refuses in ref names, or that switch a revision
/// argument into a different syntax (`master:path`, globs)
const FORBIDDEN_REF_CHARS: [char; 5] = [':', '?', '*', '[', '\\'];

/// Check a ref (branch, tag or commit hash) taken from an untrusted request.
///
/// Every name git accepts for a branch or tag passes, including non-ASCII
/// names and ones containing `+` or `@`. `~` and `^` stay allowed for
/// `HEAD~2` style ancestry. Rejected are option-like refs, whitespace and
/// control characters, and revision syntax that would change what the
/// argument means: ranges (`..`), reflog (`@{`), peeling (`^{`) and paths
/// (`:`).
pub fn validate_ref(reference: &str) -> Result<&str, ValidationError> {
    if reference.is_empty() {
        return Err(ValidationError::EmptyRef);
    }

    if reference.len() > MAX_REF_LEN {
        return Err(ValidationError::RefTooLong(reference.len()));
    }

    // Would be read as an option by git
    if reference.starts_with('-') {
        return Err(ValidationError::OptionLikeRef(reference.to_string()));
    }

    if let Some(c) = reference
        .chars()
        .find(|c| c.is_control() || c.is_whitespace() || FORBIDDEN_REF_CHARS.contains(c))
    {
        return Err(ValidationError::DisallowedRefChar(reference.to_string(), c));
    }

    for seq in ["..", "//", "@{", "^{"] {
        if reference.contains(seq) {
            return Err(ValidationError::DisallowedRefSequence(
                reference.to_string(),
                seq,
            ));
        }
    }

    for suffix in ["/", ".", ".lock"] {
        if reference.ends_with(suffix) {
            return Err(ValidationError::DisallowedRefSequence(
                reference.to_string(),
                suffix,
            ));
        }
    }

    Ok(reference)
}

/// Check and normalise a repository-relative path taken from an untrusted request.
///
/// Returns the path with any leading `./` and trailing `/` removed. An empty
/// result means the repository root.
pub fn validate_path(path: &str) -> Result<String, ValidationError> {
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::PathTooLong(path.len()));
    }

    if path.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharInPath);
    }

    if path.starts_with('/') {
        return Err(ValidationError::AbsolutePath(path.to_string()));
    }

    let mut normalized = path;
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest;
    }
    let normalized = normalized.trim_end_matches('/');
    if normalized == "." {
        return Ok(String::new());
    }

    if normalized.split('/').any(|component| component == "..") {
        return Err(ValidationError::ParentTraversal(path.to_string()));
    }

    Ok(normalized.to_string())
}
