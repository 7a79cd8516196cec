//! Core error taxonomy.
//!
//! Every fallible operation in the deployment core returns `CoreError`
//! (never a bare `anyhow::Error`); the CLI shell is the only layer that
//! wraps these in `anyhow` for `.context(...)` chaining.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("profile already exists: {0}")]
    DuplicateProfile(String),

    #[error("mod already present in profile: {0}")]
    DuplicateModInProfile(String),

    #[error("dependency cycle detected at {0}")]
    DependencyLoop(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("path conflict(s): {}", format_owners(.0))]
    Conflict(Vec<(String, String)>),

    #[error("checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: String, got: String },

    #[error("cache entry missing for {0}")]
    CacheMissing(String),

    #[error("no checksum recorded for {0}")]
    NoChecksum(String),

    #[error("download failed after retries: {0}")]
    DownloadFailed(String),

    #[error("hook script not found: {0}")]
    HookNotFound(String),

    #[error("hook script not executable: {0}")]
    HookNotExecutable(String),

    #[error("hook {slot} failed with exit code {code}: {stderr}")]
    HookFailed {
        slot: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("hook {0} timed out")]
    HookTimeout(String),

    #[error("profile switch failed: {primary}{}", rollback_suffix(.rollback))]
    SwitchFailed {
        primary: Box<CoreError>,
        rollback: Option<Box<CoreError>>,
    },

    #[error("invalid override path: {0}")]
    InvalidOverride(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("data root is locked by another process")]
    LockHeld,

    #[error("{0}")]
    Multiple(JoinedErrors),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(String),
}

/// A stably-ordered collection of errors rendered with a "; " separator,
/// used by batch operations and rollback compensations.
#[derive(Debug)]
pub struct JoinedErrors(pub Vec<CoreError>);

impl fmt::Display for JoinedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

fn format_owners(owners: &[(String, String)]) -> String {
    owners
        .iter()
        .map(|(path, owner)| format!("{path} (owned by {owner})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rollback_suffix(rollback: &Option<Box<CoreError>>) -> String {
    match rollback {
        Some(err) => format!(" (rollback: {err})"),
        None => String::new(),
    }
}

impl CoreError {
    pub fn switch_failed(primary: CoreError, rollback: Option<CoreError>) -> Self {
        CoreError::SwitchFailed {
            primary: Box::new(primary),
            rollback: rollback.map(Box::new),
        }
    }
}

/// Collapse a batch of errors collected during rollback/compensation into a
/// single error: `None` for an empty batch, the lone error when there is
/// exactly one, else `Multiple` preserving encounter order.
pub fn join_errors(mut errors: Vec<CoreError>) -> Option<CoreError> {
    match errors.len() {
        0 => None,
        1 => Some(errors.remove(0)),
        _ => Some(CoreError::Multiple(JoinedErrors(errors))),
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
