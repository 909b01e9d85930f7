//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all
//! [`ReplayRepo`](crate::ReplayRepo) methods. A mergeable conflict is *not* an
//! error. It is reported as [`ApplyOutcome::Conflict`](crate::ApplyOutcome).
//! Anything that surfaces as a `GitError` means the underlying tool failed for
//! some other reason and the replay cannot safely continue.

use thiserror::Error;

/// Errors returned by [`ReplayRepo`](crate::ReplayRepo) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested object, revision, or path was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid OID `{value}`: {reason}")]
    InvalidOid {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// A git subprocess exited unsuccessfully.
    #[error("`{command}` failed (exit code {}): {stderr}", .exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string()))]
    Command {
        /// The command line that was run (e.g. `"git cherry-pick --skip"`).
        command: String,
        /// Captured stderr, trimmed.
        stderr: String,
        /// Exit code, `None` if the process was killed by a signal.
        exit_code: Option<i32>,
    },

    /// Output from git could not be interpreted.
    #[error("unexpected git output from `{command}`: {message}")]
    UnexpectedOutput {
        /// The command whose output was malformed.
        command: String,
        /// What was wrong with it.
        message: String,
    },

    /// No application is in progress but the caller asked to continue,
    /// skip, or resolve one.
    #[error("no patch application in progress")]
    NothingInProgress,

    /// An I/O error occurred (file system, process spawn, etc.).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The gix backend returned an unclassified error.
    #[error("git backend error: {message}")]
    BackendError {
        /// Freeform error description from the backend.
        message: String,
    },
}

impl From<crate::types::OidParseError> for GitError {
    fn from(e: crate::types::OidParseError) -> Self {
        Self::InvalidOid {
            value: e.value,
            reason: e.reason,
        }
    }
}
