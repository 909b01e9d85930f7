//! Error types for braid.
//!
//! Two families reach the caller:
//!
//! - [`LoadError`]: the input data is unusable. Raised before any replay
//!   starts, so there is nothing to recover.
//! - [`ReplayError`]: the run stopped part-way. The checkpoint and the
//!   resolution cache are left as they were at the last handled commit, so a
//!   later `resume` picks up where this run ended.
//!
//! A mergeable conflict is neither: it is an [`ApplyOutcome`] handled inside
//! the replay engine.
//!
//! [`ApplyOutcome`]: braid_git::ApplyOutcome

use std::io;
use std::path::PathBuf;

use braid_git::GitError;
use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::model::{CommitId, RepoId, ValidationError};
use crate::replay::{AbortReason, InvalidTransition};
use crate::resolution_cache::CacheError;

/// The commit logs or configuration cannot be turned into a timeline.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A commit log could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The log file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A commit log line is not `hash authorISO8601 commitISO8601`.
    #[error("{}:{line}: {reason}", .path.display())]
    MalformedLine {
        /// The log file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },

    /// An absorbed repository's `last_unique` commit is not in its history.
    #[error("last unique commit {boundary} not found in `{repository}`")]
    BoundaryNotFound {
        /// The absorbed repository.
        repository: RepoId,
        /// The configured boundary.
        boundary: CommitId,
    },

    /// A repository is referenced but was never loaded.
    #[error("repository `{repository}` is not among the configured sources")]
    UnknownRepository {
        /// The unknown name.
        repository: RepoId,
    },

    /// The same repository is listed twice.
    #[error("repository `{repository}` is configured more than once")]
    DuplicateRepository {
        /// The repeated name.
        repository: RepoId,
    },

    /// The resume point is not part of the timeline being replayed.
    #[error("checkpoint commit {commit} is not in the timeline")]
    CheckpointNotInTimeline {
        /// The commit that was asked for.
        commit: CommitId,
    },

    /// An identifier failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Listing a source repository's history failed.
    #[error("failed to list history of `{repository}`: {source}")]
    Listing {
        /// The source repository.
        repository: RepoId,
        /// Underlying port failure.
        #[source]
        source: GitError,
    },
}

/// A replay run stopped before reaching the end of the timeline.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The operator quit, or could not be asked.
    #[error("aborted by operator at {commit} from {repository} ({reason})")]
    OperatorAbort {
        /// The commit awaiting a decision.
        commit: CommitId,
        /// Its repository.
        repository: RepoId,
        /// Why the run stopped.
        reason: AbortReason,
    },

    /// The version-control port failed for a reason other than a conflict.
    #[error("git failed at {commit} from {repository}: {source}")]
    Tool {
        /// The commit being handled.
        commit: CommitId,
        /// Its repository.
        repository: RepoId,
        /// Underlying port failure.
        #[source]
        source: GitError,
    },

    /// The port failed outside any particular commit (setup, finalize).
    #[error("git failed while {action}: {source}")]
    Port {
        /// What the engine was doing.
        action: &'static str,
        /// Underlying port failure.
        #[source]
        source: GitError,
    },

    /// The engine tried to move a commit through a phase it cannot reach.
    #[error("{commit}: {source}")]
    InvalidTransition {
        /// The commit being handled.
        commit: CommitId,
        /// The refused transition.
        #[source]
        source: InvalidTransition,
    },

    /// A checkpoint save would move backwards in the timeline.
    #[error("checkpoint regression: position {attempted} is before {previous}")]
    CheckpointRegression {
        /// The last saved position.
        previous: usize,
        /// The position that was refused.
        attempted: usize,
    },

    /// The checkpoint or outcome ledger could not be written or read.
    #[error(transparent)]
    Checkpoint(CheckpointError),

    /// The resolution cache could not be written or read.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The resume point could not be located.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl From<CheckpointError> for ReplayError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::Regression {
                previous,
                attempted,
            } => Self::CheckpointRegression {
                previous,
                attempted,
            },
            other => Self::Checkpoint(other),
        }
    }
}

impl ReplayError {
    /// Whether the run ended because of the operator rather than a failure.
    #[must_use]
    pub const fn is_operator_abort(&self) -> bool {
        matches!(self, Self::OperatorAbort { .. })
    }
}
