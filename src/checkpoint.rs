//! Checkpoint file and outcome ledger.
//!
//! The checkpoint (`<data_dir>/commit`) holds the hash of the last commit
//! fully handled, applied or skipped, followed by a newline. Its presence
//! is what `resume` reads.
//!
//! The outcome ledger (`<data_dir>/outcomes.jsonl`) gets one JSON line per
//! handled commit, written just before the checkpoint moves. On resume it
//! re-seeds the applied-fingerprint set, so deduplication decisions after a
//! resume match an uninterrupted run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::durable;
use crate::model::CommitId;
use crate::replay::CommitOutcome;

/// The checkpoint or ledger could not be read or written.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("checkpoint I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The checkpoint file does not hold a commit hash.
    #[error("invalid checkpoint file {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },

    /// A save would move the checkpoint backwards within one run.
    #[error("checkpoint regression: position {attempted} is before {previous}")]
    Regression { previous: usize, attempted: usize },
}

/// Reads and writes the checkpoint file and the outcome ledger.
///
/// Tracks the timeline position of the last save so that, within one run,
/// the checkpoint can only move forward.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    ledger_path: PathBuf,
    last_position: Option<usize>,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ledger_path: ledger_path.into(),
            last_position: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of the last save made through this store.
    #[must_use]
    pub const fn last_position(&self) -> Option<usize> {
        self.last_position
    }

    /// The saved checkpoint, `None` if there is none.
    ///
    /// # Errors
    /// I/O failures other than a missing file, or a file that does not hold
    /// a valid commit hash.
    pub fn load(&self) -> Result<Option<CommitId>, CheckpointError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let hash = text.trim();
        if hash.is_empty() {
            return Ok(None);
        }
        CommitId::new(hash)
            .map(Some)
            .map_err(|e| CheckpointError::Invalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Record `commit`, at timeline `position`, as the last handled commit.
    ///
    /// # Errors
    /// [`CheckpointError::Regression`] if `position` is before the previous
    /// save, or an I/O failure.
    pub fn save(&mut self, commit: CommitId, position: usize) -> Result<(), CheckpointError> {
        if let Some(previous) = self.last_position {
            if position < previous {
                return Err(CheckpointError::Regression {
                    previous,
                    attempted: position,
                });
            }
        }
        durable::write_atomic(&self.path, format!("{commit}\n").as_bytes()).map_err(|source| {
            CheckpointError::Io {
                path: self.path.clone(),
                source,
            }
        })?;
        self.last_position = Some(position);
        debug!(%commit, position, "checkpoint saved");
        Ok(())
    }

    /// Append one handled commit to the outcome ledger.
    ///
    /// # Errors
    /// I/O failure.
    pub fn append_outcome(&self, outcome: &CommitOutcome) -> Result<(), CheckpointError> {
        durable::append_json_line(&self.ledger_path, outcome).map_err(|source| {
            CheckpointError::Io {
                path: self.ledger_path.clone(),
                source,
            }
        })
    }

    /// Every ledger entry, oldest first. A missing ledger is empty.
    ///
    /// # Errors
    /// I/O failure or a corrupt line.
    pub fn load_ledger(&self) -> Result<Vec<CommitOutcome>, CheckpointError> {
        durable::read_json_lines(&self.ledger_path).map_err(|source| CheckpointError::Io {
            path: self.ledger_path.clone(),
            source,
        })
    }

    /// Remove the checkpoint and ledger before a fresh run.
    ///
    /// # Errors
    /// I/O failures other than the files being absent.
    pub fn reset(&mut self) -> Result<(), CheckpointError> {
        for path in [&self.path, &self.ledger_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CheckpointError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }
        self.last_position = None;
        Ok(())
    }
}
