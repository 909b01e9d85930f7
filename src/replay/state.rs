//! Run state and per-commit outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::fingerprint::{AppliedSet, Fingerprint};
use crate::model::{CommitId, RepoId};
use crate::replay::phase::CommitPhase;
use crate::timeline::Timeline;

/// How an applied commit got past its conflicts, if it had any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Clean,
    Cached,
    Operator,
}

/// Why a commit left the result history unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The normalized patch is empty.
    EmptyPatch,
    /// An equivalent patch was already applied.
    Equivalent { original: CommitId },
    /// The operator chose skip.
    Operator,
}

/// Terminal disposition of one commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    Applied { resolution: Resolution },
    Skipped { reason: SkipReason },
}

impl Disposition {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// One line of the outcome ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub commit: CommitId,
    pub repository: RepoId,
    /// Index in the timeline.
    pub position: usize,
    pub disposition: Disposition,
    /// Fingerprint of the applied patch; `None` for empty patches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    pub trace: Vec<CommitPhase>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

/// Mutable state of one replay run.
#[derive(Clone, Debug)]
pub struct ReplayState {
    /// Index of the next commit to handle.
    pub position: usize,
    pub applied: AppliedSet,
    /// Last fully handled commit.
    pub checkpoint: Option<CommitId>,
    pub resuming: bool,
    pub status: RunStatus,
    /// Outcomes of this run only (not of earlier runs being resumed).
    pub outcomes: Vec<CommitOutcome>,
}

impl ReplayState {
    /// State for a run starting at the first commit.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            position: 0,
            applied: AppliedSet::new(),
            checkpoint: None,
            resuming: false,
            status: RunStatus::Running,
            outcomes: Vec::new(),
        }
    }

    /// State for a run continuing after `checkpoint`.
    ///
    /// The applied set is re-seeded from `ledger`: every applied outcome at or
    /// before the checkpoint whose commit matches the timeline at that
    /// position. Entries from other timelines are ignored.
    ///
    /// # Errors
    /// [`LoadError::CheckpointNotInTimeline`] if `checkpoint` is not in
    /// `timeline`.
    pub fn resume(
        timeline: &Timeline,
        checkpoint: CommitId,
        ledger: &[CommitOutcome],
    ) -> Result<Self, LoadError> {
        let at = timeline.require_position(checkpoint)?;
        let mut applied = AppliedSet::new();
        for outcome in ledger {
            if outcome.position > at || !outcome.disposition.is_applied() {
                continue;
            }
            let matches = timeline
                .commits()
                .get(outcome.position)
                .is_some_and(|c| c.hash() == outcome.commit);
            if let (true, Some(fp)) = (matches, &outcome.fingerprint) {
                applied.record(fp.clone(), outcome.commit);
            }
        }
        Ok(Self {
            position: at + 1,
            applied,
            checkpoint: Some(checkpoint),
            resuming: true,
            status: RunStatus::Running,
            outcomes: Vec::new(),
        })
    }

    /// Account for a fully handled commit and move past it.
    pub fn record(&mut self, outcome: CommitOutcome) {
        if let (true, Some(fp)) = (outcome.disposition.is_applied(), &outcome.fingerprint) {
            self.applied.record(fp.clone(), outcome.commit);
        }
        self.checkpoint = Some(outcome.commit);
        self.position = outcome.position + 1;
        self.outcomes.push(outcome);
    }

    /// Counts over this run's outcomes.
    #[must_use]
    pub fn summary(&self) -> ReplaySummary {
        let mut summary = ReplaySummary {
            status: self.status,
            ..ReplaySummary::default()
        };
        for outcome in &self.outcomes {
            match &outcome.disposition {
                Disposition::Applied { resolution } => match resolution {
                    Resolution::Clean => summary.applied_clean += 1,
                    Resolution::Cached => summary.applied_cached += 1,
                    Resolution::Operator => summary.applied_operator += 1,
                },
                Disposition::Skipped { reason } => match reason {
                    SkipReason::EmptyPatch => summary.skipped_empty += 1,
                    SkipReason::Equivalent { .. } => summary.skipped_equivalent += 1,
                    SkipReason::Operator => summary.skipped_operator += 1,
                },
            }
        }
        summary
    }
}

/// What a run did, by disposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplaySummary {
    pub status: RunStatus,
    pub applied_clean: usize,
    pub applied_cached: usize,
    pub applied_operator: usize,
    pub skipped_empty: usize,
    pub skipped_equivalent: usize,
    pub skipped_operator: usize,
}

impl Default for ReplaySummary {
    fn default() -> Self {
        Self {
            status: RunStatus::Running,
            applied_clean: 0,
            applied_cached: 0,
            applied_operator: 0,
            skipped_empty: 0,
            skipped_equivalent: 0,
            skipped_operator: 0,
        }
    }
}

impl ReplaySummary {
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.applied_clean + self.applied_cached + self.applied_operator
    }

    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped_empty + self.skipped_equivalent + self.skipped_operator
    }

    #[must_use]
    pub const fn handled(&self) -> usize {
        self.applied() + self.skipped()
    }
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "applied {} ({} clean, {} cached, {} by operator)",
            self.applied(),
            self.applied_clean,
            self.applied_cached,
            self.applied_operator
        )?;
        write!(
            f,
            "skipped {} ({} empty, {} equivalent, {} by operator)",
            self.skipped(),
            self.skipped_empty,
            self.skipped_equivalent,
            self.skipped_operator
        )
    }
}
