//! Per-commit replay phases.
//!
//! ```text
//! Applying ──→ Applied
//!    │  └────→ Skipped            (empty or equivalent patch)
//!    ↓
//! Conflict ──→ Applied            (cached resolution)
//!    ↓
//! AwaitingOperator ⟲ ──→ Applied  (fix)
//!                   └──→ Skipped  (skip)
//! ```
//!
//! `quit` has no per-commit phase: the run itself aborts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where one commit is in the replay state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    /// Fingerprinted and being applied.
    Applying,
    /// The port reported a conflict.
    Conflict,
    /// Waiting for a fix/skip/quit directive.
    AwaitingOperator,
    /// Committed to the result history.
    Applied,
    /// Handled without changing the result history.
    Skipped,
}

impl CommitPhase {
    /// Returns `true` for `Applied` and `Skipped`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Skipped)
    }

    /// Returns the set of valid next phases from this phase.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Applying => &[Self::Applied, Self::Conflict, Self::Skipped],
            Self::Conflict => &[Self::Applied, Self::AwaitingOperator],
            Self::AwaitingOperator => &[Self::AwaitingOperator, Self::Applied, Self::Skipped],
            Self::Applied | Self::Skipped => &[],
        }
    }

    /// Check whether transitioning to `next` is valid.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applying => write!(f, "applying"),
            Self::Conflict => write!(f, "conflict"),
            Self::AwaitingOperator => write!(f, "awaiting-operator"),
            Self::Applied => write!(f, "applied"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// The phases one commit went through, starting at `Applying`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseTrace {
    phases: Vec<CommitPhase>,
}

/// A transition the state machine does not allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: CommitPhase,
    pub to: CommitPhase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid commit phase transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl PhaseTrace {
    #[must_use]
    pub fn start() -> Self {
        Self {
            phases: vec![CommitPhase::Applying],
        }
    }

    #[must_use]
    pub fn current(&self) -> CommitPhase {
        self.phases
            .last()
            .copied()
            .unwrap_or(CommitPhase::Applying)
    }

    /// Move to `next`, validating the transition.
    ///
    /// # Errors
    /// [`InvalidTransition`] if `next` is not reachable from the current
    /// phase; the trace is unchanged.
    pub fn advance(&mut self, next: CommitPhase) -> Result<(), InvalidTransition> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }
        self.phases.push(next);
        Ok(())
    }

    #[must_use]
    pub fn into_phases(self) -> Vec<CommitPhase> {
        self.phases
    }
}
