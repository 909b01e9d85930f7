//! Sequential replay of the timeline into the result history.
//!
//! - [`phase`]: per-commit phase machine and trace.
//! - [`state`]: run state, outcomes and the summary.
//! - [`operator`]: the [`Operator`] seam for unresolved conflicts.
//! - [`engine`]: the [`ReplayEngine`] that ties them together.

pub mod engine;
pub mod operator;
pub mod phase;
pub mod state;

pub use engine::{Progress, ReplayEngine};
pub use operator::{
    AbortReason, ConflictPrompt, Directive, FailFastOperator, Operator, OperatorError,
    ScriptedOperator,
};
pub use phase::{CommitPhase, InvalidTransition, PhaseTrace};
pub use state::{
    CommitOutcome, Disposition, ReplayState, ReplaySummary, Resolution, RunStatus, SkipReason,
};
