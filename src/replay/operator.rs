//! The operator seam: who decides what to do with an unresolved conflict.
//!
//! The engine stops at `AwaitingOperator` and asks an [`Operator`] for a
//! [`Directive`]. The terminal implementation lives in the CLI;
//! [`ScriptedOperator`] replays a fixed list of answers for tests and
//! [`FailFastOperator`] refuses to decide at all.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::Duration;

use braid_git::ConflictDetails;
use thiserror::Error;

use crate::model::{Commit, CommitId};

/// What to do with a conflicted commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// The working state has been reconciled; finalize the application.
    Fix,
    /// Drop this commit's change.
    Skip,
    /// Stop the run.
    Quit,
}

/// Everything shown to the operator about one conflict.
#[derive(Debug)]
pub struct ConflictPrompt<'a> {
    pub commit: &'a Commit,
    pub details: &'a ConflictDetails,
    /// 1 on the first ask, incremented after each failed fix.
    pub attempt: usize,
}

/// The operator could not produce a directive.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("no answer within {0:?}")]
    TimedOut(Duration),

    #[error("input closed")]
    InputClosed,

    #[error("running non-interactively")]
    NonInteractive,

    #[error("operator I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("scripted operator has no answer left")]
    ScriptExhausted,
}

/// Decides the fate of conflicts the cache could not resolve.
pub trait Operator {
    /// Produce a directive for `prompt`.
    ///
    /// For [`Directive::Fix`], the working state must already be reconciled
    /// when this returns.
    ///
    /// # Errors
    /// Any [`OperatorError`]; the engine treats it as a quit.
    fn decide(&mut self, prompt: &ConflictPrompt<'_>) -> Result<Directive, OperatorError>;

    /// Called when a fix could not be finalized, before asking again.
    fn fix_failed(&mut self, _prompt: &ConflictPrompt<'_>) {}
}

/// Why a run was aborted at a conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The operator chose quit.
    Quit,
    /// Nobody answered in time.
    TimedOut,
    /// The input stream ended.
    InputClosed,
    /// No operator was available.
    NonInteractive,
    /// Any other operator failure.
    Failed(String),
}

impl From<&OperatorError> for AbortReason {
    fn from(e: &OperatorError) -> Self {
        match e {
            OperatorError::TimedOut(_) => Self::TimedOut,
            OperatorError::InputClosed => Self::InputClosed,
            OperatorError::NonInteractive => Self::NonInteractive,
            other => Self::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "quit"),
            Self::TimedOut => write!(f, "timed out waiting for an answer"),
            Self::InputClosed => write!(f, "input closed"),
            Self::NonInteractive => write!(f, "conflict needs an operator"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// FailFastOperator
// ---------------------------------------------------------------------------

/// Operator for non-interactive runs: every conflict aborts.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailFastOperator;

impl Operator for FailFastOperator {
    fn decide(&mut self, _prompt: &ConflictPrompt<'_>) -> Result<Directive, OperatorError> {
        Err(OperatorError::NonInteractive)
    }
}

// ---------------------------------------------------------------------------
// ScriptedOperator
// ---------------------------------------------------------------------------

type FixAction<'a> = Box<dyn FnMut() + 'a>;

enum Step<'a> {
    Fix(Option<FixAction<'a>>),
    Skip,
    Quit,
    Fail(OperatorError),
}

/// Answers conflicts from a fixed script, in order.
///
/// A fix step may carry a closure that performs the reconciliation (for
/// example editing a fake working tree) before the engine finalizes.
#[derive(Default)]
pub struct ScriptedOperator<'a> {
    steps: VecDeque<Step<'a>>,
    asked: Vec<(CommitId, usize)>,
    failed_fixes: usize,
}

impl<'a> ScriptedOperator<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            asked: Vec::new(),
            failed_fixes: 0,
        }
    }

    /// Answer `fix` without touching anything.
    #[must_use]
    pub fn fix(mut self) -> Self {
        self.steps.push_back(Step::Fix(None));
        self
    }

    /// Run `action`, then answer `fix`.
    #[must_use]
    pub fn fix_with(mut self, action: impl FnMut() + 'a) -> Self {
        self.steps.push_back(Step::Fix(Some(Box::new(action))));
        self
    }

    #[must_use]
    pub fn skip(mut self) -> Self {
        self.steps.push_back(Step::Skip);
        self
    }

    #[must_use]
    pub fn quit(mut self) -> Self {
        self.steps.push_back(Step::Quit);
        self
    }

    /// Fail with `error` instead of answering.
    #[must_use]
    pub fn fail(mut self, error: OperatorError) -> Self {
        self.steps.push_back(Step::Fail(error));
        self
    }

    /// Every prompt seen, as `(commit, attempt)`.
    #[must_use]
    pub fn asked(&self) -> &[(CommitId, usize)] {
        &self.asked
    }

    /// How many fixes the engine could not finalize.
    #[must_use]
    pub const fn failed_fixes(&self) -> usize {
        self.failed_fixes
    }

    /// Whether every scripted step has been used.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Operator for ScriptedOperator<'_> {
    fn decide(&mut self, prompt: &ConflictPrompt<'_>) -> Result<Directive, OperatorError> {
        self.asked.push((prompt.commit.hash(), prompt.attempt));
        match self.steps.pop_front() {
            Some(Step::Fix(action)) => {
                if let Some(mut action) = action {
                    action();
                }
                Ok(Directive::Fix)
            }
            Some(Step::Skip) => Ok(Directive::Skip),
            Some(Step::Quit) => Ok(Directive::Quit),
            Some(Step::Fail(e)) => Err(e),
            None => Err(OperatorError::ScriptExhausted),
        }
    }

    fn fix_failed(&mut self, _prompt: &ConflictPrompt<'_>) {
        self.failed_fixes += 1;
    }
}
