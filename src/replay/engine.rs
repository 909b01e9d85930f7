//! The replay engine: applies the timeline to the result history one commit
//! at a time.
//!
//! For each commit the engine:
//!
//! 1. fingerprints the patch and skips it if it is empty or equivalent to an
//!    already-applied one;
//! 2. applies it through the port;
//! 3. on conflict, replays a cached resolution if the conflict signature is
//!    known;
//! 4. otherwise hands the conflict to the [`Operator`] until it is fixed,
//!    skipped, or the run is quit.
//!
//! After every handled commit the outcome is appended to the ledger and the
//! checkpoint moves to that commit, so an interrupted run can be resumed
//! from the last commit that reached a terminal phase.

use std::fmt;

use braid_git::{ApplyOutcome, ConflictDetails, GitError, ReplayRepo, ResolvedFile};
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::ReplayError;
use crate::fingerprint::{AppliedSet, Fingerprint, PatchCheck};
use crate::model::{Commit, RepoId};
use crate::replay::operator::{AbortReason, ConflictPrompt, Directive, Operator};
use crate::replay::phase::{CommitPhase, PhaseTrace};
use crate::replay::state::{
    CommitOutcome, Disposition, ReplayState, ReplaySummary, Resolution, RunStatus, SkipReason,
};
use crate::resolution_cache::{CacheEntry, ConflictSignature, RecordOrigin, ResolutionCache};
use crate::timeline::Timeline;

/// Progress report emitted before each commit is handled.
#[derive(Clone, Copy, Debug)]
pub struct Progress<'a> {
    pub commit: &'a Commit,
    /// 1-based index in the timeline.
    pub index: usize,
    pub total: usize,
}

impl Progress<'_> {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.index as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} = {:.2}%",
            self.commit,
            self.index,
            self.total,
            self.percent()
        )
    }
}

type ProgressFn<'a> = Box<dyn FnMut(&Progress<'_>) + 'a>;

/// Drives one replay run against a port, a cache and a checkpoint store.
pub struct ReplayEngine<'a> {
    port: &'a dyn ReplayRepo,
    cache: &'a ResolutionCache,
    checkpoint: &'a mut CheckpointStore,
    finalize: bool,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> ReplayEngine<'a> {
    #[must_use]
    pub fn new(
        port: &'a dyn ReplayRepo,
        cache: &'a ResolutionCache,
        checkpoint: &'a mut CheckpointStore,
    ) -> Self {
        Self {
            port,
            cache,
            checkpoint,
            finalize: false,
            progress: None,
        }
    }

    /// Rewrite committer dates after the last commit.
    #[must_use]
    pub const fn with_finalize(mut self, finalize: bool) -> Self {
        self.finalize = finalize;
        self
    }

    /// Call `f` before each commit is handled.
    #[must_use]
    pub fn on_progress(mut self, f: impl FnMut(&Progress<'_>) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Prepare a fresh run: forget the old checkpoint and ledger, and create
    /// an empty result history that can see every source repository.
    ///
    /// # Errors
    /// Checkpoint I/O failure or a port failure.
    #[instrument(skip_all, fields(repos = repos.len()))]
    pub fn initialize(&mut self, repos: &[RepoId]) -> Result<(), ReplayError> {
        self.checkpoint.reset()?;
        let names: Vec<String> = repos.iter().map(|r| r.as_str().to_owned()).collect();
        self.port
            .init_result_history(&names)
            .map_err(|source| ReplayError::Port {
                action: "initializing the result history",
                source,
            })?;
        info!("result history initialized");
        Ok(())
    }

    /// Replay `timeline` from `state.position` to the end.
    ///
    /// On error `state.status` is [`RunStatus::Aborted`] and the checkpoint
    /// names the last commit that was fully handled.
    ///
    /// # Errors
    /// [`ReplayError::OperatorAbort`] when the operator quits or cannot be
    /// asked; any port, cache or checkpoint failure.
    #[instrument(skip_all, fields(total = timeline.len(), start = state.position, resuming = state.resuming))]
    pub fn run(
        &mut self,
        timeline: &Timeline,
        state: &mut ReplayState,
        operator: &mut dyn Operator,
    ) -> Result<ReplaySummary, ReplayError> {
        state.status = RunStatus::Running;
        match self.run_inner(timeline, state, operator) {
            Ok(()) => {
                state.status = RunStatus::Completed;
                let summary = state.summary();
                info!(
                    applied = summary.applied(),
                    skipped = summary.skipped(),
                    "replay completed"
                );
                Ok(summary)
            }
            Err(e) => {
                state.status = RunStatus::Aborted;
                warn!(error = %e, checkpoint = ?state.checkpoint, "replay aborted");
                Err(e)
            }
        }
    }

    fn run_inner(
        &mut self,
        timeline: &Timeline,
        state: &mut ReplayState,
        operator: &mut dyn Operator,
    ) -> Result<(), ReplayError> {
        let total = timeline.len();
        for (position, commit) in timeline.iter().enumerate().skip(state.position) {
            if let Some(progress) = self.progress.as_mut() {
                progress(&Progress {
                    commit,
                    index: position + 1,
                    total,
                });
            }
            let outcome = self.replay_commit(commit, position, &state.applied, operator)?;
            self.checkpoint.append_outcome(&outcome)?;
            self.checkpoint.save(outcome.commit, position)?;
            state.record(outcome);
        }

        if self.finalize {
            self.port
                .finalize_history()
                .map_err(|source| ReplayError::Port {
                    action: "finalizing the result history",
                    source,
                })?;
            info!("committer dates rewritten");
        }
        Ok(())
    }

    /// Take one commit from `Applying` to a terminal phase.
    fn replay_commit(
        &self,
        commit: &Commit,
        position: usize,
        applied: &AppliedSet,
        operator: &mut dyn Operator,
    ) -> Result<CommitOutcome, ReplayError> {
        let step = Step::new(commit, position);
        let repo = commit.repository().as_str();
        let oid = commit.hash().oid();

        let patch = commit.patch(self.port).map_err(tool_error(commit))?;
        let fingerprint = match applied.check(patch) {
            PatchCheck::Empty => {
                debug!(%commit, "empty patch");
                return step.finish(
                    CommitPhase::Skipped,
                    Disposition::Skipped {
                        reason: SkipReason::EmptyPatch,
                    },
                    None,
                );
            }
            PatchCheck::Duplicate {
                fingerprint,
                original,
            } => {
                info!(%commit, %original, "equivalent patch already applied");
                return step.finish(
                    CommitPhase::Skipped,
                    Disposition::Skipped {
                        reason: SkipReason::Equivalent { original },
                    },
                    Some(fingerprint),
                );
            }
            PatchCheck::Fresh(fingerprint) => fingerprint,
        };

        let details = match self.port.apply_patch(repo, oid).map_err(tool_error(commit))? {
            ApplyOutcome::Applied => {
                debug!(%commit, "applied cleanly");
                return step.finish(
                    CommitPhase::Applied,
                    applied_with(Resolution::Clean),
                    Some(fingerprint),
                );
            }
            ApplyOutcome::Conflict(details) => details,
        };

        // From here on an application is in progress. Anything but a
        // settled outcome must leave the result history clean.
        let settled = self.settle_conflict(step, &details, fingerprint, operator);
        if matches!(&settled, Err(e) if !e.is_operator_abort()) {
            self.roll_back(commit);
        }
        settled
    }

    fn settle_conflict(
        &self,
        mut step: Step<'_>,
        details: &ConflictDetails,
        fingerprint: Fingerprint,
        operator: &mut dyn Operator,
    ) -> Result<CommitOutcome, ReplayError> {
        let commit = step.commit;
        step.advance(CommitPhase::Conflict)?;
        let signature = ConflictSignature::of(&details.files);
        info!(%commit, %signature, files = details.files.len(), "conflict");

        if self.replay_cached(commit, details, &signature) {
            return step.finish(
                CommitPhase::Applied,
                applied_with(Resolution::Cached),
                Some(fingerprint),
            );
        }

        step.advance(CommitPhase::AwaitingOperator)?;
        self.await_operator(step, details, signature, fingerprint, operator)
    }

    /// Try the cached resolution for `signature`. `false` means the
    /// operator has to take over.
    fn replay_cached(
        &self,
        commit: &Commit,
        details: &ConflictDetails,
        signature: &ConflictSignature,
    ) -> bool {
        let entry = match self.cache.lookup(signature) {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(e) => {
                warn!(%commit, %signature, error = %e, "resolution cache unreadable; treating as a miss");
                return false;
            }
        };
        let Some(resolution) = entry.replay(&details.files) else {
            warn!(%commit, %signature, "cached resolution does not fit this conflict; asking the operator");
            return false;
        };

        let finished = self
            .port
            .apply_resolution(&resolution)
            .and_then(|()| self.port.continue_apply());
        match finished {
            Ok(true) => {
                info!(%commit, %signature, "replayed cached resolution");
                true
            }
            Ok(false) => {
                warn!(%commit, %signature, "cached resolution left conflicts; asking the operator");
                false
            }
            Err(e) => {
                warn!(%commit, %signature, error = %e, "cached resolution could not be applied; asking the operator");
                false
            }
        }
    }

    fn await_operator(
        &self,
        mut step: Step<'_>,
        details: &ConflictDetails,
        signature: ConflictSignature,
        fingerprint: Fingerprint,
        operator: &mut dyn Operator,
    ) -> Result<CommitOutcome, ReplayError> {
        let commit = step.commit;
        let paths = details.paths();
        let mut attempt = 1;
        loop {
            let prompt = ConflictPrompt {
                commit,
                details,
                attempt,
            };
            let directive = match operator.decide(&prompt) {
                Ok(directive) => directive,
                Err(e) => {
                    warn!(%commit, error = %e, "operator unavailable");
                    return Err(self.abort(commit, AbortReason::from(&e)));
                }
            };
            debug!(%commit, ?directive, attempt, "operator directive");

            match directive {
                Directive::Fix => {
                    let resolution = self
                        .port
                        .read_worktree_files(&paths)
                        .map_err(tool_error(commit))?;
                    if self.port.continue_apply().map_err(tool_error(commit))? {
                        self.learn(commit, signature, details, &resolution);
                        return step.finish(
                            CommitPhase::Applied,
                            applied_with(Resolution::Operator),
                            Some(fingerprint),
                        );
                    }
                    warn!(%commit, attempt, "couldn't continue");
                    operator.fix_failed(&prompt);
                    step.advance(CommitPhase::AwaitingOperator)?;
                    attempt += 1;
                }
                Directive::Skip => {
                    self.port.skip_apply().map_err(tool_error(commit))?;
                    info!(%commit, "skipped by operator");
                    return step.finish(
                        CommitPhase::Skipped,
                        Disposition::Skipped {
                            reason: SkipReason::Operator,
                        },
                        Some(fingerprint),
                    );
                }
                Directive::Quit => return Err(self.abort(commit, AbortReason::Quit)),
            }
        }
    }

    /// Store the operator's fix. A fix that cannot be stored is only
    /// logged; the commit is applied either way.
    fn learn(
        &self,
        commit: &Commit,
        signature: ConflictSignature,
        details: &ConflictDetails,
        resolution: &[ResolvedFile],
    ) {
        let learned = CacheEntry::learn(signature, &details.files, resolution, Some(commit.hash()));
        let entry = match learned {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%commit, error = %e, "resolution not cached");
                return;
            }
        };
        if let Err(e) = self.cache.record(&entry, RecordOrigin::Operator) {
            warn!(%commit, error = %e, "failed to record resolution");
        }
    }

    /// Best-effort rollback of the in-progress application.
    fn roll_back(&self, commit: &Commit) {
        if let Err(e) = self.port.abort_apply() {
            warn!(%commit, error = %e, "rollback of in-progress application failed");
        }
    }

    /// Roll back the in-progress application and build the abort error.
    fn abort(&self, commit: &Commit, reason: AbortReason) -> ReplayError {
        self.roll_back(commit);
        ReplayError::OperatorAbort {
            commit: commit.hash(),
            repository: commit.repository().clone(),
            reason,
        }
    }
}

/// One commit's trip through the phase machine.
struct Step<'c> {
    commit: &'c Commit,
    position: usize,
    trace: PhaseTrace,
}

impl<'c> Step<'c> {
    fn new(commit: &'c Commit, position: usize) -> Self {
        Self {
            commit,
            position,
            trace: PhaseTrace::start(),
        }
    }

    fn advance(&mut self, next: CommitPhase) -> Result<(), ReplayError> {
        self.trace
            .advance(next)
            .map_err(|source| ReplayError::InvalidTransition {
                commit: self.commit.hash(),
                source,
            })
    }

    fn finish(
        mut self,
        terminal: CommitPhase,
        disposition: Disposition,
        fingerprint: Option<Fingerprint>,
    ) -> Result<CommitOutcome, ReplayError> {
        self.advance(terminal)?;
        Ok(CommitOutcome {
            commit: self.commit.hash(),
            repository: self.commit.repository().clone(),
            position: self.position,
            disposition,
            fingerprint,
            trace: self.trace.into_phases(),
        })
    }
}

const fn applied_with(resolution: Resolution) -> Disposition {
    Disposition::Applied { resolution }
}

fn tool_error(commit: &Commit) -> impl FnOnce(GitError) -> ReplayError + '_ {
    move |source| ReplayError::Tool {
        commit: commit.hash(),
        repository: commit.repository().clone(),
        source,
    }
}
