//! Shared helpers for braid integration tests.
//!
//! Every test gets its own temp directory holding the resolution cache,
//! checkpoint and ledger, and drives the engine against a [`FakeRepo`].

#![allow(dead_code)]

use std::path::PathBuf;

use braid::checkpoint::CheckpointStore;
use braid::error::ReplayError;
use braid::replay::{Operator, ReplayEngine, ReplayState, ReplaySummary};
use braid::resolution_cache::ResolutionCache;
use braid::{Commit, CommitId, RepoHistory, RepoId, Timeline};
use braid_git::{ConflictedFile, FakeRepo, GitOid, ResolvedFile};
use chrono::{DateTime, Duration, FixedOffset};
use tempfile::TempDir;

pub fn oid(n: u8) -> GitOid {
    GitOid::from_bytes([n; 20])
}

pub fn id(n: u8) -> CommitId {
    oid(n).into()
}

pub fn repo(name: &str) -> RepoId {
    RepoId::new(name).expect("valid repo name")
}

/// `day` days after 2020-01-01, UTC.
pub fn date(day: i64) -> DateTime<FixedOffset> {
    let base = DateTime::parse_from_rfc3339("2020-01-01T00:00:00+00:00").expect("valid date");
    base + Duration::days(day)
}

/// A one-hunk patch replacing `old` with `new` in `path`.
pub fn patch(path: &str, old: &str, new: &str) -> String {
    format!(
        "diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n@@ -1 +1 @@\n-{old}\n+{new}\n"
    )
}

/// A conflicted file with standard markers.
pub fn conflicted(path: &str, ours: &str, theirs: &str) -> ConflictedFile {
    conflicted_in(path, "", ours, theirs)
}

/// A conflicted file whose single conflict region follows `header`.
pub fn conflicted_in(path: &str, header: &str, ours: &str, theirs: &str) -> ConflictedFile {
    ConflictedFile {
        path: path.to_owned(),
        content: format!("{header}<<<<<<< HEAD\n{ours}\n=======\n{theirs}\n>>>>>>> incoming\n")
            .into_bytes(),
    }
}

/// A resolved file; `None` deletes it.
pub fn resolved(path: &str, content: Option<&str>) -> ResolvedFile {
    ResolvedFile {
        path: path.to_owned(),
        content: content.map(|c| c.as_bytes().to_vec()),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub port: FakeRepo,
    pub cache: ResolutionCache,
    pub finalize: bool,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let cache = ResolutionCache::new(dir.path().join("rerere-cache"));
        Self {
            dir,
            port: FakeRepo::new(),
            cache,
            finalize: false,
        }
    }

    /// A harness sharing `other`'s cache directory but with a fresh port.
    pub fn with_cache_of(other: &Self) -> Self {
        let mut h = Self::new();
        h.cache = other.cache.clone();
        h
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("commit")
    }

    /// A fresh store over this harness's checkpoint and ledger.
    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(self.checkpoint_path(), self.dir.path().join("outcomes.jsonl"))
    }

    /// Declare commit `n` in `repo_name` and return its record.
    pub fn commit(&self, n: u8, repo_name: &str, day: i64, patch_text: &str) -> Commit {
        self.port.add_commit(repo_name, oid(n), patch_text);
        Commit::new(id(n), repo(repo_name), date(day), date(day))
    }

    pub fn run(
        &self,
        timeline: &Timeline,
        state: &mut ReplayState,
        operator: &mut dyn Operator,
    ) -> Result<ReplaySummary, ReplayError> {
        let mut store = self.store();
        ReplayEngine::new(&self.port, &self.cache, &mut store)
            .with_finalize(self.finalize)
            .run(timeline, state, operator)
    }

    /// Resume from the saved checkpoint, re-seeding from the ledger.
    pub fn resume_state(&self, timeline: &Timeline) -> ReplayState {
        let store = self.store();
        let checkpoint = store.load().expect("readable checkpoint").expect("checkpoint saved");
        let ledger = store.load_ledger().expect("readable ledger");
        ReplayState::resume(timeline, checkpoint, &ledger).expect("checkpoint in timeline")
    }

    /// Source commits in the result history, oldest first.
    pub fn history(&self) -> Vec<GitOid> {
        self.port.history().into_iter().map(|c| c.oid).collect()
    }
}

pub fn history_of(name: &str, commits: Vec<Commit>) -> RepoHistory {
    RepoHistory::new(repo(name), commits)
}
