//! Merging per-repository histories into one chronological timeline.
//!
//! Each repository contributes its commits in author-date order. The merge
//! is a stable k-way merge keyed on `(author date, repository index,
//! position)`, so equal timestamps always come out in configuration order
//! and then log order, and reruns are reproducible.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::config::AbsorbedRepo;
use crate::error::LoadError;
use crate::model::{Commit, CommitId, RepoId};

// ---------------------------------------------------------------------------
// RepoHistory
// ---------------------------------------------------------------------------

/// One repository's commits, in log order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoHistory {
    repository: RepoId,
    commits: Vec<Commit>,
}

impl RepoHistory {
    #[must_use]
    pub const fn new(repository: RepoId, commits: Vec<Commit>) -> Self {
        Self {
            repository,
            commits,
        }
    }

    #[must_use]
    pub const fn repository(&self) -> &RepoId {
        &self.repository
    }

    #[must_use]
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// Keep only the commits up to and including `boundary`, in log order.
    ///
    /// # Errors
    /// [`LoadError::BoundaryNotFound`] if `boundary` is not in the history.
    pub fn truncate_after(&mut self, boundary: CommitId) -> Result<(), LoadError> {
        let idx = self
            .commits
            .iter()
            .position(|c| c.hash() == boundary)
            .ok_or_else(|| LoadError::BoundaryNotFound {
                repository: self.repository.clone(),
                boundary,
            })?;
        let dropped = self.commits.len() - idx - 1;
        self.commits.truncate(idx + 1);
        debug!(repo = %self.repository, %boundary, dropped, "truncated absorbed history");
        Ok(())
    }

    /// Stable-sort by author date. Already sorted histories are unchanged.
    pub fn sort_by_author_date(&mut self) {
        self.commits.sort_by_key(Commit::author_date);
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Every commit to replay, in global author-date order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    commits: Vec<Commit>,
}

impl Timeline {
    /// Build the timeline from per-repository histories.
    ///
    /// Absorbed repositories are first cut after their last unique commit
    /// (in log order); each history is then ordered by author date and all
    /// of them are merged.
    ///
    /// # Errors
    /// [`LoadError::UnknownRepository`] if an absorption names a repository
    /// that is not in `histories`, [`LoadError::BoundaryNotFound`] if its
    /// boundary commit is missing.
    pub fn build(
        mut histories: Vec<RepoHistory>,
        absorbed: &[AbsorbedRepo],
    ) -> Result<Self, LoadError> {
        for absorption in absorbed {
            let history = histories
                .iter_mut()
                .find(|h| h.repository == absorption.repo)
                .ok_or_else(|| LoadError::UnknownRepository {
                    repository: absorption.repo.clone(),
                })?;
            history.truncate_after(absorption.last_unique)?;
        }
        for history in &mut histories {
            history.sort_by_author_date();
        }
        Ok(Self::merge(histories))
    }

    /// Stable k-way merge of histories that are each sorted by author date.
    #[must_use]
    pub fn merge(histories: Vec<RepoHistory>) -> Self {
        type Key = Reverse<(DateTime<FixedOffset>, usize, usize)>;

        let total = histories.iter().map(|h| h.commits.len()).sum();
        let mut sources: Vec<std::vec::IntoIter<Commit>> = histories
            .into_iter()
            .map(|h| h.commits.into_iter())
            .collect();

        let mut heads: Vec<Option<Commit>> = sources.iter_mut().map(Iterator::next).collect();
        let mut heap: BinaryHeap<Key> = heads
            .iter()
            .enumerate()
            .filter_map(|(repo, c)| c.as_ref().map(|c| Reverse((c.author_date(), repo, 0))))
            .collect();

        let mut commits = Vec::with_capacity(total);
        while let Some(Reverse((_, repo, pos))) = heap.pop() {
            let Some(commit) = heads[repo].take() else {
                continue;
            };
            commits.push(commit);
            heads[repo] = sources[repo].next();
            if let Some(next) = &heads[repo] {
                heap.push(Reverse((next.author_date(), repo, pos + 1)));
            }
        }
        Self { commits }
    }

    /// Wrap commits that are already in replay order.
    #[must_use]
    pub const fn from_commits(commits: Vec<Commit>) -> Self {
        Self { commits }
    }

    #[must_use]
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Position of the first commit with hash `id`.
    #[must_use]
    pub fn position_of(&self, id: CommitId) -> Option<usize> {
        self.commits.iter().position(|c| c.hash() == id)
    }

    /// Position of `id`, or [`LoadError::CheckpointNotInTimeline`].
    ///
    /// # Errors
    /// If no commit has hash `id`.
    pub fn require_position(&self, id: CommitId) -> Result<usize, LoadError> {
        self.position_of(id)
            .ok_or(LoadError::CheckpointNotInTimeline { commit: id })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Commit> {
        self.commits.iter()
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Commit;
    type IntoIter = std::slice::Iter<'a, Commit>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
