//! The [`Commit`] record shared by every stage of the pipeline.

use std::cell::OnceCell;
use std::fmt;

use braid_git::{GitError, ReplayRepo};
use chrono::{DateTime, FixedOffset};

use super::types::{CommitId, RepoId};

/// One historical change from one source repository.
///
/// Identity is the `(hash, repository)` pair. The core fields are fixed at
/// load time; the patch and merge flag are fetched from the port on first
/// use and cached for the lifetime of the value.
#[derive(Clone)]
pub struct Commit {
    hash: CommitId,
    repository: RepoId,
    author_date: DateTime<FixedOffset>,
    commit_date: DateTime<FixedOffset>,
    patch: OnceCell<Vec<u8>>,
    merge: OnceCell<bool>,
}

impl Commit {
    /// Create a commit record with empty derived caches.
    #[must_use]
    pub const fn new(
        hash: CommitId,
        repository: RepoId,
        author_date: DateTime<FixedOffset>,
        commit_date: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            hash,
            repository,
            author_date,
            commit_date,
            patch: OnceCell::new(),
            merge: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn hash(&self) -> CommitId {
        self.hash
    }

    #[must_use]
    pub const fn repository(&self) -> &RepoId {
        &self.repository
    }

    #[must_use]
    pub const fn author_date(&self) -> DateTime<FixedOffset> {
        self.author_date
    }

    #[must_use]
    pub const fn commit_date(&self) -> DateTime<FixedOffset> {
        self.commit_date
    }

    /// Whether the commit was rewritten after authoring (rebased, amended,
    /// cherry-picked), i.e. its two timestamps differ.
    #[must_use]
    pub fn is_redated(&self) -> bool {
        self.author_date != self.commit_date
    }

    /// The raw patch text, computed by `repo` on first call.
    ///
    /// # Errors
    /// Propagates the port's error; nothing is cached on failure.
    pub fn patch(&self, repo: &dyn ReplayRepo) -> Result<&[u8], GitError> {
        if let Some(patch) = self.patch.get() {
            return Ok(patch);
        }
        let computed = repo.compute_patch(self.repository.as_str(), self.hash.oid())?;
        Ok(self.patch.get_or_init(|| computed))
    }

    /// Whether the commit has more than one parent, asked of `repo` once.
    ///
    /// # Errors
    /// Propagates the port's error; nothing is cached on failure.
    pub fn is_merge(&self, repo: &dyn ReplayRepo) -> Result<bool, GitError> {
        if let Some(merge) = self.merge.get() {
            return Ok(*merge);
        }
        let merge = repo.is_merge_commit(self.repository.as_str(), self.hash.oid())?;
        Ok(*self.merge.get_or_init(|| merge))
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.repository == other.repository
            && self.author_date == other.author_date
            && self.commit_date == other.commit_date
    }
}

impl Eq for Commit {}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.hash.short(), self.repository)
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("hash", &self.hash.to_string())
            .field("repository", &self.repository.as_str())
            .field("author_date", &self.author_date.to_rfc3339())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use braid_git::{FakeRepo, GitOid};

    use super::*;

    fn date(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn commit(n: u8, repo: &str) -> Commit {
        Commit::new(
            GitOid::from_bytes([n; 20]).into(),
            RepoId::new(repo).unwrap(),
            date("2020-01-01T00:00:00+00:00"),
            date("2020-01-02T00:00:00+01:00"),
        )
    }

    #[test]
    fn display_uses_short_hash_and_repo() {
        assert_eq!(commit(0xab, "dotfiles").to_string(), "abababab from dotfiles");
    }

    #[test]
    fn patch_is_fetched_once() {
        let fake = FakeRepo::new();
        let c = commit(1, "a");
        fake.add_commit("a", c.hash().oid(), "+first\n");
        assert_eq!(c.patch(&fake).unwrap(), b"+first\n");

        // The port changing its answer does not affect the cached value.
        fake.add_commit("a", c.hash().oid(), "+second\n");
        assert_eq!(c.patch(&fake).unwrap(), b"+first\n");
    }

    #[test]
    fn failed_lookup_is_not_cached() {
        let fake = FakeRepo::new();
        let c = commit(2, "a");
        assert!(c.is_merge(&fake).is_err());
        fake.add_commit("a", c.hash().oid(), "").set_merge("a", c.hash().oid());
        assert!(c.is_merge(&fake).unwrap());
    }

    #[test]
    fn redated_compares_instants() {
        let c = commit(3, "a");
        assert!(c.is_redated());
        let same = Commit::new(
            c.hash(),
            c.repository().clone(),
            date("2020-01-01T00:00:00+00:00"),
            date("2020-01-01T01:00:00+01:00"),
        );
        assert!(!same.is_redated());
    }
}
