//! Per-repository diagnostics over the loaded histories.
//!
//! Computed on the untruncated histories so that overlap between an
//! absorbed repository and the one that absorbed it is visible.

use std::collections::BTreeMap;
use std::fmt;

use chrono::TimeDelta;

use crate::model::{CommitId, RepoId};
use crate::timeline::RepoHistory;

/// Counts for one repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoStats {
    pub repository: RepoId,
    pub commits: usize,
    /// Commits whose committer date differs from the author date.
    pub redated: usize,
    /// Largest committer-minus-author delta among redated commits.
    pub max_redate: Option<TimeDelta>,
}

/// Number of hashes two repositories have in common.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedHashes {
    pub first: RepoId,
    pub second: RepoId,
    pub count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    /// In configuration order.
    pub repos: Vec<RepoStats>,
    /// Every pair with at least one shared hash, in configuration order.
    pub shared: Vec<SharedHashes>,
}

impl Statistics {
    #[must_use]
    pub fn collect(histories: &[RepoHistory]) -> Self {
        let mut repos = Vec::with_capacity(histories.len());
        let mut owners: BTreeMap<CommitId, Vec<usize>> = BTreeMap::new();

        for (idx, history) in histories.iter().enumerate() {
            let mut redated = 0;
            let mut max_redate: Option<TimeDelta> = None;
            for commit in history.commits() {
                let owners = owners.entry(commit.hash()).or_default();
                if owners.last() != Some(&idx) {
                    owners.push(idx);
                }
                if commit.is_redated() {
                    redated += 1;
                    let delta = commit.commit_date() - commit.author_date();
                    max_redate = Some(max_redate.map_or(delta, |m| m.max(delta)));
                }
            }
            repos.push(RepoStats {
                repository: history.repository().clone(),
                commits: history.commits().len(),
                redated,
                max_redate,
            });
        }

        let mut pairs: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for owners in owners.values() {
            for (i, &a) in owners.iter().enumerate() {
                for &b in &owners[i + 1..] {
                    *pairs.entry((a.min(b), a.max(b))).or_default() += 1;
                }
            }
        }
        let shared = pairs
            .into_iter()
            .map(|((a, b), count)| SharedHashes {
                first: histories[a].repository().clone(),
                second: histories[b].repository().clone(),
                count,
            })
            .collect();

        Self { repos, shared }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for repo in &self.repos {
            write!(
                f,
                "{} {} commits, {} redated",
                repo.repository, repo.commits, repo.redated
            )?;
            if let Some(delta) = repo.max_redate {
                write!(f, " (max {}s)", delta.num_seconds())?;
            }
            writeln!(f)?;
        }
        for pair in &self.shared {
            writeln!(f, "{} in both {} and {}", pair.count, pair.first, pair.second)?;
        }
        Ok(())
    }
}
