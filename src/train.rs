//! Priming the resolution cache from historical merges.
//!
//! Every merge commit in a source repository is a conflict somebody already
//! resolved. Each one is redone mechanically in a scratch area; if that
//! conflicts, what the merge commit put in place of each conflict region is
//! recorded as the resolution for the conflict's signature. Merges that also
//! changed text outside the regions cannot be replayed elsewhere and are only
//! counted.

use std::fmt;

use braid_git::ReplayRepo;
use tracing::{debug, info, instrument, warn};

use crate::error::ReplayError;
use crate::model::{CommitId, RepoId};
use crate::resolution_cache::{CacheEntry, ConflictSignature, RecordOrigin, ResolutionCache};

/// What a training pass found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrainingReport {
    /// Merge commits examined.
    pub merges: usize,
    /// Merges that conflict when redone.
    pub conflicted: usize,
    /// New cache entries written.
    pub recorded: usize,
    /// Conflicts whose signature was already cached.
    pub already_known: usize,
    /// Merges whose resolution reaches outside the conflict regions.
    pub unusable: usize,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} merges, {} conflicted, {} recorded, {} already known, {} unusable",
            self.merges, self.conflicted, self.recorded, self.already_known, self.unusable
        )
    }
}

/// Walk every merge commit of `repos` and record the resolutions they imply.
///
/// Signatures already in the cache are left alone, so training never
/// overrides an operator's resolution.
///
/// # Errors
/// Port failures, or any cache read or write failure.
#[instrument(skip_all, fields(repos = repos.len()))]
pub fn train(
    port: &dyn ReplayRepo,
    cache: &ResolutionCache,
    repos: &[RepoId],
) -> Result<TrainingReport, ReplayError> {
    let mut report = TrainingReport::default();
    for repo in repos {
        let merges = port
            .merge_commits(repo.as_str())
            .map_err(|source| ReplayError::Port {
                action: "listing merge commits",
                source,
            })?;
        debug!(%repo, merges = merges.len(), "training on merges");

        for oid in merges {
            report.merges += 1;
            let commit = CommitId::from(oid);
            let replayed =
                port.replay_merge(repo.as_str(), oid)
                    .map_err(|source| ReplayError::Tool {
                        commit,
                        repository: repo.clone(),
                        source,
                    })?;
            let Some(replayed) = replayed else {
                continue;
            };
            report.conflicted += 1;

            let signature = ConflictSignature::of(&replayed.conflicts);
            if cache.lookup(&signature)?.is_some() {
                report.already_known += 1;
                continue;
            }
            let learned = CacheEntry::learn(
                signature,
                &replayed.conflicts,
                &replayed.resolution,
                Some(commit),
            );
            match learned {
                Ok(entry) => {
                    cache.record(&entry, RecordOrigin::Training)?;
                    report.recorded += 1;
                }
                Err(e) => {
                    warn!(%repo, %commit, error = %e, "merge resolution not learnable");
                    report.unusable += 1;
                }
            }
        }
    }
    info!(%report, "training finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use braid_git::{ConflictedFile, FakeRepo, GitOid, ReplayedMerge, ResolvedFile};

    use super::*;

    fn oid(n: u8) -> GitOid {
        GitOid::from_bytes([n; 20])
    }

    fn replayed(ours: &str, resolved: &str) -> ReplayedMerge {
        ReplayedMerge {
            conflicts: vec![ConflictedFile {
                path: "init.vim".into(),
                content: format!("set nu\n<<<<<<< HEAD\n{ours}\n=======\ntheirs\n>>>>>>> side\n")
                    .into_bytes(),
            }],
            resolution: vec![ResolvedFile {
                path: "init.vim".into(),
                content: Some(resolved.as_bytes().to_vec()),
            }],
        }
    }

    #[test]
    fn records_conflicting_merges_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path());
        let port = FakeRepo::new();
        port.add_commit("vim", oid(1), "")
            .set_merge("vim", oid(2))
            .set_replayed_merge("vim", oid(3), replayed("ours", "set nu\nmerged\n"))
            .set_replayed_merge("nvim", oid(4), replayed("ours", "set nu\ndifferent\n"))
            .set_replayed_merge("nvim", oid(5), replayed("evil", "set rnu\nmerged\n"));
        let repos = [RepoId::new("vim").unwrap(), RepoId::new("nvim").unwrap()];

        let report = train(&port, &cache, &repos).unwrap();
        assert_eq!(
            report,
            TrainingReport {
                merges: 4,
                conflicted: 3,
                recorded: 1,
                already_known: 1,
                unusable: 1,
            }
        );

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_commit, Some(CommitId::from(oid(3))));
        // Replays onto a file whose surroundings moved on.
        let later = ConflictedFile {
            path: "init.vim".into(),
            content: b"set nu\nset list\n<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> x\n".to_vec(),
        };
        assert_eq!(
            entries[0].replay(&[later]),
            Some(vec![ResolvedFile {
                path: "init.vim".into(),
                content: Some(b"set nu\nset list\nmerged\n".to_vec()),
            }])
        );
        assert!(
            cache
                .journal()
                .unwrap()
                .iter()
                .all(|r| r.origin == RecordOrigin::Training)
        );
    }

    #[test]
    fn repo_without_merges_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache"));
        let port = FakeRepo::new();
        let report = train(&port, &cache, &[RepoId::new("empty").unwrap()]).unwrap();
        assert_eq!(report, TrainingReport::default());
        assert!(!cache.dir().exists());
    }
}
