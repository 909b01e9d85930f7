//! In-memory [`ReplayRepo`] for tests.
//!
//! [`FakeRepo`] models the source repositories as scripted commit tables and
//! the result history as a list of applied commits. Conflicts, tool failures
//! and historical merges are declared up front; the operator's manual work is
//! simulated with [`FakeRepo::edit_worktree`].

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::error::GitError;
use crate::repo::ReplayRepo;
use crate::types::{
    AncestryEntry, ApplyOutcome, ConflictDetails, ConflictedFile, GitOid, ReplayedMerge,
    ResolvedFile,
};

/// Conflict marker that makes [`ReplayRepo::continue_apply`] refuse to finish.
pub const CONFLICT_MARKER: &str = "<<<<<<<";

const DEFAULT_DATE: &str = "2020-01-01T00:00:00+00:00";

/// A commit that reached the fake result history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedCommit {
    /// Source repository name.
    pub repo: String,
    /// The source commit.
    pub oid: GitOid,
    /// Resolved content for commits that went through a conflict.
    pub resolution: Vec<ResolvedFile>,
}

#[derive(Clone, Debug)]
struct FakeCommit {
    author_date: String,
    commit_date: String,
    patch: Vec<u8>,
    merge: bool,
    conflict: Option<Vec<ConflictedFile>>,
    fails: bool,
    replayed_merge: Option<ReplayedMerge>,
}

#[derive(Clone, Debug)]
struct InProgress {
    repo: String,
    oid: GitOid,
    paths: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    commits: BTreeMap<String, Vec<(GitOid, FakeCommit)>>,
    history: Vec<AppliedCommit>,
    attempts: Vec<(String, GitOid)>,
    in_progress: Option<InProgress>,
    worktree: BTreeMap<String, Option<Vec<u8>>>,
    fail_continue: bool,
    initialized_with: Option<Vec<String>>,
    finalized: bool,
}

impl FakeState {
    fn commit(&self, repo: &str, oid: GitOid) -> Result<&FakeCommit, GitError> {
        self.commits
            .get(repo)
            .and_then(|list| list.iter().find(|(o, _)| *o == oid))
            .map(|(_, c)| c)
            .ok_or_else(|| GitError::NotFound {
                message: format!("commit {oid} in `{repo}`"),
            })
    }

    fn commit_mut(&mut self, repo: &str, oid: GitOid) -> &mut FakeCommit {
        let list = self.commits.entry(repo.to_owned()).or_default();
        let idx = match list.iter().position(|(o, _)| *o == oid) {
            Some(idx) => idx,
            None => {
                list.push((
                    oid,
                    FakeCommit {
                        author_date: DEFAULT_DATE.to_owned(),
                        commit_date: DEFAULT_DATE.to_owned(),
                        patch: Vec::new(),
                        merge: false,
                        conflict: None,
                        fails: false,
                        replayed_merge: None,
                    },
                ));
                list.len() - 1
            }
        };
        &mut list[idx].1
    }
}

/// Scripted, in-memory implementation of [`ReplayRepo`].
#[derive(Debug, Default)]
pub struct FakeRepo {
    state: RefCell<FakeState>,
}

impl FakeRepo {
    /// An empty fake with no source commits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a commit in `repo` with the given patch text.
    pub fn add_commit(&self, repo: &str, oid: GitOid, patch: &str) -> &Self {
        self.state.borrow_mut().commit_mut(repo, oid).patch = patch.as_bytes().to_vec();
        self
    }

    /// Declare a commit with explicit author and committer dates.
    pub fn add_dated_commit(
        &self,
        repo: &str,
        oid: GitOid,
        author_date: &str,
        commit_date: &str,
        patch: &str,
    ) -> &Self {
        let mut state = self.state.borrow_mut();
        let commit = state.commit_mut(repo, oid);
        commit.author_date = author_date.to_owned();
        commit.commit_date = commit_date.to_owned();
        commit.patch = patch.as_bytes().to_vec();
        self
    }

    /// Mark a commit as a merge commit.
    pub fn set_merge(&self, repo: &str, oid: GitOid) -> &Self {
        self.state.borrow_mut().commit_mut(repo, oid).merge = true;
        self
    }

    /// Make every application of this commit stop with a conflict on `files`.
    pub fn conflict_on(&self, repo: &str, oid: GitOid, files: Vec<ConflictedFile>) -> &Self {
        self.state.borrow_mut().commit_mut(repo, oid).conflict = Some(files);
        self
    }

    /// Make every application of this commit fail with a tool error.
    pub fn fail_on(&self, repo: &str, oid: GitOid) -> &Self {
        self.state.borrow_mut().commit_mut(repo, oid).fails = true;
        self
    }

    /// Declare how a merge commit behaves when redone during training.
    pub fn set_replayed_merge(&self, repo: &str, oid: GitOid, replayed: ReplayedMerge) -> &Self {
        let mut state = self.state.borrow_mut();
        let commit = state.commit_mut(repo, oid);
        commit.merge = true;
        commit.replayed_merge = Some(replayed);
        self
    }

    /// Make every `continue_apply` fail with a tool error, as when the
    /// commit hook of the result history rejects the commit.
    pub fn fail_continue(&self) -> &Self {
        self.state.borrow_mut().fail_continue = true;
        self
    }

    /// Simulate the operator editing a file in the result working tree.
    pub fn edit_worktree(&self, path: &str, content: Option<&str>) {
        self.edit_worktree_bytes(path, content.map(str::as_bytes));
    }

    /// Like [`FakeRepo::edit_worktree`], for content that is not UTF-8.
    pub fn edit_worktree_bytes(&self, path: &str, content: Option<&[u8]>) {
        self.state
            .borrow_mut()
            .worktree
            .insert(path.to_owned(), content.map(<[u8]>::to_vec));
    }

    /// Commits in the result history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<AppliedCommit> {
        self.state.borrow().history.clone()
    }

    /// Every `apply_patch` call, in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<(String, GitOid)> {
        self.state.borrow().attempts.clone()
    }

    /// The commit whose application is currently in progress, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<GitOid> {
        self.state.borrow().in_progress.as_ref().map(|p| p.oid)
    }

    /// Repositories passed to the last `init_result_history` call.
    #[must_use]
    pub fn initialized_with(&self) -> Option<Vec<String>> {
        self.state.borrow().initialized_with.clone()
    }

    /// Whether `finalize_history` has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.state.borrow().finalized
    }
}

fn has_marker(content: &[u8]) -> bool {
    content
        .windows(CONFLICT_MARKER.len())
        .any(|w| w == CONFLICT_MARKER.as_bytes())
}

impl ReplayRepo for FakeRepo {
    fn resolve_revision(&self, repo: &str, spec: &str) -> Result<GitOid, GitError> {
        let state = self.state.borrow();
        let candidates: Vec<GitOid> = state
            .commits
            .get(repo)
            .map(|list| {
                list.iter()
                    .map(|(oid, _)| *oid)
                    .filter(|oid| oid.to_string().starts_with(spec))
                    .collect()
            })
            .unwrap_or_default();
        match candidates.as_slice() {
            [oid] if !spec.is_empty() => Ok(*oid),
            _ => Err(GitError::NotFound {
                message: format!("rev-parse '{spec}' in `{repo}`"),
            }),
        }
    }

    fn list_ancestry_metadata(&self, repo: &str) -> Result<Vec<AncestryEntry>, GitError> {
        let state = self.state.borrow();
        let list = state.commits.get(repo).ok_or_else(|| GitError::NotFound {
            message: format!("repository `{repo}`"),
        })?;
        Ok(list
            .iter()
            .map(|(oid, c)| AncestryEntry {
                oid: *oid,
                author_date: c.author_date.clone(),
                commit_date: c.commit_date.clone(),
            })
            .collect())
    }

    fn compute_patch(&self, repo: &str, oid: GitOid) -> Result<Vec<u8>, GitError> {
        Ok(self.state.borrow().commit(repo, oid)?.patch.clone())
    }

    fn is_merge_commit(&self, repo: &str, oid: GitOid) -> Result<bool, GitError> {
        Ok(self.state.borrow().commit(repo, oid)?.merge)
    }

    fn merge_commits(&self, repo: &str) -> Result<Vec<GitOid>, GitError> {
        let state = self.state.borrow();
        Ok(state
            .commits
            .get(repo)
            .map(|list| {
                list.iter()
                    .filter(|(_, c)| c.merge)
                    .map(|(oid, _)| *oid)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn replay_merge(&self, repo: &str, oid: GitOid) -> Result<Option<ReplayedMerge>, GitError> {
        Ok(self.state.borrow().commit(repo, oid)?.replayed_merge.clone())
    }

    fn apply_patch(&self, repo: &str, oid: GitOid) -> Result<ApplyOutcome, GitError> {
        let mut state = self.state.borrow_mut();
        if state.in_progress.is_some() {
            return Err(GitError::BackendError {
                message: "an application is already in progress".to_owned(),
            });
        }
        state.attempts.push((repo.to_owned(), oid));
        let commit = state.commit(repo, oid)?.clone();

        if commit.fails {
            return Err(GitError::Command {
                command: format!("git cherry-pick {oid}"),
                stderr: "fatal: scripted failure".to_owned(),
                exit_code: Some(128),
            });
        }

        match commit.conflict {
            None => {
                state.history.push(AppliedCommit {
                    repo: repo.to_owned(),
                    oid,
                    resolution: Vec::new(),
                });
                Ok(ApplyOutcome::Applied)
            }
            Some(files) => {
                for file in &files {
                    state
                        .worktree
                        .insert(file.path.clone(), Some(file.content.clone()));
                }
                state.in_progress = Some(InProgress {
                    repo: repo.to_owned(),
                    oid,
                    paths: files.iter().map(|f| f.path.clone()).collect(),
                });
                Ok(ApplyOutcome::Conflict(ConflictDetails {
                    diff: format!("conflict applying {oid} from {repo}"),
                    files,
                }))
            }
        }
    }

    fn continue_apply(&self) -> Result<bool, GitError> {
        let mut state = self.state.borrow_mut();
        let progress = state.in_progress.clone().ok_or(GitError::NothingInProgress)?;
        if state.fail_continue {
            return Err(GitError::Command {
                command: "git commit --no-edit".to_owned(),
                stderr: "error: scripted commit failure".to_owned(),
                exit_code: Some(1),
            });
        }

        let resolution: Vec<ResolvedFile> = progress
            .paths
            .iter()
            .map(|path| ResolvedFile {
                path: path.clone(),
                content: state.worktree.get(path).cloned().flatten(),
            })
            .collect();
        let unresolved = resolution
            .iter()
            .any(|f| f.content.as_deref().is_some_and(has_marker));
        if unresolved {
            return Ok(false);
        }

        state.history.push(AppliedCommit {
            repo: progress.repo,
            oid: progress.oid,
            resolution,
        });
        state.in_progress = None;
        state.worktree.clear();
        Ok(true)
    }

    fn skip_apply(&self) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        if state.in_progress.take().is_none() {
            return Err(GitError::NothingInProgress);
        }
        state.worktree.clear();
        Ok(())
    }

    fn abort_apply(&self) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        state.in_progress = None;
        state.worktree.clear();
        Ok(())
    }

    fn conflicted_content(&self) -> Result<Vec<ConflictedFile>, GitError> {
        let state = self.state.borrow();
        Ok(state
            .in_progress
            .as_ref()
            .map(|p| {
                p.paths
                    .iter()
                    .map(|path| ConflictedFile {
                        path: path.clone(),
                        content: state.worktree.get(path).cloned().flatten().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_worktree_files(&self, paths: &[String]) -> Result<Vec<ResolvedFile>, GitError> {
        let state = self.state.borrow();
        Ok(paths
            .iter()
            .map(|path| ResolvedFile {
                path: path.clone(),
                content: state.worktree.get(path).cloned().flatten(),
            })
            .collect())
    }

    fn apply_resolution(&self, files: &[ResolvedFile]) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        if state.in_progress.is_none() {
            return Err(GitError::NothingInProgress);
        }
        for file in files {
            state.worktree.insert(file.path.clone(), file.content.clone());
        }
        Ok(())
    }

    fn init_result_history(&self, repos: &[String]) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        state.history.clear();
        state.in_progress = None;
        state.worktree.clear();
        state.finalized = false;
        state.initialized_with = Some(repos.to_vec());
        Ok(())
    }

    fn finalize_history(&self) -> Result<(), GitError> {
        self.state.borrow_mut().finalized = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> GitOid {
        GitOid::from_bytes([n; 20])
    }

    fn conflicted(path: &str) -> ConflictedFile {
        ConflictedFile {
            path: path.to_owned(),
            content: format!("{CONFLICT_MARKER} ours\na\n=======\nb\n>>>>>>> theirs\n").into_bytes(),
        }
    }

    #[test]
    fn clean_apply_appends_to_history() {
        let fake = FakeRepo::new();
        fake.add_commit("a", oid(1), "+x\n");
        assert_eq!(fake.apply_patch("a", oid(1)).unwrap(), ApplyOutcome::Applied);
        assert_eq!(fake.history().len(), 1);
        assert_eq!(fake.attempts(), vec![("a".to_owned(), oid(1))]);
    }

    #[test]
    fn conflict_blocks_until_markers_removed() {
        let fake = FakeRepo::new();
        fake.add_commit("a", oid(1), "+x\n")
            .conflict_on("a", oid(1), vec![conflicted("f.txt")]);

        let outcome = fake.apply_patch("a", oid(1)).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Conflict(_)));
        assert_eq!(fake.in_progress(), Some(oid(1)));
        assert!(!fake.continue_apply().unwrap());

        fake.edit_worktree("f.txt", Some("merged\n"));
        assert!(fake.continue_apply().unwrap());
        assert_eq!(fake.in_progress(), None);
        let history = fake.history();
        assert_eq!(history[0].resolution[0].content.as_deref(), Some(&b"merged\n"[..]));
    }

    #[test]
    fn failing_commit_keeps_the_application_in_progress() {
        let fake = FakeRepo::new();
        fake.add_commit("a", oid(1), "+x\n")
            .conflict_on("a", oid(1), vec![conflicted("f.bin")])
            .fail_continue();
        fake.apply_patch("a", oid(1)).unwrap();
        fake.edit_worktree_bytes("f.bin", Some(&[0xff, 0x00, 0xfe]));

        assert!(matches!(fake.continue_apply(), Err(GitError::Command { .. })));
        assert_eq!(fake.in_progress(), Some(oid(1)));
        let read = fake.read_worktree_files(&["f.bin".to_owned()]).unwrap();
        assert_eq!(read[0].content.as_deref(), Some(&[0xff, 0x00, 0xfe][..]));

        fake.abort_apply().unwrap();
        assert_eq!(fake.in_progress(), None);
        assert!(fake.history().is_empty());
    }

    #[test]
    fn skip_without_progress_is_an_error() {
        let fake = FakeRepo::new();
        assert!(matches!(fake.skip_apply(), Err(GitError::NothingInProgress)));
        assert!(fake.abort_apply().is_ok());
    }

    #[test]
    fn resolve_revision_by_unique_prefix() {
        let fake = FakeRepo::new();
        fake.add_commit("a", oid(0x12), "");
        fake.add_commit("a", oid(0x34), "");
        assert_eq!(fake.resolve_revision("a", "1212").unwrap(), oid(0x12));
        assert!(fake.resolve_revision("a", "99").is_err());
        assert!(fake.resolve_revision("b", "12").is_err());
    }

    #[test]
    fn scripted_failure_is_a_command_error() {
        let fake = FakeRepo::new();
        fake.add_commit("a", oid(1), "+x\n").fail_on("a", oid(1));
        assert!(matches!(
            fake.apply_patch("a", oid(1)),
            Err(GitError::Command { .. })
        ));
        assert!(fake.history().is_empty());
    }
}
