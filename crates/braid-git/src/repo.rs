//! The [`ReplayRepo`] trait: the boundary between braid and git.
//!
//! The replay engine touches two kinds of repository through this trait:
//! the read-only *source* repositories (addressed by name) and the single
//! mutable *result* repository that the history is replayed into.
//!
//! | Group        | Methods                                                        |
//! |--------------|----------------------------------------------------------------|
//! | Sources      | `resolve_revision`, `list_ancestry_metadata`, `compute_patch`, |
//! |              | `is_merge_commit`, `merge_commits`, `replay_merge`             |
//! | Apply        | `apply_patch`, `continue_apply`, `skip_apply`, `abort_apply`   |
//! | Conflicts    | `conflicted_content`, `read_worktree_files`, `apply_resolution`|
//! | Lifecycle    | `init_result_history`, `finalize_history`                      |

use crate::error::GitError;
use crate::types::{AncestryEntry, ApplyOutcome, ConflictedFile, GitOid, ReplayedMerge, ResolvedFile};

/// The version-control port used by the replay engine.
///
/// Implementations may be backed by the git CLI ([`GitCli`](crate::GitCli))
/// or by a test double ([`FakeRepo`](crate::FakeRepo)).
///
/// # Clean failure
///
/// When [`apply_patch`](Self::apply_patch) returns an error (as opposed to a
/// conflict), the result history must be left without a partially-applied
/// commit, so that a later run can retry the same commit.
///
/// # Object safety
///
/// No generic methods; callers use `&dyn ReplayRepo`.
pub trait ReplayRepo {
    // -----------------------------------------------------------------------
    // Source repositories
    // -----------------------------------------------------------------------

    /// Resolve a revision specification in source repository `repo`.
    ///
    /// Returns [`GitError::NotFound`] if the spec cannot be resolved.
    fn resolve_revision(&self, repo: &str, spec: &str) -> Result<GitOid, GitError>;

    /// List every commit reachable from the repository's `HEAD`, oldest first.
    fn list_ancestry_metadata(&self, repo: &str) -> Result<Vec<AncestryEntry>, GitError>;

    /// The raw patch text of one commit. Empty if the commit changes nothing.
    ///
    /// Renames, mode changes and binary content appear as their extended
    /// header lines. Merge commits yield a combined diff against all parents.
    fn compute_patch(&self, repo: &str, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Whether the commit has more than one parent.
    fn is_merge_commit(&self, repo: &str, oid: GitOid) -> Result<bool, GitError>;

    /// Every merge commit reachable from the repository's `HEAD`, oldest first.
    fn merge_commits(&self, repo: &str) -> Result<Vec<GitOid>, GitError>;

    /// Redo merge `oid` mechanically in a scratch area.
    ///
    /// Returns `None` if the merge is clean, otherwise the conflicts it
    /// produces together with the content the original merge commit chose.
    /// Never touches the result history.
    fn replay_merge(&self, repo: &str, oid: GitOid) -> Result<Option<ReplayedMerge>, GitError>;

    // -----------------------------------------------------------------------
    // Applying to the result history
    // -----------------------------------------------------------------------

    /// Apply commit `oid` from source repository `repo` to the result history,
    /// preserving its authorship.
    ///
    /// An application left in progress by an interrupted run is discarded
    /// first; backends that cannot discard it return an error instead.
    fn apply_patch(&self, repo: &str, oid: GitOid) -> Result<ApplyOutcome, GitError>;

    /// Finalize the in-progress application.
    ///
    /// Returns `Ok(false)` if the working state is still unresolved; the
    /// application stays in progress.
    fn continue_apply(&self) -> Result<bool, GitError>;

    /// Drop the in-progress application without committing anything.
    fn skip_apply(&self) -> Result<(), GitError>;

    /// Roll back the in-progress application, restoring the state before
    /// [`apply_patch`](Self::apply_patch). No-op if nothing is in progress.
    fn abort_apply(&self) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Conflict inspection and resolution
    // -----------------------------------------------------------------------

    /// Every currently unmerged file in the result working tree.
    fn conflicted_content(&self) -> Result<Vec<ConflictedFile>, GitError>;

    /// Current working-tree content of `paths` (`None` for absent files).
    fn read_worktree_files(&self, paths: &[String]) -> Result<Vec<ResolvedFile>, GitError>;

    /// Write and stage the given resolution in the result working tree.
    fn apply_resolution(&self, files: &[ResolvedFile]) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Result history lifecycle
    // -----------------------------------------------------------------------

    /// Create an empty result history with every source repository available
    /// to [`apply_patch`](Self::apply_patch). Destroys any previous result.
    fn init_result_history(&self, repos: &[String]) -> Result<(), GitError>;

    /// Rewrite the result history so each commit's committer date equals its
    /// author date.
    fn finalize_history(&self) -> Result<(), GitError>;
}
