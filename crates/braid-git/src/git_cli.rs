//! The git-backed implementation of [`ReplayRepo`].
//!
//! Read-only object lookups (rev-parse, parent lists) go through gix.
//! Everything that mutates a working tree (cherry-pick, merge, staging,
//! filter-branch) runs the git CLI, since those porcelain operations have no
//! library equivalent.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info, instrument, warn};

use crate::error::GitError;
use crate::repo::ReplayRepo;
use crate::types::{
    AncestryEntry, ApplyOutcome, ConflictDetails, ConflictedFile, GitOid, ReplayedMerge,
    ResolvedFile,
};

/// A [`ReplayRepo`] backed by the git CLI and gix.
///
/// Source repositories live at `<sources_root>/<name>`; the result history is
/// a separate repository at `result`, which fetches every source as a remote
/// of the same name.
pub struct GitCli {
    sources_root: PathBuf,
    result: PathBuf,
    branch: String,
    committer: Option<(String, String)>,
}

impl GitCli {
    /// Create a port over the given source root and result repository path.
    pub fn new(
        sources_root: impl Into<PathBuf>,
        result: impl Into<PathBuf>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            sources_root: sources_root.into(),
            result: result.into(),
            branch: branch.into(),
            committer: None,
        }
    }

    /// Set the committer identity written into a freshly initialized result
    /// repository. Without it, git's global identity is used.
    #[must_use]
    pub fn with_committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer = Some((name.into(), email.into()));
        self
    }

    /// Path of the result repository's working tree.
    #[must_use]
    pub fn result_dir(&self) -> &Path {
        &self.result
    }

    fn source_dir(&self, repo: &str) -> PathBuf {
        self.sources_root.join(repo)
    }

    fn open_source(&self, repo: &str) -> Result<gix::Repository, GitError> {
        gix::open(self.source_dir(repo)).map_err(|e| GitError::BackendError {
            message: format!("open source repository `{repo}`: {e}"),
        })
    }

    fn parents(&self, repo: &str, oid: GitOid) -> Result<Vec<GitOid>, GitError> {
        let source = self.open_source(repo)?;
        let commit = source
            .find_commit(to_gix_oid(oid))
            .map_err(|e| GitError::NotFound {
                message: format!("commit {oid} in `{repo}`: {e}"),
            })?;
        let decoded = commit.decode().map_err(|e| GitError::BackendError {
            message: format!("failed to decode commit {oid}: {e}"),
        })?;
        decoded.parents().map(|p| from_gix_oid(&p)).collect()
    }

    fn cherry_pick_in_progress(&self) -> Result<bool, GitError> {
        let out = run(&self.result, &["rev-parse", "-q", "--verify", "CHERRY_PICK_HEAD"])?;
        Ok(out.status.success())
    }

    /// Redo the merge of `others` into the worktree at `wt` (checked out at
    /// the first parent) and collect what the original merge `oid` chose.
    fn redo_merge(
        wt: &Path,
        oid: GitOid,
        others: &[GitOid],
    ) -> Result<Option<ReplayedMerge>, GitError> {
        let others: Vec<String> = others.iter().map(ToString::to_string).collect();
        let mut args = vec!["merge", "--no-commit", "--no-ff", "--quiet"];
        args.extend(others.iter().map(String::as_str));

        let out = run(wt, &args)?;
        if out.status.success() {
            return Ok(None);
        }

        let conflicts = unmerged_files(wt)?;
        if conflicts.is_empty() {
            return Err(command_error(&args, &out));
        }

        let rev = oid.to_string();
        let mut resolution = Vec::with_capacity(conflicts.len());
        for file in &conflicts {
            let spec = format!("{rev}:{}", file.path);
            let shown = run(wt, &["show", &spec])?;
            let content = shown.status.success().then_some(shown.stdout);
            resolution.push(ResolvedFile {
                path: file.path.clone(),
                content,
            });
        }
        Ok(Some(ReplayedMerge {
            conflicts,
            resolution,
        }))
    }
}

impl ReplayRepo for GitCli {
    fn resolve_revision(&self, repo: &str, spec: &str) -> Result<GitOid, GitError> {
        let source = self.open_source(repo)?;
        let id = source
            .rev_parse_single(spec)
            .map_err(|e| GitError::NotFound {
                message: format!("rev-parse '{spec}' in `{repo}`: {e}"),
            })?;
        from_gix_oid(&id.detach())
    }

    fn list_ancestry_metadata(&self, repo: &str) -> Result<Vec<AncestryEntry>, GitError> {
        let args = ["log", "--reverse", "--format=%H %aI %cI", "HEAD"];
        let listing = stdout(&self.source_dir(repo), &args)?;
        listing
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(hash), Some(author), Some(commit)) => Ok(AncestryEntry {
                        oid: hash.parse::<GitOid>()?,
                        author_date: author.to_owned(),
                        commit_date: commit.to_owned(),
                    }),
                    _ => Err(GitError::UnexpectedOutput {
                        command: format!("git {}", args.join(" ")),
                        message: format!("malformed line {line:?}"),
                    }),
                }
            })
            .collect()
    }

    fn compute_patch(&self, repo: &str, oid: GitOid) -> Result<Vec<u8>, GitError> {
        let dir = self.source_dir(repo);
        let rev = oid.to_string();
        // Renames, mode changes and binary content must show up in the
        // patch text or the commit would look empty.
        let range = format!("{rev}^!");
        let (mut args, target) = match self.parents(repo, oid)?.len() {
            0 => (vec!["diff-tree", "-p", "--root", "--no-commit-id"], rev.as_str()),
            1 => (vec!["diff", "--no-color", "--no-ext-diff"], range.as_str()),
            _ => (vec!["diff-tree", "-p", "-c", "--no-commit-id"], rev.as_str()),
        };
        args.extend(["-M", "--binary", "--full-index", target]);
        stdout_bytes(&dir, &args)
    }

    fn is_merge_commit(&self, repo: &str, oid: GitOid) -> Result<bool, GitError> {
        Ok(self.parents(repo, oid)?.len() > 1)
    }

    fn merge_commits(&self, repo: &str) -> Result<Vec<GitOid>, GitError> {
        stdout(&self.source_dir(repo), &["rev-list", "--reverse", "--merges", "HEAD"])?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim().parse::<GitOid>().map_err(GitError::from))
            .collect()
    }

    #[instrument(skip(self))]
    fn replay_merge(&self, repo: &str, oid: GitOid) -> Result<Option<ReplayedMerge>, GitError> {
        let parents = self.parents(repo, oid)?;
        let Some((first, others)) = parents.split_first() else {
            return Ok(None);
        };
        if others.is_empty() {
            return Ok(None);
        }

        let dir = self.source_dir(repo);
        let scratch = tempfile::TempDir::new()?;
        let wt = scratch.path().join("merge");
        let wt_str = wt.to_string_lossy().into_owned();
        let first = first.to_string();
        stdout(&dir, &["worktree", "add", "--detach", "--quiet", &wt_str, &first])?;

        let replayed = Self::redo_merge(&wt, oid, others);

        if let Err(e) = stdout(&dir, &["worktree", "remove", "--force", &wt_str]) {
            warn!("failed to remove scratch worktree {wt_str}: {e}");
        }
        replayed
    }

    #[instrument(skip(self))]
    fn apply_patch(&self, repo: &str, oid: GitOid) -> Result<ApplyOutcome, GitError> {
        if self.cherry_pick_in_progress()? {
            // Left behind by a killed run. Its changes were never committed.
            warn!("discarding stale cherry-pick in {}", self.result.display());
            stdout(&self.result, &["cherry-pick", "--abort"])?;
        }
        let merge = self.is_merge_commit(repo, oid)?;
        let rev = oid.to_string();
        let mut args = vec!["cherry-pick", "--allow-empty", "--keep-redundant-commits"];
        if merge {
            args.extend(["-m", "1"]);
        }
        args.push(&rev);

        let out = run(&self.result, &args)?;
        if out.status.success() {
            debug!("applied cleanly");
            return Ok(ApplyOutcome::Applied);
        }

        let files = self.conflicted_content()?;
        if files.is_empty() {
            // Not a content conflict. Leave the result clean so the commit
            // can be retried after a resume.
            if let Err(e) = self.abort_apply() {
                warn!("failed to roll back cherry-pick of {rev}: {e}");
            }
            return Err(command_error(&args, &out));
        }

        let diff = stdout(&self.result, &["diff", "--no-color", "--no-ext-diff"])?;
        Ok(ApplyOutcome::Conflict(ConflictDetails { diff, files }))
    }

    fn continue_apply(&self) -> Result<bool, GitError> {
        if !self.cherry_pick_in_progress()? {
            return Err(GitError::NothingInProgress);
        }
        if !unmerged_files(&self.result)?.is_empty() {
            debug!("unmerged paths remain; cannot continue");
            return Ok(false);
        }

        // `git commit` picks up authorship and message from CHERRY_PICK_HEAD
        // and clears the cherry-pick state. `--allow-empty` covers
        // resolutions that end up matching HEAD.
        let out = Command::new("git")
            .args(["commit", "--allow-empty", "--no-edit", "--quiet"])
            .env("GIT_EDITOR", "true")
            .current_dir(&self.result)
            .output()?;
        if out.status.success() {
            return Ok(true);
        }
        debug!(
            stderr = %String::from_utf8_lossy(&out.stderr).trim(),
            "commit of resolved cherry-pick refused"
        );
        Ok(false)
    }

    fn skip_apply(&self) -> Result<(), GitError> {
        if !self.cherry_pick_in_progress()? {
            return Err(GitError::NothingInProgress);
        }
        stdout(&self.result, &["cherry-pick", "--skip"]).map(drop)
    }

    fn abort_apply(&self) -> Result<(), GitError> {
        if !self.cherry_pick_in_progress()? {
            return Ok(());
        }
        stdout(&self.result, &["cherry-pick", "--abort"]).map(drop)
    }

    fn conflicted_content(&self) -> Result<Vec<ConflictedFile>, GitError> {
        unmerged_files(&self.result)
    }

    fn read_worktree_files(&self, paths: &[String]) -> Result<Vec<ResolvedFile>, GitError> {
        paths
            .iter()
            .map(|path| {
                Ok(ResolvedFile {
                    path: path.clone(),
                    content: read_optional(&self.result.join(path))?,
                })
            })
            .collect()
    }

    fn apply_resolution(&self, files: &[ResolvedFile]) -> Result<(), GitError> {
        for file in files {
            let target = self.result.join(&file.path);
            match &file.content {
                Some(content) => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&target, content)?;
                    stdout(&self.result, &["add", "--", &file.path])?;
                }
                None => {
                    match fs::remove_file(&target) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                    stdout(
                        &self.result,
                        &["rm", "--cached", "--quiet", "--ignore-unmatch", "--", &file.path],
                    )?;
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn init_result_history(&self, repos: &[String]) -> Result<(), GitError> {
        if self.result.exists() {
            fs::remove_dir_all(&self.result)?;
        }
        fs::create_dir_all(&self.result)?;

        stdout(&self.result, &["init", "--quiet"])?;
        let head = format!("refs/heads/{}", self.branch);
        stdout(&self.result, &["symbolic-ref", "HEAD", &head])?;
        if let Some((name, email)) = &self.committer {
            stdout(&self.result, &["config", "user.name", name])?;
            stdout(&self.result, &["config", "user.email", email])?;
        }

        for repo in repos {
            let source = fs::canonicalize(self.source_dir(repo))?;
            let source = source.to_string_lossy();
            info!(repo = %repo, "fetching source repository");
            stdout(&self.result, &["remote", "add", repo, &source])?;
            stdout(&self.result, &["fetch", "--quiet", "--no-tags", repo])?;
        }
        Ok(())
    }

    fn finalize_history(&self) -> Result<(), GitError> {
        if !run(&self.result, &["rev-parse", "-q", "--verify", "HEAD"])?
            .status
            .success()
        {
            info!("result history is empty; nothing to finalize");
            return Ok(());
        }

        let args = [
            "filter-branch",
            "-f",
            "--env-filter",
            r#"export GIT_COMMITTER_DATE="$GIT_AUTHOR_DATE""#,
        ];
        let out = Command::new("git")
            .args(args)
            .env("FILTER_BRANCH_SQUELCH_WARNING", "1")
            .current_dir(&self.result)
            .output()?;
        if out.status.success() {
            Ok(())
        } else {
            Err(command_error(&args, &out))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(id: &gix::oid) -> Result<GitOid, GitError> {
    let bytes: [u8; 20] = id.as_bytes().try_into().map_err(|_| GitError::BackendError {
        message: format!("unsupported object id {id}: expected SHA-1"),
    })?;
    Ok(GitOid::from_bytes(bytes))
}

/// Run git in `dir`, returning the raw output whatever the exit status.
fn run(dir: &Path, args: &[&str]) -> Result<Output, GitError> {
    Ok(Command::new("git").args(args).current_dir(dir).output()?)
}

/// Run git in `dir` and return stdout, failing on a non-zero exit.
fn stdout_bytes(dir: &Path, args: &[&str]) -> Result<Vec<u8>, GitError> {
    let out = run(dir, args)?;
    if out.status.success() {
        Ok(out.stdout)
    } else {
        Err(command_error(args, &out))
    }
}

fn stdout(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let bytes = stdout_bytes(dir, args)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn command_error(args: &[&str], out: &Output) -> GitError {
    GitError::Command {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
        exit_code: out.status.code(),
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, GitError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every unmerged path in the worktree at `dir`, with its current content.
fn unmerged_files(dir: &Path) -> Result<Vec<ConflictedFile>, GitError> {
    let listing = stdout(dir, &["diff", "--name-only", "--diff-filter=U"])?;
    let mut paths: Vec<&str> = listing.lines().filter(|l| !l.is_empty()).collect();
    paths.dedup();
    paths
        .into_iter()
        .map(|path| {
            Ok(ConflictedFile {
                path: path.to_owned(),
                content: read_optional(&dir.join(path))?.unwrap_or_default(),
            })
        })
        .collect()
}
