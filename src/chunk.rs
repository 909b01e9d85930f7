//! Grouping the timeline into same-repository runs for review.
//!
//! A chunk is a maximal run of consecutive timeline entries from one
//! repository. Chunks are never consumed by the replay engine; they exist so
//! an operator can see how the histories interleave before committing to a
//! run.

use std::fmt::{self, Write as _};

use braid_git::{GitError, ReplayRepo};

use crate::model::{Commit, RepoId};

/// A maximal run of consecutive commits from one repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    commits: &'a [Commit],
}

impl<'a> Chunk<'a> {
    /// The repository every commit in the chunk comes from.
    #[must_use]
    pub fn repository(&self) -> &'a RepoId {
        self.commits[0].repository()
    }

    #[must_use]
    pub const fn commits(&self) -> &'a [Commit] {
        self.commits
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.commits.len()
    }

    /// Always `false`: chunks have at least one commit.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

impl fmt::Display for Chunk<'_> {
    /// Singletons print as `{ c }`; two or three commits in full; longer
    /// runs as first, `... N ...`, last.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.commits {
            [only] => write!(f, "{{ {only} }}"),
            [first, middle @ .., last] if middle.len() <= 1 => {
                writeln!(f, "{{ {first}")?;
                for c in middle {
                    writeln!(f, "  {c}")?;
                }
                write!(f, "  {last} }}")
            }
            [first, middle @ .., last] => {
                writeln!(f, "{{ {first}")?;
                writeln!(f, "  ... {} ...", middle.len())?;
                write!(f, "  {last} }}")
            }
            [] => Ok(()),
        }
    }
}

/// Split `commits` into maximal same-repository runs. Single pass.
#[must_use]
pub fn chunks(commits: &[Commit]) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=commits.len() {
        let boundary =
            i == commits.len() || commits[i].repository() != commits[i - 1].repository();
        if boundary {
            out.push(Chunk {
                commits: &commits[start..i],
            });
            start = i;
        }
    }
    out
}

/// The chunk listing followed by the number of merge commits in the
/// timeline, as printed by `braid chunks`.
///
/// # Errors
/// Propagates the port's error while checking for merge commits.
pub fn render_chunks(commits: &[Commit], port: &dyn ReplayRepo) -> Result<String, GitError> {
    let mut out = String::new();
    let mut merges = 0usize;
    for chunk in chunks(commits) {
        let _ = writeln!(out, "{chunk}");
        for commit in chunk.commits() {
            if commit.is_merge(port)? {
                merges += 1;
            }
        }
    }
    let _ = writeln!(out, "{merges} merge commits");
    Ok(out)
}
