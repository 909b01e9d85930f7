//! Commit log loading.
//!
//! Each source repository is described by `<data_dir>/<repo>.log`, one line
//! per commit in ancestry order:
//!
//! ```text
//! 3f2a...e1 2019-04-02T10:15:00+02:00 2019-04-02T10:15:00+02:00
//! ```
//!
//! Blank lines are ignored; anything else that does not parse fails the
//! whole load. [`export_log`] writes the same format from a repository's
//! history.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use braid_git::ReplayRepo;
use chrono::{DateTime, FixedOffset};
use tracing::{debug, info};

use crate::config::BraidConfig;
use crate::error::LoadError;
use crate::model::{Commit, CommitId, RepoId};
use crate::timeline::RepoHistory;

/// Load the commit log of every configured repository, in configuration
/// order.
///
/// # Errors
/// Fails on the first unreadable file or malformed line, or if a repository
/// is listed twice.
pub fn load_histories(config: &BraidConfig) -> Result<Vec<RepoHistory>, LoadError> {
    let mut seen = HashSet::new();
    let mut histories = Vec::with_capacity(config.sources.repos.len());
    for repo in &config.sources.repos {
        if !seen.insert(repo) {
            return Err(LoadError::DuplicateRepository {
                repository: repo.clone(),
            });
        }
        histories.push(load_log(repo, &config.log_path(repo))?);
    }
    Ok(histories)
}

/// Load one repository's commit log.
///
/// # Errors
/// [`LoadError::Io`] if the file cannot be read, [`LoadError::MalformedLine`]
/// for the first bad line.
pub fn load_log(repo: &RepoId, path: &Path) -> Result<RepoHistory, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    let commits = parse_log(repo, path, &text)?;
    debug!(repo = %repo, commits = commits.len(), "loaded commit log");
    Ok(RepoHistory::new(repo.clone(), commits))
}

/// Parse commit log text. `path` is only used in error messages.
///
/// # Errors
/// [`LoadError::MalformedLine`] for the first line that is not
/// `hash authorISO8601 commitISO8601`.
pub fn parse_log(repo: &RepoId, path: &Path, text: &str) -> Result<Vec<Commit>, LoadError> {
    let malformed = |line: usize, reason: String| LoadError::MalformedLine {
        path: path.to_owned(),
        line,
        reason,
    };

    let mut commits = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [hash, author, committed] = fields.as_slice() else {
            if fields.is_empty() {
                continue;
            }
            return Err(malformed(
                lineno,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        };

        let hash = CommitId::new(hash).map_err(|e| malformed(lineno, e.to_string()))?;
        let author = parse_date(author).map_err(|e| malformed(lineno, format!("author date: {e}")))?;
        let committed =
            parse_date(committed).map_err(|e| malformed(lineno, format!("commit date: {e}")))?;
        commits.push(Commit::new(hash, repo.clone(), author, committed));
    }
    Ok(commits)
}

fn parse_date(s: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("{s:?}: {e}"))
}

/// Write `<data_dir>/<repo>.log` from the repository's ancestry.
///
/// Returns the number of commits written.
///
/// # Errors
/// [`LoadError::Listing`] if the port cannot list the history,
/// [`LoadError::Io`] if the file cannot be written.
pub fn export_log(port: &dyn ReplayRepo, repo: &RepoId, path: &Path) -> Result<usize, LoadError> {
    let entries = port
        .list_ancestry_metadata(repo.as_str())
        .map_err(|source| LoadError::Listing {
            repository: repo.clone(),
            source,
        })?;

    let mut text = String::new();
    for entry in &entries {
        let _ = writeln!(text, "{} {} {}", entry.oid, entry.author_date, entry.commit_date);
    }

    let io_err = |source| LoadError::Io {
        path: path.to_owned(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, text).map_err(io_err)?;
    info!(repo = %repo, commits = entries.len(), path = %path.display(), "wrote commit log");
    Ok(entries.len())
}
