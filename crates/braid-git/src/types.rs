//! Core types for the braid version-control port.
//!
//! These types form the vocabulary shared between the
//! [`ReplayRepo`](crate::ReplayRepo) trait and the replay engine. They contain
//! no gix or CLI types; the backend is an implementation detail.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (SHA-1, 20 bytes).
///
/// Stored as raw bytes for cheap comparison, hashing, and `Copy` semantics.
/// Displays as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// Create a `GitOid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The first eight hex characters, as printed in progress output.
    #[must_use]
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (slot, pair) in bytes.iter_mut().zip(s.as_bytes().chunks(2)) {
            let digit = |b: u8| {
                hex_digit(b).ok_or_else(|| OidParseError {
                    value: s.to_owned(),
                    reason: format!("invalid hex digit '{}'", b as char),
                })
            };
            *slot = (digit(pair[0])? << 4) | digit(pair[1])?;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Ancestry metadata
// ---------------------------------------------------------------------------

/// One line of a repository's history listing: the commit and its two
/// timestamps, exactly as git prints them (strict ISO 8601).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AncestryEntry {
    /// The commit.
    pub oid: GitOid,
    /// Author date (`%aI`).
    pub author_date: String,
    /// Committer date (`%cI`).
    pub commit_date: String,
}

// ---------------------------------------------------------------------------
// Apply outcome and conflicts
// ---------------------------------------------------------------------------

/// Result of trying to apply a commit's change to the result history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change was applied and committed.
    Applied,
    /// The change could not be merged automatically. An application is now
    /// in progress and must be continued, skipped, or aborted.
    Conflict(ConflictDetails),
}

/// Everything known about a failed application.
///
/// The engine treats `diff` as opaque display text; `files` is hashed to
/// derive the conflict signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictDetails {
    /// Human-readable diff of the conflicted state.
    pub diff: String,
    /// Every unmerged file with its current (marker-bearing) content.
    pub files: Vec<ConflictedFile>,
}

impl ConflictDetails {
    /// Paths of the conflicted files, in the order reported.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// A file left unmerged by a failed application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictedFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Working-tree bytes including conflict markers. Empty if the file is
    /// absent from the working tree (e.g. modify/delete).
    pub content: Vec<u8>,
}

/// The resolved state of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Final bytes, or `None` if the resolution deletes the file.
    pub content: Option<Vec<u8>>,
}

/// A historical merge re-performed in a scratch area during training.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedMerge {
    /// The conflicts the merge produces when redone mechanically.
    pub conflicts: Vec<ConflictedFile>,
    /// How the original merge commit resolved each conflicted path.
    pub resolution: Vec<ResolvedFile>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
