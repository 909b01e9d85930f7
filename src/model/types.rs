//! Identifier types for braid.
//!
//! [`CommitId`] names a source commit, [`RepoId`] names a source repository.
//! Both validate on construction and serialize as plain strings.

use std::fmt;
use std::str::FromStr;

use braid_git::GitOid;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CommitId
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex commit hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(GitOid);

impl CommitId {
    /// Create a new `CommitId` from a hex string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        s.parse::<GitOid>().map(Self).map_err(|e| ValidationError {
            kind: ErrorKind::CommitId,
            value: e.value,
            reason: e.reason,
        })
    }

    /// Return the underlying object id, as the version-control port expects it.
    #[must_use]
    pub const fn oid(&self) -> GitOid {
        self.0
    }

    /// The first eight hex characters.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl From<GitOid> for CommitId {
    fn from(oid: GitOid) -> Self {
        Self(oid)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for CommitId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// RepoId
// ---------------------------------------------------------------------------

/// The name of a source repository.
///
/// Used as a directory name under the sources root, as a log file stem and
/// as a git remote name, so it must be a single non-empty path component
/// without whitespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Create a new `RepoId`, validating format.
    ///
    /// # Errors
    /// Returns an error if the name is empty, `.`/`..`, or contains a path
    /// separator or whitespace.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the repository name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        let reason = if s.is_empty() {
            Some("repository name must not be empty")
        } else if s == "." || s == ".." {
            Some("repository name must not be a relative path component")
        } else if s.contains(['/', '\\']) {
            Some("repository name must not contain a path separator")
        } else if s.chars().any(char::is_whitespace) {
            Some("repository name must not contain whitespace")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ValidationError {
                kind: ErrorKind::RepoId,
                value: s.to_owned(),
                reason: reason.to_owned(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepoId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

impl AsRef<str> for RepoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which type rejected a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`CommitId`] validation error.
    CommitId,
    /// A [`RepoId`] validation error.
    RepoId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommitId => write!(f, "CommitId"),
            Self::RepoId => write!(f, "RepoId"),
        }
    }
}

/// A validation error for braid identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
