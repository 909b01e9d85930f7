//! braid configuration (`braid.toml`).
//!
//! Names the source repositories and where they live, which histories were
//! absorbed into another and where they stop being unique, the result
//! repository, the resolution cache directory and operator settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{CommitId, RepoId};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level braid configuration.
///
/// Missing fields use defaults. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BraidConfig {
    /// Source repositories and input data.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// The combined history being built.
    #[serde(default)]
    pub result: ResultConfig,

    /// Resolution cache location.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Conflict prompt behaviour.
    #[serde(default)]
    pub operator: OperatorConfig,
}

// ---------------------------------------------------------------------------
// SourcesConfig
// ---------------------------------------------------------------------------

/// Where the source histories come from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// Source repositories, in tie-break order.
    #[serde(default)]
    pub repos: Vec<RepoId>,

    /// Directory holding one checkout per repository (default: `".."`).
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory for commit logs, checkpoint and outcome ledger
    /// (default: `"data"`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Repositories whose later history duplicates another repository.
    #[serde(default)]
    pub absorbed: Vec<AbsorbedRepo>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            root: default_root(),
            data_dir: default_data_dir(),
            absorbed: Vec::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("..")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// A repository that only contributes commits up to and including
/// `last_unique`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbsorbedRepo {
    /// The truncated repository.
    pub repo: RepoId,
    /// Its last commit not duplicated elsewhere.
    pub last_unique: CommitId,
}

// ---------------------------------------------------------------------------
// ResultConfig
// ---------------------------------------------------------------------------

/// The result repository.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultConfig {
    /// Path of the result repository (default: `"cake"`).
    #[serde(default = "default_result_path")]
    pub path: PathBuf,

    /// Branch the history is built on (default: `"main"`).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Copy author dates onto committer dates after a completed run
    /// (default: `true`).
    #[serde(default = "default_finalize")]
    pub finalize: bool,

    /// Committer name for the replayed commits. Falls back to git's own
    /// configuration when unset.
    #[serde(default)]
    pub committer_name: Option<String>,

    /// Committer email, paired with `committer_name`.
    #[serde(default)]
    pub committer_email: Option<String>,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            path: default_result_path(),
            branch: default_branch(),
            finalize: default_finalize(),
            committer_name: None,
            committer_email: None,
        }
    }
}

fn default_result_path() -> PathBuf {
    PathBuf::from("cake")
}

fn default_branch() -> String {
    "main".to_owned()
}

const fn default_finalize() -> bool {
    true
}

impl ResultConfig {
    /// The configured committer identity, if both halves are set.
    #[must_use]
    pub fn committer(&self) -> Option<(&str, &str)> {
        match (&self.committer_name, &self.committer_email) {
            (Some(name), Some(email)) => Some((name, email)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Resolution cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache directory (default: `"data/rerere-cache"`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/rerere-cache")
}

// ---------------------------------------------------------------------------
// OperatorConfig
// ---------------------------------------------------------------------------

/// How the conflict prompt behaves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Seconds to wait for an answer before quitting; `0` waits forever.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Shell spawned for manual fixes. Defaults to `$SHELL`, then `sh`.
    #[serde(default)]
    pub shell: Option<String>,
}

impl OperatorConfig {
    /// The prompt timeout, `None` when unbounded.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

// ---------------------------------------------------------------------------
// Derived paths
// ---------------------------------------------------------------------------

impl BraidConfig {
    /// `<data_dir>/<repo>.log`
    #[must_use]
    pub fn log_path(&self, repo: &RepoId) -> PathBuf {
        self.sources.data_dir.join(format!("{repo}.log"))
    }

    /// `<data_dir>/commit`
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.sources.data_dir.join("commit")
    }

    /// `<data_dir>/outcomes.jsonl`
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.sources.data_dir.join("outcomes.jsonl")
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a braid configuration file.
#[derive(Debug, Error)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl BraidConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or invalid
    /// repository names and commit hashes.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "b21f4191e24d28b2ba70b26a00965206ac855e8d";

    #[test]
    fn defaults_all_fields() {
        let cfg = BraidConfig::default();
        assert!(cfg.sources.repos.is_empty());
        assert_eq!(cfg.sources.root, PathBuf::from(".."));
        assert_eq!(cfg.sources.data_dir, PathBuf::from("data"));
        assert!(cfg.sources.absorbed.is_empty());
        assert_eq!(cfg.result.path, PathBuf::from("cake"));
        assert_eq!(cfg.result.branch, "main");
        assert!(cfg.result.finalize);
        assert_eq!(cfg.result.committer(), None);
        assert_eq!(cfg.cache.dir, PathBuf::from("data/rerere-cache"));
        assert_eq!(cfg.operator.timeout(), None);
        assert_eq!(cfg.operator.shell, None);
    }

    #[test]
    fn parse_empty_string() {
        assert_eq!(BraidConfig::parse("").unwrap(), BraidConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = format!(
            r#"
[sources]
repos = ["configuration", "dotfiles", "nix-config"]
root = "/src"
data_dir = "state"

[[sources.absorbed]]
repo = "configuration"
last_unique = "{BOUNDARY}"

[result]
path = "out"
branch = "trunk"
finalize = false
committer_name = "Braid"
committer_email = "braid@example.com"

[cache]
dir = "state/cache"

[operator]
timeout_secs = 30
shell = "fish"
"#
        );
        let cfg = BraidConfig::parse(&toml).unwrap();
        assert_eq!(cfg.sources.repos.len(), 3);
        assert_eq!(cfg.sources.repos[1].as_str(), "dotfiles");
        assert_eq!(cfg.sources.absorbed[0].repo.as_str(), "configuration");
        assert_eq!(cfg.sources.absorbed[0].last_unique.to_string(), BOUNDARY);
        assert_eq!(cfg.result.branch, "trunk");
        assert!(!cfg.result.finalize);
        assert_eq!(cfg.result.committer(), Some(("Braid", "braid@example.com")));
        assert_eq!(cfg.operator.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.operator.shell.as_deref(), Some("fish"));
        assert_eq!(cfg.checkpoint_path(), PathBuf::from("state/commit"));
        assert_eq!(cfg.ledger_path(), PathBuf::from("state/outcomes.jsonl"));
        assert_eq!(
            cfg.log_path(&cfg.sources.repos[0]),
            PathBuf::from("state/configuration.log")
        );
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let cfg = BraidConfig::parse("[result]\nbranch = \"trunk\"\n").unwrap();
        assert_eq!(cfg.result.branch, "trunk");
        assert_eq!(cfg.result.path, PathBuf::from("cake"));
        assert!(cfg.result.finalize);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        assert!(BraidConfig::parse("[bogus]\n").is_err());
        assert!(BraidConfig::parse("[result]\ncolour = true\n").is_err());
    }

    #[test]
    fn parse_rejects_invalid_identifiers() {
        assert!(BraidConfig::parse("[sources]\nrepos = [\"a/b\"]\n").is_err());
        let bad = "[[sources.absorbed]]\nrepo = \"x\"\nlast_unique = \"abc\"\n";
        assert!(BraidConfig::parse(bad).is_err());
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let toml = "[sources]\nroot = \"..\"\nrepos = 42\n";
        let err = BraidConfig::parse(toml).unwrap_err();
        assert!(err.message.starts_with("line "), "{}", err.message);
    }

    #[test]
    fn committer_needs_both_halves() {
        let cfg = BraidConfig::parse("[result]\ncommitter_name = \"x\"\n").unwrap();
        assert_eq!(cfg.result.committer(), None);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = BraidConfig::load(Path::new("/nonexistent/braid.toml")).unwrap();
        assert_eq!(cfg, BraidConfig::default());
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("braid.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = BraidConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }

    #[test]
    fn config_error_display_without_path() {
        let err = ConfigError {
            path: None,
            message: "parse error".to_owned(),
        };
        assert_eq!(err.to_string(), "config error: parse error");
    }
}
