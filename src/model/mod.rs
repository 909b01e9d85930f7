//! braid data model: identifiers and the commit record.

pub mod commit;
pub mod types;

pub use commit::Commit;
pub use types::{CommitId, ErrorKind, RepoId, ValidationError};
