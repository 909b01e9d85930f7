//! Version-control port for braid.
//!
//! This crate defines the [`ReplayRepo`] trait, the single interface through
//! which the replay engine talks to git. The engine never shells out or opens
//! repositories itself; it programs against the trait.
//!
//! # Crate layout
//!
//! - [`repo`]: the [`ReplayRepo`] trait definition.
//! - [`types`]: value types used in trait signatures ([`GitOid`],
//!   [`ApplyOutcome`], [`ConflictDetails`], etc.).
//! - [`error`]: the [`GitError`] enum returned by all trait methods.
//! - [`GitCli`]: the git-backed implementation.
//! - [`fake`]: an in-memory [`FakeRepo`] for tests.

pub mod error;
pub mod fake;
pub mod repo;
pub mod types;

mod git_cli;

pub use error::GitError;
pub use fake::FakeRepo;
pub use git_cli::GitCli;
pub use repo::ReplayRepo;
pub use types::{
    AncestryEntry, ApplyOutcome, ConflictDetails, ConflictedFile, GitOid, OidParseError,
    ReplayedMerge, ResolvedFile,
};
