//! braid: merge several independently evolving git histories into one
//! chronological history.
//!
//! The pipeline, in order:
//!
//! - [`loader`] reads each repository's commit log;
//! - [`timeline`] truncates absorbed repositories and merges the histories by
//!   author date;
//! - [`chunk`] groups the timeline into same-repository runs for review;
//! - [`replay`] applies the timeline to the result history, skipping
//!   equivalent patches ([`fingerprint`]), replaying known resolutions
//!   ([`resolution_cache`]) and checkpointing as it goes ([`checkpoint`]);
//! - [`train`] primes the resolution cache from historical merges.
//!
//! All git access goes through [`braid_git::ReplayRepo`].

pub mod checkpoint;
pub mod chunk;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod model;
pub mod replay;
pub mod resolution_cache;
pub mod stats;
pub mod timeline;
pub mod train;

mod durable;

pub use config::BraidConfig;
pub use error::{LoadError, ReplayError};
pub use model::{Commit, CommitId, RepoId};
pub use timeline::{RepoHistory, Timeline};
