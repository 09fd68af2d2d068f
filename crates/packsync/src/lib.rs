//! # packsync
//!
//! Delta synchronization engine for named content bundles ("packages").
//!
//! This crate handles:
//! - Update detection against revision-tracked and plain HTTP sources
//! - Changeset computation between two remote revisions
//! - Delta application fetching only the changed files
//! - Fresh installation from a full archive, with single-root hoisting
//! - Persisted per-package installation state
//! - Protection of user-owned paths across every install and update
//!
//! ## Change detection
//!
//! Three strategies are reconciled, in priority order: a package with no
//! installation record always needs an install; a package installed from a
//! revision-tracked source compares fingerprints against the latest remote
//! revision; anything else falls back to HTTP cache validators
//! (`Last-Modified`, `ETag`, `Content-Length`) from a metadata-only
//! request. A transient network failure is never reported as an available
//! update.
//!
//! ## Safety
//!
//! Mutating operations never commit state mid-flight: the installation
//! record is written only after a delta or install completed, a fresh
//! install extracts to a staging directory before replacing the target,
//! and preserved paths are filtered from changesets and snapshotted around
//! full reinstalls.

pub mod archive;
pub mod changeset;
pub mod config;
pub mod delta;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod install;
pub mod manager;
pub mod preserve;
pub mod progress;
#[cfg(test)]
mod proptests;
pub mod revision;
pub mod source;
pub mod state;

// Re-export main types for convenience
pub use changeset::{resolve_changeset, Changeset, RemoteFileChange};
pub use config::{NetworkConfig, PreserveConfig, SyncConfig};
pub use delta::DeltaApplier;
pub use detect::{UpdateCheck, UpdateDetector};
pub use error::SyncError;
pub use fetch::{parse_size_hint, ContentFetcher, FetchOutcome};
pub use install::FreshInstaller;
pub use manager::{SyncManager, SyncOutcome};
pub use preserve::PreservedPaths;
pub use progress::{ProgressCallback, SyncProgress};
pub use revision::{bearer_auth, AuthHook, RevisionHost, RevisionInfo, RevisionProbe};
pub use source::{rewrite_direct_url, PackageSource, RepoRef, SourceEndpoints, SourceKind};
pub use state::{CacheValidators, InstallRecord, InstallationStateStore};
