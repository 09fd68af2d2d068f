//! Synchronization manager: the full check → delta → fresh-install flow.
//!
//! One manager serves any number of packages; each `sync` call runs to
//! completion on the invoking task. Packages are independent except for the
//! installation store, which serializes its own writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::delta::DeltaApplier;
use crate::detect::{UpdateCheck, UpdateDetector};
use crate::error::SyncError;
use crate::fetch::ContentFetcher;
use crate::install::{install_target, FreshInstaller};
use crate::preserve::PreservedPaths;
use crate::progress::ProgressCallback;
use crate::revision::{bearer_auth, RevisionHost, RevisionProbe};
use crate::source::PackageSource;
use crate::state::InstallationStateStore;

/// How a sync call concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do.
    UpToDate { reason: String },
    /// The changeset between the recorded and latest revisions was applied.
    DeltaApplied { fingerprint: String },
    /// The package was (re)installed from a full archive.
    FreshInstalled,
}

/// Orchestrates update detection and application for named packages.
pub struct SyncManager {
    store: Arc<InstallationStateStore>,
    host: Arc<dyn RevisionHost>,
    detector: UpdateDetector,
    applier: DeltaApplier,
    installer: FreshInstaller,
    preserved: PreservedPaths,
}

impl SyncManager {
    /// Build a manager from configuration.
    pub fn new(config: SyncConfig) -> Self {
        let mut probe = RevisionProbe::new(config.endpoints.clone(), &config.network);
        if let Some(token) = &config.auth_token {
            probe = probe.with_auth(bearer_auth(token.clone()));
        }
        Self::with_host(config, Arc::new(probe))
    }

    /// Build a manager with a custom revision host (used by tests).
    pub fn with_host(config: SyncConfig, host: Arc<dyn RevisionHost>) -> Self {
        let store = Arc::new(InstallationStateStore::new(config.state_file.clone()));
        let fetcher = ContentFetcher::with_config(&config.network);
        let preserved = PreservedPaths::new(config.preserve.paths.clone());

        let detector = UpdateDetector::new(Arc::clone(&store), Arc::clone(&host), fetcher.clone());
        let applier = DeltaApplier::new(
            Arc::clone(&host),
            fetcher.clone(),
            Arc::clone(&store),
            config.endpoints.clone(),
            preserved.clone(),
        );
        let installer = FreshInstaller::new(
            fetcher,
            Arc::clone(&host),
            Arc::clone(&store),
            config.endpoints.clone(),
        );

        Self {
            store,
            host,
            detector,
            applier,
            installer,
            preserved,
        }
    }

    /// The installation store backing this manager.
    pub fn store(&self) -> &Arc<InstallationStateStore> {
        &self.store
    }

    /// Check whether `name` needs an update, without changing anything.
    pub async fn check(
        &self,
        name: &str,
        source_url: &str,
        fallback_last_modified: Option<DateTime<Utc>>,
    ) -> UpdateCheck {
        self.detector
            .check(name, source_url, fallback_last_modified)
            .await
    }

    /// Bring `install_dir/name` up to date with `source_url`.
    ///
    /// Tries the cheapest applicable strategy: nothing when already
    /// current, a delta when the recorded and latest revisions can be
    /// compared, and otherwise a full reinstall with preserved paths
    /// snapshotted around the wipe.
    pub async fn sync(
        &self,
        name: &str,
        source_url: &str,
        install_dir: &Path,
        size_hint: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<SyncOutcome, SyncError> {
        let check = self.detector.check(name, source_url, None).await;
        if !check.update_needed {
            info!("{}: {}", name, check.reason);
            return Ok(SyncOutcome::UpToDate {
                reason: check.reason,
            });
        }
        info!("{}: update needed ({})", name, check.reason);

        let source = PackageSource::resolve(source_url);
        if let Some(fingerprint) = self
            .try_delta(name, &source, install_dir, progress.clone())
            .await
        {
            return Ok(SyncOutcome::DeltaApplied { fingerprint });
        }

        self.fresh_install_preserving(&source, install_dir, name, size_hint, progress)
            .await?;
        Ok(SyncOutcome::FreshInstalled)
    }

    /// Attempt a delta update; `None` means "fall back to a fresh install".
    async fn try_delta(
        &self,
        name: &str,
        source: &PackageSource,
        install_dir: &Path,
        progress: Option<ProgressCallback>,
    ) -> Option<String> {
        let repo = source.repo()?;
        let record = self.store.get(name)?;
        let old_fingerprint = record.revision_fingerprint?;

        let latest = match self.host.latest_revision(repo).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("{}: latest revision unavailable, falling back: {}", name, e);
                return None;
            }
        };

        let changeset = match self
            .host
            .changed_paths(repo, &old_fingerprint, &latest.fingerprint)
            .await
        {
            Ok(changeset) => changeset,
            Err(e) => {
                warn!("{}: revision comparison unavailable, falling back: {}", name, e);
                return None;
            }
        };

        let target = install_target(install_dir, name);
        if self
            .applier
            .apply(&target, &changeset, source, &latest.fingerprint, progress)
            .await
        {
            Some(latest.fingerprint)
        } else {
            warn!("{}: delta application failed, falling back", name);
            None
        }
    }

    /// Fresh install with preserved paths snapshotted around the wipe.
    async fn fresh_install_preserving(
        &self,
        source: &PackageSource,
        install_dir: &Path,
        name: &str,
        size_hint: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<(), SyncError> {
        let target = install_target(install_dir, name);
        let scratch = install_dir.join(format!("{name}.preserved"));
        let snapshot = snapshot_preserved(&target, &scratch, &self.preserved)?;

        let result = self
            .installer
            .install(source, install_dir, name, size_hint, progress)
            .await;

        // Prior user data wins over whatever the archive shipped; on
        // failure it is put back where it was found.
        if result.is_err() && !snapshot.is_empty() {
            std::fs::create_dir_all(&target)?;
        }
        restore_preserved(&target, snapshot)?;
        if scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }

        result
    }
}

/// Move existing preserved paths out of `target` into `scratch`.
///
/// Returns the moved entries as (relative prefix, scratch location) pairs.
fn snapshot_preserved(
    target: &Path,
    scratch: &Path,
    preserved: &PreservedPaths,
) -> Result<Vec<(String, PathBuf)>, SyncError> {
    let mut moved = Vec::new();
    if !target.exists() {
        return Ok(moved);
    }

    for (index, prefix) in preserved.prefixes().iter().enumerate() {
        let src = target.join(prefix);
        if !src.exists() {
            continue;
        }
        std::fs::create_dir_all(scratch)?;
        let dst = scratch.join(index.to_string());
        std::fs::rename(&src, &dst)?;
        info!("snapshotted preserved path {:?}", prefix);
        moved.push((prefix.clone(), dst));
    }
    Ok(moved)
}

/// Move snapshotted entries back under `target`, replacing any freshly
/// extracted content at the same paths.
fn restore_preserved(target: &Path, snapshot: Vec<(String, PathBuf)>) -> Result<(), SyncError> {
    for (prefix, snap) in snapshot {
        let dst = target.join(&prefix);
        if dst.exists() {
            if dst.is_dir() {
                std::fs::remove_dir_all(&dst)?;
            } else {
                std::fs::remove_file(&dst)?;
            }
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&snap, &dst)?;
        info!("restored preserved path {:?}", prefix);
    }
    Ok(())
}
