//! Fresh installation: the full download-extract-relocate pipeline.
//!
//! Used for first installs, for sources with no revision history, and as
//! the recovery path when delta application is not possible. The existing
//! package directory is replaced wholesale, so preserved-path protection is
//! the caller's job here: snapshot before, restore after (see
//! [`crate::manager::SyncManager`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::archive::{extract_zip, hoist_single_root, validate_zip_magic};
use crate::error::SyncError;
use crate::fetch::ContentFetcher;
use crate::progress::ProgressCallback;
use crate::revision::RevisionHost;
use crate::source::{rewrite_direct_url, PackageSource, SourceEndpoints, SourceKind};
use crate::state::{InstallationStateStore, InstallRecord};

/// Full-archive installer.
pub struct FreshInstaller {
    fetcher: ContentFetcher,
    host: Arc<dyn RevisionHost>,
    store: Arc<InstallationStateStore>,
    endpoints: SourceEndpoints,
}

impl FreshInstaller {
    pub fn new(
        fetcher: ContentFetcher,
        host: Arc<dyn RevisionHost>,
        store: Arc<InstallationStateStore>,
        endpoints: SourceEndpoints,
    ) -> Self {
        Self {
            fetcher,
            host,
            store,
            endpoints,
        }
    }

    /// Install `source` as `install_dir/name`, replacing any existing tree.
    ///
    /// The archive is extracted into a staging directory first; the target
    /// is only replaced once extraction succeeded, and a single wrapping
    /// root directory is hoisted away. On success an installation record is
    /// written (carrying any prior `first_install` flag and, for tracked
    /// sources, the current latest revision fingerprint).
    ///
    /// Any error triggers cleanup of the partially-created directories and
    /// propagates; a returned error means no install occurred and no record
    /// was written.
    pub async fn install(
        &self,
        source: &PackageSource,
        install_dir: &Path,
        name: &str,
        size_hint: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<(), SyncError> {
        let archive_path = install_dir.join(format!("{name}.download.part"));
        let staging = install_dir.join(format!("{name}.staging"));

        let result = self
            .run(source, install_dir, name, &archive_path, &staging, size_hint, progress)
            .await;

        // Scratch paths never outlive the operation, success or not.
        remove_best_effort(&archive_path);
        if result.is_err() {
            remove_best_effort(&staging);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        source: &PackageSource,
        install_dir: &Path,
        name: &str,
        archive_path: &Path,
        staging: &Path,
        size_hint: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<(), SyncError> {
        std::fs::create_dir_all(install_dir)?;
        let target = install_dir.join(name);

        let archive_url = match &source.kind {
            SourceKind::RevisionTracked(repo) => self.endpoints.archive_url(repo),
            SourceKind::Direct => rewrite_direct_url(&source.url),
        };
        info!("installing {} from {}", name, archive_url);

        let outcome = self
            .fetcher
            .fetch(&archive_url, archive_path, progress, size_hint)
            .await?;
        validate_zip_magic(archive_path)?;

        if staging.exists() {
            std::fs::remove_dir_all(staging)?;
        }
        if target.exists() {
            debug!("replacing existing tree at {:?}", target);
            std::fs::remove_dir_all(&target)?;
        }

        extract_zip(archive_path, staging)?;
        hoist_single_root(staging)?;
        std::fs::rename(staging, &target)?;

        let revision_fingerprint = match source.repo() {
            Some(repo) => match self.host.latest_revision(repo).await {
                Ok(latest) => Some(latest.fingerprint),
                Err(e) => {
                    warn!("could not capture revision fingerprint for {}: {}", name, e);
                    None
                }
            },
            None => None,
        };

        let prior = self.store.get(name);
        let record = InstallRecord {
            source_url: source.url.clone(),
            revision_fingerprint,
            cache_validators: Some(outcome.validators),
            install_path: target.clone(),
            installed_at: Utc::now(),
            first_install: prior.map(|r| r.first_install).unwrap_or(true),
        };
        self.store.put(name, record)?;

        info!("installed {} at {:?}", name, target);
        Ok(())
    }
}

fn remove_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        warn!("could not clean up {:?}: {}", path, e);
    }
}

/// Install target for a package name.
pub fn install_target(install_dir: &Path, name: &str) -> PathBuf {
    install_dir.join(name)
}
