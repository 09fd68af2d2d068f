//! Delta application: mutate a local package tree to match a changeset.
//!
//! Removals happen before additions and modifications, so a rename is
//! observed on disk as delete-then-create. Per-file fetch failures are
//! isolated and counted; nothing is propagated. A `false` return means the
//! tree is in an indeterminate state and the caller should fall back to a
//! fresh install.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::changeset::Changeset;
use crate::error::SyncError;
use crate::fetch::ContentFetcher;
use crate::preserve::PreservedPaths;
use crate::progress::{ProgressCallback, SyncProgress};
use crate::revision::RevisionHost;
use crate::source::{PackageSource, SourceEndpoints};
use crate::state::{InstallationStateStore, InstallRecord};

/// Applies changesets by fetching individual files.
pub struct DeltaApplier {
    host: Arc<dyn RevisionHost>,
    fetcher: ContentFetcher,
    store: Arc<InstallationStateStore>,
    endpoints: SourceEndpoints,
    preserved: PreservedPaths,
}

impl DeltaApplier {
    pub fn new(
        host: Arc<dyn RevisionHost>,
        fetcher: ContentFetcher,
        store: Arc<InstallationStateStore>,
        endpoints: SourceEndpoints,
        preserved: PreservedPaths,
    ) -> Self {
        Self {
            host,
            fetcher,
            store,
            endpoints,
            preserved,
        }
    }

    /// Apply `changeset` under `install_dir`, fetching changed files at
    /// `new_fingerprint` from `source`.
    ///
    /// Returns `true` only when every added/modified path was fetched
    /// without error; the installation record is committed in that case and
    /// only that case. Preserved paths named by the changeset are skipped
    /// entirely.
    pub async fn apply(
        &self,
        install_dir: &Path,
        changeset: &Changeset,
        source: &PackageSource,
        new_fingerprint: &str,
        progress: Option<ProgressCallback>,
    ) -> bool {
        match self
            .apply_inner(install_dir, changeset, source, new_fingerprint, progress)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("delta application failed: {}", e);
                false
            }
        }
    }

    async fn apply_inner(
        &self,
        install_dir: &Path,
        changeset: &Changeset,
        source: &PackageSource,
        new_fingerprint: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<(), SyncError> {
        let Some(repo) = source.repo() else {
            return Err(SyncError::RevisionUnavailable(format!(
                "{} is not a revision-tracked source",
                source.url
            )));
        };

        let effective = changeset.without_preserved(&self.preserved);
        info!(
            "applying delta to {:?}: +{} ~{} -{}",
            install_dir,
            effective.added.len(),
            effective.modified.len(),
            effective.removed.len()
        );

        // Removals first; a missing or stubborn file is not a correctness
        // problem for the steps that follow.
        for path in &effective.removed {
            let Some(target) = resolve_under(install_dir, path) else {
                warn!("skipping removal of suspicious path {:?}", path);
                continue;
            };
            if !target.exists() {
                continue;
            }
            let result = if target.is_dir() {
                std::fs::remove_dir_all(&target)
            } else {
                std::fs::remove_file(&target)
            };
            match result {
                Ok(()) => debug!("removed {:?}", target),
                Err(e) => warn!("could not remove {:?}: {}", target, e),
            }
        }

        let to_fetch = effective.paths_to_fetch();
        if to_fetch.is_empty() {
            self.commit_record(install_dir, source, new_fingerprint)?;
            return Ok(());
        }

        let mut expected_total: u64 = 0;
        for path in &to_fetch {
            expected_total += self.host.file_size_at(repo, path, new_fingerprint).await;
        }
        let grand_total = (expected_total > 0).then_some(expected_total);

        let mut downloaded: u64 = 0;
        let mut completed = 0usize;
        for path in &to_fetch {
            let Some(destination) = resolve_under(install_dir, path) else {
                warn!("skipping fetch of suspicious path {:?}", path);
                continue;
            };
            let url = self.endpoints.raw_file_url(repo, new_fingerprint, path);

            let file_progress = progress.as_ref().map(|outer| {
                let outer = Arc::clone(outer);
                let base = downloaded;
                Arc::new(move |p: SyncProgress| {
                    outer(SyncProgress::new(base + p.done, grand_total));
                }) as ProgressCallback
            });

            match self.fetcher.fetch(&url, &destination, file_progress, None).await {
                Ok(outcome) => {
                    downloaded += outcome.bytes_written;
                    completed += 1;
                }
                Err(e) => {
                    warn!("fetch of {:?} failed: {}", path, e);
                }
            }
        }

        if completed != to_fetch.len() {
            return Err(SyncError::PartialFetch {
                attempted: to_fetch.len(),
                completed,
            });
        }

        if let Some(callback) = &progress {
            callback(SyncProgress::new(downloaded, Some(downloaded)));
        }

        self.commit_record(install_dir, source, new_fingerprint)?;
        info!(
            "delta applied: {} file(s), {} bytes",
            completed, downloaded
        );
        Ok(())
    }

    /// Commit the updated record; the record reflects only completed state.
    fn commit_record(
        &self,
        install_dir: &Path,
        source: &PackageSource,
        new_fingerprint: &str,
    ) -> Result<(), SyncError> {
        let name = package_name(install_dir);
        let prior = self.store.get(&name);
        let record = InstallRecord {
            source_url: source.url.clone(),
            revision_fingerprint: Some(new_fingerprint.to_string()),
            cache_validators: prior.as_ref().and_then(|r| r.cache_validators.clone()),
            install_path: install_dir.to_path_buf(),
            installed_at: Utc::now(),
            first_install: prior.map(|r| r.first_install).unwrap_or(true),
        };
        self.store.put(&name, record)
    }
}

fn package_name(install_dir: &Path) -> String {
    install_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Join a remote-supplied relative path under `base`, rejecting anything
/// absolute or escaping upward.
fn resolve_under(base: &Path, rel: &str) -> Option<PathBuf> {
    let rel_path = Path::new(rel);
    let mut clean = PathBuf::new();
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        return None;
    }
    Some(base.join(clean))
}
