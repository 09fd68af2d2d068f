//! Update detection.
//!
//! Decides whether a package needs an update and why, reconciling the three
//! change-detection strategies: revision-fingerprint comparison for tracked
//! sources, HTTP cache validators for plain sources, and "never installed"
//! as the trivial case.
//!
//! A transient network failure is never reported as "update available" —
//! that would trigger a spurious download from a periodic background check —
//! and never propagated; it downgrades to a no-update answer carrying the
//! connection error as its reason.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::fetch::ContentFetcher;
use crate::revision::RevisionHost;
use crate::source::PackageSource;
use crate::state::{CacheValidators, InstallationStateStore};

/// Answer of an update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub update_needed: bool,
    pub reason: String,
}

impl UpdateCheck {
    fn needed(reason: impl Into<String>) -> Self {
        Self {
            update_needed: true,
            reason: reason.into(),
        }
    }

    fn current(reason: impl Into<String>) -> Self {
        Self {
            update_needed: false,
            reason: reason.into(),
        }
    }
}

/// Decides update-needed / not-needed per package.
pub struct UpdateDetector {
    store: Arc<InstallationStateStore>,
    host: Arc<dyn RevisionHost>,
    fetcher: ContentFetcher,
}

impl UpdateDetector {
    pub fn new(
        store: Arc<InstallationStateStore>,
        host: Arc<dyn RevisionHost>,
        fetcher: ContentFetcher,
    ) -> Self {
        Self {
            store,
            host,
            fetcher,
        }
    }

    /// Check whether `name` needs an update from `source_url`.
    ///
    /// `fallback_last_modified` is the baseline for `Last-Modified`
    /// comparison when the stored record carries none.
    ///
    /// Priority order: no record, then fingerprint comparison for tracked
    /// sources, then source-URL change, then a metadata-only request
    /// compared header by header (`Last-Modified`, `ETag`,
    /// `Content-Length`; first mismatch wins).
    pub async fn check(
        &self,
        name: &str,
        source_url: &str,
        fallback_last_modified: Option<DateTime<Utc>>,
    ) -> UpdateCheck {
        let Some(record) = self.store.get(name) else {
            info!("{}: no local installation", name);
            return UpdateCheck::needed("no local installation");
        };

        let source = PackageSource::resolve(source_url);
        if let (Some(fingerprint), Some(repo)) = (&record.revision_fingerprint, source.repo()) {
            return match self.host.latest_revision(repo).await {
                Ok(latest) if latest.fingerprint != *fingerprint => {
                    info!(
                        "{}: revision changed ({} -> {})",
                        name, fingerprint, latest.fingerprint
                    );
                    UpdateCheck::needed("revision changed")
                }
                Ok(_) => {
                    debug!("{}: up to date at {}", name, fingerprint);
                    UpdateCheck::current("up to date")
                }
                Err(e) => {
                    warn!("{}: revision query failed: {}", name, e);
                    UpdateCheck::current(format!("connection error: {e}"))
                }
            };
        }

        if record.source_url != source_url {
            info!(
                "{}: source URL changed ({} -> {})",
                name, record.source_url, source_url
            );
            return UpdateCheck::needed("source URL changed");
        }

        let remote = match self.fetcher.head(source_url).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("{}: metadata request failed: {}", name, e);
                return UpdateCheck::current(format!("connection error: {e}"));
            }
        };

        compare_validators(
            record.cache_validators.as_ref(),
            &remote,
            fallback_last_modified,
        )
    }
}

/// Header-by-header comparison in fixed priority order.
///
/// `Last-Modified` counts only when strictly newer than the stored value or
/// the supplied baseline; `ETag` and `Content-Length` count on any
/// difference. The first mismatching header decides and names itself in the
/// reason; headers are not cross-validated.
fn compare_validators(
    stored: Option<&CacheValidators>,
    remote: &CacheValidators,
    fallback_last_modified: Option<DateTime<Utc>>,
) -> UpdateCheck {
    let empty = CacheValidators::default();
    let stored = stored.unwrap_or(&empty);

    if let Some(remote_lm) = &remote.last_modified {
        if let Ok(remote_dt) = DateTime::parse_from_rfc2822(remote_lm) {
            let baseline = stored
                .last_modified
                .as_deref()
                .and_then(|lm| DateTime::parse_from_rfc2822(lm).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .or(fallback_last_modified);
            if let Some(baseline) = baseline {
                if remote_dt.with_timezone(&Utc) > baseline {
                    return UpdateCheck::needed(format!("Last-Modified changed: {remote_lm}"));
                }
            }
        }
    }

    if let (Some(stored_etag), Some(remote_etag)) = (&stored.etag, &remote.etag) {
        if stored_etag != remote_etag {
            return UpdateCheck::needed(format!("ETag changed: {remote_etag}"));
        }
    }

    if let (Some(stored_len), Some(remote_len)) =
        (stored.content_length, remote.content_length)
    {
        if stored_len != remote_len {
            return UpdateCheck::needed(format!("Content-Length changed: {remote_len}"));
        }
    }

    UpdateCheck::current("up to date")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Changeset;
    use crate::error::SyncError;
    use crate::revision::RevisionInfo;
    use crate::source::RepoRef;
    use crate::state::InstallRecord;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Host answering every latest-revision query with one fingerprint.
    struct FixedHost {
        fingerprint: Option<String>,
    }

    #[async_trait]
    impl RevisionHost for FixedHost {
        async fn latest_revision(&self, _repo: &RepoRef) -> Result<RevisionInfo, SyncError> {
            match &self.fingerprint {
                Some(fingerprint) => Ok(RevisionInfo {
                    fingerprint: fingerprint.clone(),
                    timestamp: None,
                    summary: None,
                }),
                None => Err(SyncError::Network("connection refused".to_string())),
            }
        }

        async fn changed_paths(
            &self,
            _repo: &RepoRef,
            _old: &str,
            _new: &str,
        ) -> Result<Changeset, SyncError> {
            Err(SyncError::RevisionUnavailable("not in this test".to_string()))
        }

        async fn file_size_at(&self, _repo: &RepoRef, _path: &str, _fingerprint: &str) -> u64 {
            0
        }
    }

    fn detector(temp: &TempDir, latest: Option<&str>) -> (UpdateDetector, Arc<InstallationStateStore>) {
        let store = Arc::new(InstallationStateStore::new(temp.path().join("state.json")));
        let host = Arc::new(FixedHost {
            fingerprint: latest.map(|s| s.to_string()),
        });
        let detector = UpdateDetector::new(Arc::clone(&store), host, ContentFetcher::new());
        (detector, store)
    }

    fn tracked_record(fingerprint: &str) -> InstallRecord {
        InstallRecord {
            source_url: "https://github.com/owner/pack".to_string(),
            revision_fingerprint: Some(fingerprint.to_string()),
            cache_validators: None,
            install_path: PathBuf::from("/packs/p"),
            installed_at: Utc::now(),
            first_install: true,
        }
    }

    fn direct_record(url: &str, validators: CacheValidators) -> InstallRecord {
        InstallRecord {
            source_url: url.to_string(),
            revision_fingerprint: None,
            cache_validators: Some(validators),
            install_path: PathBuf::from("/packs/p"),
            installed_at: Utc::now(),
            first_install: true,
        }
    }

    #[tokio::test]
    async fn test_no_record_needs_update() {
        let temp = TempDir::new().unwrap();
        let (detector, _store) = detector(&temp, Some("abc123"));

        let check = detector
            .check("P", "https://github.com/owner/pack", None)
            .await;
        assert!(check.update_needed);
        assert_eq!(check.reason, "no local installation");
    }

    #[tokio::test]
    async fn test_matching_fingerprint_up_to_date() {
        let temp = TempDir::new().unwrap();
        let (detector, store) = detector(&temp, Some("abc123"));
        store.put("P", tracked_record("abc123")).unwrap();

        let check = detector
            .check("P", "https://github.com/owner/pack", None)
            .await;
        assert!(!check.update_needed);
        assert_eq!(check.reason, "up to date");
    }

    #[tokio::test]
    async fn test_changed_fingerprint_needs_update() {
        let temp = TempDir::new().unwrap();
        let (detector, store) = detector(&temp, Some("def456"));
        store.put("P", tracked_record("abc123")).unwrap();

        let check = detector
            .check("P", "https://github.com/owner/pack", None)
            .await;
        assert!(check.update_needed);
        assert_eq!(check.reason, "revision changed");
    }

    #[tokio::test]
    async fn test_revision_query_failure_downgrades() {
        let temp = TempDir::new().unwrap();
        let (detector, store) = detector(&temp, None);
        store.put("P", tracked_record("abc123")).unwrap();

        let check = detector
            .check("P", "https://github.com/owner/pack", None)
            .await;
        assert!(!check.update_needed);
        assert!(check.reason.starts_with("connection error:"));
    }

    #[tokio::test]
    async fn test_source_url_change_needs_update() {
        let temp = TempDir::new().unwrap();
        let (detector, store) = detector(&temp, Some("abc123"));
        store
            .put(
                "P",
                direct_record("https://example.com/old.zip", CacheValidators::default()),
            )
            .unwrap();

        let check = detector
            .check("P", "https://example.com/new.zip", None)
            .await;
        assert!(check.update_needed);
        assert_eq!(check.reason, "source URL changed");
    }

    #[tokio::test]
    async fn test_etag_mismatch_wins_without_last_modified() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(Method::HEAD).path("/pack.zip");
            then.status(200).header("etag", "xyz");
        });
        let url = server.url("/pack.zip");

        let temp = TempDir::new().unwrap();
        let (detector, store) = detector(&temp, Some("unused"));
        store
            .put(
                "Q",
                direct_record(
                    &url,
                    CacheValidators {
                        etag: Some("abc".to_string()),
                        content_length: None,
                        last_modified: None,
                    },
                ),
            )
            .unwrap();

        let check = detector.check("Q", &url, None).await;
        assert!(check.update_needed);
        assert_eq!(check.reason, "ETag changed: xyz");
    }

    #[tokio::test]
    async fn test_metadata_request_failure_downgrades() {
        let temp = TempDir::new().unwrap();
        let (detector, store) = detector(&temp, Some("unused"));
        // unroutable port: the request fails, the check does not
        let url = "http://127.0.0.1:1/pack.zip";
        store
            .put("Q", direct_record(url, CacheValidators::default()))
            .unwrap();

        let check = detector.check("Q", url, None).await;
        assert!(!check.update_needed);
        assert!(check.reason.starts_with("connection error:"));
    }

    #[test]
    fn test_compare_validators_priority_order() {
        let stored = CacheValidators {
            etag: Some("abc".to_string()),
            content_length: Some(100),
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".to_string()),
        };

        // newer Last-Modified wins even with a matching ETag
        let remote = CacheValidators {
            etag: Some("abc".to_string()),
            content_length: Some(100),
            last_modified: Some("Thu, 02 Jan 2025 00:00:00 GMT".to_string()),
        };
        let check = compare_validators(Some(&stored), &remote, None);
        assert!(check.update_needed);
        assert_eq!(
            check.reason,
            "Last-Modified changed: Thu, 02 Jan 2025 00:00:00 GMT"
        );

        // equal Last-Modified falls through to the ETag
        let remote = CacheValidators {
            etag: Some("def".to_string()),
            content_length: Some(100),
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".to_string()),
        };
        let check = compare_validators(Some(&stored), &remote, None);
        assert!(check.update_needed);
        assert_eq!(check.reason, "ETag changed: def");

        // then the length
        let remote = CacheValidators {
            etag: Some("abc".to_string()),
            content_length: Some(200),
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".to_string()),
        };
        let check = compare_validators(Some(&stored), &remote, None);
        assert!(check.update_needed);
        assert_eq!(check.reason, "Content-Length changed: 200");

        // all equal
        let check = compare_validators(Some(&stored), &stored, None);
        assert!(!check.update_needed);
        assert_eq!(check.reason, "up to date");
    }

    #[test]
    fn test_compare_validators_older_last_modified_is_not_an_update() {
        let stored = CacheValidators {
            etag: None,
            content_length: None,
            last_modified: Some("Thu, 02 Jan 2025 00:00:00 GMT".to_string()),
        };
        let remote = CacheValidators {
            etag: None,
            content_length: None,
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".to_string()),
        };
        assert!(!compare_validators(Some(&stored), &remote, None).update_needed);
    }

    #[test]
    fn test_compare_validators_fallback_baseline() {
        let baseline = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let remote = CacheValidators {
            etag: None,
            content_length: None,
            last_modified: Some("Thu, 02 Jan 2025 00:00:00 GMT".to_string()),
        };

        let check = compare_validators(None, &remote, Some(baseline));
        assert!(check.update_needed);
        assert!(check.reason.starts_with("Last-Modified changed:"));

        // without any baseline the header alone proves nothing
        let check = compare_validators(None, &remote, None);
        assert!(!check.update_needed);
    }

    #[test]
    fn test_compare_validators_no_headers() {
        let check = compare_validators(None, &CacheValidators::default(), None);
        assert!(!check.update_needed);
        assert_eq!(check.reason, "up to date");
    }
}
