//! Persisted installation state.
//!
//! One record per installed package name, stored together as a single JSON
//! document. The document is rewritten wholesale on every change through a
//! temp file and an atomic rename, and a single-writer lock serializes
//! read-modify-write cycles so concurrent writers for different package
//! names cannot lose updates.
//!
//! A record exists if and only if the package's install directory was
//! populated by a completed install or update; records are never mutated
//! mid-operation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SyncError;

/// HTTP cache validators captured from the last successful fetch.
///
/// Used for change detection when the source has no revision history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidators {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Installation metadata for one package name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    /// URL the content was last installed from.
    pub source_url: String,

    /// Opaque identifier of the exact remote content last installed;
    /// absent when the source only supports cache validators.
    #[serde(default)]
    pub revision_fingerprint: Option<String>,

    /// Validators from the last successful fetch.
    #[serde(default)]
    pub cache_validators: Option<CacheValidators>,

    /// Where the package tree lives.
    pub install_path: PathBuf,

    /// When the last successful install or update completed.
    pub installed_at: DateTime<Utc>,

    /// True when this record was created for a name never recorded before;
    /// carried forward unchanged on every later rewrite.
    pub first_install: bool,
}

/// Store for the persisted installation mapping.
pub struct InstallationStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl InstallationStateStore {
    /// Create a store backed by the given document path. The document is
    /// created lazily on first `put`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the record for a package name.
    pub fn get(&self, name: &str) -> Option<InstallRecord> {
        self.load_map().remove(name)
    }

    /// Whether a completed install is recorded for the name.
    pub fn is_installed(&self, name: &str) -> bool {
        self.load_map().contains_key(name)
    }

    /// Names of all recorded packages.
    pub fn installed_packages(&self) -> Vec<String> {
        self.load_map().into_keys().collect()
    }

    /// Insert or replace the record for a package name.
    ///
    /// The whole mapping is re-read and rewritten under the store's writer
    /// lock, so interleaved `put` calls for different names both land.
    pub fn put(&self, name: &str, record: InstallRecord) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load_map();
        map.insert(name.to_string(), record);
        self.write_map(&map)
    }

    /// Read the full mapping, treating a malformed document as empty.
    ///
    /// Discarding a corrupt document is safe: every package then appears
    /// not-installed, which triggers fresh installs rather than skipped
    /// updates. The corruption is logged, not silent.
    fn load_map(&self) -> BTreeMap<String, InstallRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(
                    "installation state unreadable, treating as empty: {}",
                    SyncError::StateCorruption(e.to_string())
                );
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "installation state malformed, treating as empty: {}",
                    SyncError::StateCorruption(e.to_string())
                );
                BTreeMap::new()
            }
        }
    }

    /// Write the full mapping through a temp file and atomic rename.
    fn write_map(&self, map: &BTreeMap<String, InstallRecord>) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("wrote installation state for {} packages", map.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str) -> InstallRecord {
        InstallRecord {
            source_url: url.to_string(),
            revision_fingerprint: Some("abc123".to_string()),
            cache_validators: None,
            install_path: PathBuf::from("/packs/p"),
            installed_at: Utc::now(),
            first_install: true,
        }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let store = InstallationStateStore::new(path.clone());
        assert!(store.get("p").is_none());
        assert!(!store.is_installed("p"));

        store.put("p", record("https://example.com/p")).unwrap();

        // fresh store instance reads the same document
        let store = InstallationStateStore::new(path);
        let rec = store.get("p").unwrap();
        assert_eq!(rec.source_url, "https://example.com/p");
        assert_eq!(rec.revision_fingerprint.as_deref(), Some("abc123"));
        assert!(rec.first_install);
        assert!(store.is_installed("p"));
    }

    #[test]
    fn test_put_preserves_other_entries() {
        let temp = TempDir::new().unwrap();
        let store = InstallationStateStore::new(temp.path().join("state.json"));

        store.put("a", record("https://example.com/a")).unwrap();
        store.put("b", record("https://example.com/b")).unwrap();

        let mut names = store.installed_packages();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.get("a").unwrap().source_url, "https://example.com/a");
    }

    #[test]
    fn test_malformed_document_treated_as_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = InstallationStateStore::new(path);
        assert!(store.get("p").is_none());
        assert!(store.installed_packages().is_empty());

        // the store recovers: a put replaces the malformed document
        store.put("p", record("https://example.com/p")).unwrap();
        assert!(store.is_installed("p"));
    }

    #[test]
    fn test_document_parses_after_put() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        let store = InstallationStateStore::new(path.clone());
        store.put("p", record("https://example.com/p")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let map: BTreeMap<String, InstallRecord> = serde_json::from_str(&content).unwrap();
        assert!(map.contains_key("p"));
        // no temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_record_serialization_shape() {
        let rec = InstallRecord {
            source_url: "https://example.com/p".to_string(),
            revision_fingerprint: None,
            cache_validators: Some(CacheValidators {
                etag: Some("\"abc\"".to_string()),
                content_length: Some(42),
                last_modified: None,
            }),
            install_path: PathBuf::from("/packs/p"),
            installed_at: Utc::now(),
            first_install: false,
        };

        let json = serde_json::to_string(&rec).unwrap();
        let back: InstallRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
