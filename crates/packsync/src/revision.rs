//! Revision queries against a hosted-repository API.
//!
//! [`RevisionHost`] is the seam the rest of the engine talks through;
//! [`RevisionProbe`] is the shipped implementation speaking the hosting
//! service's REST shape. Every outbound request passes through an opaque
//! auth hook; absent credentials are legal and only subject the caller to
//! the host's unauthenticated rate limits.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::changeset::{resolve_changeset, Changeset, RemoteFileChange};
use crate::config::NetworkConfig;
use crate::error::SyncError;
use crate::source::{RepoRef, SourceEndpoints};

/// Hook applied to every outbound request, typically to inject credentials.
pub type AuthHook =
    Arc<dyn Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync>;

/// An auth hook attaching a bearer token.
pub fn bearer_auth(token: impl Into<String>) -> AuthHook {
    let token = token.into();
    Arc::new(move |rb| rb.bearer_auth(&token))
}

/// The newest revision of a tracked branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInfo {
    /// Opaque content-addressed identifier of the revision.
    pub fingerprint: String,
    /// When the revision was authored, if reported.
    pub timestamp: Option<DateTime<Utc>>,
    /// Revision summary line, if reported.
    pub summary: Option<String>,
}

/// Remote host capable of answering revision queries.
#[async_trait]
pub trait RevisionHost: Send + Sync {
    /// Latest revision on the tracked branch.
    async fn latest_revision(&self, repo: &RepoRef) -> Result<RevisionInfo, SyncError>;

    /// Paths changed between two revisions.
    async fn changed_paths(
        &self,
        repo: &RepoRef,
        old: &str,
        new: &str,
    ) -> Result<Changeset, SyncError>;

    /// Size in bytes of a file at a revision; 0 when unknown.
    ///
    /// Best-effort metadata for progress estimation only, so failure
    /// degrades to 0 rather than aborting the caller.
    async fn file_size_at(&self, repo: &RepoRef, path: &str, fingerprint: &str) -> u64;
}

/// REST revision probe.
pub struct RevisionProbe {
    client: reqwest::Client,
    endpoints: SourceEndpoints,
    auth: Option<AuthHook>,
}

impl RevisionProbe {
    /// Create a probe against the given endpoint bases.
    pub fn new(endpoints: SourceEndpoints, network: &NetworkConfig) -> Self {
        Self {
            client: network.client(),
            endpoints,
            auth: None,
        }
    }

    /// Attach an auth hook applied to every outbound request.
    pub fn with_auth(mut self, auth: AuthHook) -> Self {
        self.auth = Some(auth);
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(auth) = &self.auth {
            builder = auth(builder);
        }
        builder
    }
}

#[async_trait]
impl RevisionHost for RevisionProbe {
    async fn latest_revision(&self, repo: &RepoRef) -> Result<RevisionInfo, SyncError> {
        let url = self.endpoints.latest_commit_url(repo);
        debug!("querying latest revision: {}", url);

        let response = self.request(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RevisionUnavailable(format!(
                "status {} for {}",
                status.as_u16(),
                repo
            )));
        }

        let commit: CommitResponse = response.json().await?;
        Ok(RevisionInfo {
            fingerprint: commit.sha,
            timestamp: commit
                .commit
                .author
                .and_then(|a| a.date)
                .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                .map(|d| d.with_timezone(&Utc)),
            summary: commit.commit.message,
        })
    }

    async fn changed_paths(
        &self,
        repo: &RepoRef,
        old: &str,
        new: &str,
    ) -> Result<Changeset, SyncError> {
        let url = self.endpoints.compare_url(repo, old, new);
        debug!("comparing revisions: {}", url);

        let response = self.request(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RevisionUnavailable(format!(
                "status {} comparing {}...{} for {}",
                status.as_u16(),
                old,
                new,
                repo
            )));
        }

        let compare: CompareResponse = response.json().await?;
        let entries = compare.files.unwrap_or_default().into_iter().map(|f| {
            RemoteFileChange {
                path: f.filename,
                status: f.status,
                previous_path: f.previous_filename,
            }
        });
        Ok(resolve_changeset(entries))
    }

    async fn file_size_at(&self, repo: &RepoRef, path: &str, fingerprint: &str) -> u64 {
        let url = self.endpoints.contents_url(repo, path, fingerprint);

        let response = match self.request(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(
                    "size lookup for {} returned status {}",
                    path,
                    response.status().as_u16()
                );
                return 0;
            }
            Err(e) => {
                warn!("size lookup for {} failed: {}", path, e);
                return 0;
            }
        };

        match response.json::<ContentsResponse>().await {
            Ok(contents) => contents.size.unwrap_or(0),
            Err(e) => {
                warn!("size lookup for {} unparseable: {}", path, e);
                0
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    #[serde(default)]
    commit: CommitDetail,
}

#[derive(Debug, Default, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    author: Option<CommitAuthor>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Option<Vec<CompareFile>>,
}

#[derive(Debug, Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
    #[serde(default)]
    previous_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    size: Option<u64>,
}
