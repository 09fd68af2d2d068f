//! Streamed content download with progress reporting.
//!
//! Downloads a single remote resource to a destination file in bounded
//! chunks, reporting cumulative progress after each chunk. The reported
//! total falls back to a human-readable size hint when the remote does not
//! announce a length.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::error::SyncError;
use crate::progress::{ProgressCallback, SyncProgress};
use crate::state::CacheValidators;

/// Outcome of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Bytes written to the destination.
    pub bytes_written: u64,
    /// Cache validators reported by the remote for this resource.
    pub validators: CacheValidators,
}

/// Streamed HTTP downloader.
#[derive(Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
}

impl ContentFetcher {
    /// Create a fetcher with default network settings.
    pub fn new() -> Self {
        Self::with_config(&NetworkConfig::default())
    }

    /// Create a fetcher with custom network settings.
    pub fn with_config(config: &NetworkConfig) -> Self {
        Self {
            client: config.client(),
        }
    }

    /// Download `url` to `destination`, streaming in chunks.
    ///
    /// `progress` is invoked after each chunk with cumulative bytes and a
    /// total taken from the response length, else from `size_hint` (a
    /// human-readable form like `"250mb"`), else unknown. On success a final
    /// observation with `done == total` is emitted.
    ///
    /// Fails with [`SyncError::ContentType`] when the response declares an
    /// HTML payload, the usual symptom of an expired or mis-shared link.
    ///
    /// Writes exactly one file at `destination`. A returned error means the
    /// destination is not trustworthy and must be discarded by the caller.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
        size_hint: Option<&str>,
    ) -> Result<FetchOutcome, SyncError> {
        debug!("fetching {} -> {:?}", url, destination);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = header_string(&response, CONTENT_TYPE);
        if let Some(ct) = &content_type {
            if ct.to_ascii_lowercase().contains("text/html") {
                return Err(SyncError::ContentType {
                    content_type: ct.clone(),
                });
            }
        }

        let validators = CacheValidators {
            etag: header_string(&response, ETAG),
            content_length: header_string(&response, CONTENT_LENGTH)
                .and_then(|v| v.parse().ok()),
            last_modified: header_string(&response, LAST_MODIFIED),
        };

        let total = validators
            .content_length
            .or_else(|| size_hint.and_then(parse_size_hint));

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(destination)?;

        let mut stream = response.bytes_stream();
        let mut done: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SyncError::Network(e.to_string()))?;
            file.write_all(&chunk)?;
            done += chunk.len() as u64;
            report(&progress, SyncProgress::new(done, total));
        }
        file.sync_all()?;

        // Final observation: done == total, even when the total was a hint.
        report(&progress, SyncProgress::new(done, Some(done)));

        info!("fetched {} bytes from {}", done, url);
        Ok(FetchOutcome {
            bytes_written: done,
            validators,
        })
    }

    /// Metadata-only request: headers of `url` without a body.
    pub async fn head(&self, url: &str) -> Result<CacheValidators, SyncError> {
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(CacheValidators {
            etag: header_string(&response, ETAG),
            content_length: header_string(&response, CONTENT_LENGTH)
                .and_then(|v| v.parse().ok()),
            last_modified: header_string(&response, LAST_MODIFIED),
        })
    }
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn report(progress: &Option<ProgressCallback>, observation: SyncProgress) {
    if let Some(callback) = progress {
        callback(observation);
    }
}

/// Parse a human-readable size like `"250mb"` into bytes.
///
/// Supports `kb`, `mb`, and `gb` suffixes (case-insensitive) and bare byte
/// counts. Returns `None` for anything else.
pub fn parse_size_hint(hint: &str) -> Option<u64> {
    let hint = hint.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(d) = hint.strip_suffix("gb") {
        (d, 1024 * 1024 * 1024)
    } else if let Some(d) = hint.strip_suffix("mb") {
        (d, 1024 * 1024)
    } else if let Some(d) = hint.strip_suffix("kb") {
        (d, 1024)
    } else {
        (hint.as_str(), 1)
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}
