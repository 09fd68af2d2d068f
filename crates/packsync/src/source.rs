//! Package source capability resolution.
//!
//! A source URL is classified exactly once into either a revision-tracked
//! repository reference (a named branch of a hosted repository with a
//! commit-comparison API) or a direct download URL. All later decisions
//! branch on the resolved capability, not on the URL shape.

use serde::{Deserialize, Serialize};

/// A named branch of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

/// What change-detection strategy a source supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Source supports revision history and commit comparison.
    RevisionTracked(RepoRef),
    /// Plain HTTP resource; only cache validators are available.
    Direct,
}

/// A source URL together with its resolved capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub url: String,
    pub kind: SourceKind,
}

impl PackageSource {
    /// Classify a source URL.
    pub fn resolve(url: &str) -> Self {
        match parse_repo_ref(url) {
            Some(repo) => Self {
                url: url.to_string(),
                kind: SourceKind::RevisionTracked(repo),
            },
            None => Self {
                url: url.to_string(),
                kind: SourceKind::Direct,
            },
        }
    }

    /// The repository reference, when the source is revision-tracked.
    pub fn repo(&self) -> Option<&RepoRef> {
        match &self.kind {
            SourceKind::RevisionTracked(repo) => Some(repo),
            SourceKind::Direct => None,
        }
    }

    /// Whether the source supports revision comparison.
    pub fn is_revision_tracked(&self) -> bool {
        matches!(self.kind, SourceKind::RevisionTracked(_))
    }
}

/// Parse a hosted-repository URL of the form
/// `https://github.com/{owner}/{repo}[/tree/{branch}]` (an optional `.git`
/// suffix on the repository name is stripped). Anything else is not
/// revision-trackable.
fn parse_repo_ref(url: &str) -> Option<RepoRef> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest.strip_prefix("github.com/")?;
    let rest = rest.split(|c| c == '?' || c == '#').next().unwrap_or(rest);

    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?.trim_end_matches(".git").to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }

    let branch = match (segments.next(), segments.next()) {
        (Some("tree"), Some(branch)) => branch.to_string(),
        (None, _) => "main".to_string(),
        // Deeper paths (releases, blobs, ...) are not a package root.
        _ => return None,
    };

    Some(RepoRef { owner, repo, branch })
}

/// Rewrite a consumer share link into a direct download.
///
/// Share links from the one supported link-sharing service render a preview
/// page unless `dl=1` is present; the rewrite forces the parameter. Other
/// URLs pass through untouched.
pub fn rewrite_direct_url(url: &str) -> String {
    if !url.contains("dropbox.com") {
        return url.to_string();
    }
    if url.contains("dl=0") {
        url.replace("dl=0", "dl=1")
    } else if url.contains("dl=1") {
        url.to_string()
    } else if url.contains('?') {
        format!("{url}&dl=1")
    } else {
        format!("{url}?dl=1")
    }
}

/// Remote endpoint bases for revision-tracked sources.
///
/// The bases are configuration so tests can point the engine at a local
/// server; defaults target the public hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoints {
    /// REST API base for commit and comparison queries
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base for raw per-file content
    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// Base for branch archive downloads
    #[serde(default = "default_archive_base")]
    pub archive_base: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            archive_base: default_archive_base(),
        }
    }
}

impl SourceEndpoints {
    /// All bases pointed at one server, for tests.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            api_base: base.clone(),
            raw_base: base.clone(),
            archive_base: base,
        }
    }

    /// Latest commit on the tracked branch.
    pub fn latest_commit_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base, repo.owner, repo.repo, repo.branch
        )
    }

    /// Two-revision comparison.
    pub fn compare_url(&self, repo: &RepoRef, old: &str, new: &str) -> String {
        format!(
            "{}/repos/{}/{}/compare/{}...{}",
            self.api_base, repo.owner, repo.repo, old, new
        )
    }

    /// File metadata at a specific revision.
    pub fn contents_url(&self, repo: &RepoRef, path: &str, fingerprint: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, repo.owner, repo.repo, path, fingerprint
        )
    }

    /// Raw file content at a specific revision.
    pub fn raw_file_url(&self, repo: &RepoRef, fingerprint: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, repo.owner, repo.repo, fingerprint, path
        )
    }

    /// Zip archive of the tracked branch.
    pub fn archive_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/{}/{}/zip/refs/heads/{}",
            self.archive_base, repo.owner, repo.repo, repo.branch
        )
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_archive_base() -> String {
    "https://codeload.github.com".to_string()
}
