//! User-data paths that must survive every install and update.
//!
//! The preserved set is an explicit configuration value threaded into the
//! components that mutate a package tree, so tests can substitute their own
//! list. Matching is by whole leading path components, never raw string
//! prefix: `saves/world` is under `saves`, `saves2/world` is not.

/// Relative path prefixes that installs and updates must never delete or
/// silently overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedPaths {
    prefixes: Vec<String>,
}

/// Default preserved prefixes: save data, user config, screenshots, logs,
/// crash reports, resource packs, shader packs, backups, and local state.
pub fn default_preserved_prefixes() -> Vec<String> {
    [
        "saves",
        "config",
        "screenshots",
        "logs",
        "crash-reports",
        "resourcepacks",
        "shaderpacks",
        "backups",
        "local",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for PreservedPaths {
    fn default() -> Self {
        Self::new(default_preserved_prefixes())
    }
}

impl PreservedPaths {
    /// Create a preserved set from relative path prefixes.
    ///
    /// Prefixes are normalized: separators unified to `/`, leading and
    /// trailing separators stripped, empty entries dropped.
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.replace('\\', "/").trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    /// An empty set, preserving nothing.
    pub fn none() -> Self {
        Self { prefixes: Vec::new() }
    }

    /// The configured prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether a package-relative path falls under any preserved prefix.
    pub fn is_preserved(&self, rel_path: &str) -> bool {
        let normalized = rel_path.replace('\\', "/");
        let candidate: Vec<&str> = normalized
            .split('/')
            .filter(|c| !c.is_empty())
            .collect();

        self.prefixes.iter().any(|prefix| {
            let parts: Vec<&str> = prefix.split('/').collect();
            candidate.len() >= parts.len() && candidate[..parts.len()] == parts[..]
        })
    }
}
