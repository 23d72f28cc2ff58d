use glob::{glob, Pattern};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

use crate::layer::{pascal_case, FlowArtifact, Role};

/// Finds the files that play `role` for a domain.
///
/// "Not found" is an empty list; only real I/O or pattern problems are errors.
pub trait Locator: Send + Sync {
    fn locate(&self, role: Role, domain: &str) -> Result<Vec<PathBuf>, DiscoveryError>;

    /// Files of an API-flow artifact; locators without flow conventions find none
    fn locate_flow(&self, artifact: FlowArtifact, domain: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
        let _ = (artifact, domain);
        Ok(Vec::new())
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid discovery pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("I/O error while discovering {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Discovery task failed: {0}")]
    Task(String),
}

/// Role → path-glob templates. `{domain}` expands to the identifier as
/// given, `{Domain}` to its PascalCase form.
pub type Conventions = BTreeMap<Role, Vec<String>>;

/// Flow artifact → path-glob templates, expanded like [`Conventions`]
pub type FlowConventions = BTreeMap<FlowArtifact, Vec<String>>;

pub fn expand_pattern(pattern: &str, domain: &str) -> String {
    pattern
        .replace("{Domain}", &pascal_case(domain))
        .replace("{domain}", domain)
}

/// Locator that globs convention patterns under a root directory
#[derive(Debug, Clone)]
pub struct GlobLocator {
    root: PathBuf,
    conventions: Conventions,
    flow: FlowConventions,
}

impl GlobLocator {
    pub fn new(root: impl Into<PathBuf>, conventions: Conventions) -> Self {
        Self {
            root: root.into(),
            conventions,
            flow: FlowConventions::new(),
        }
    }

    pub fn with_flow(mut self, flow: FlowConventions) -> Self {
        self.flow = flow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root and domain are literal text; only the template carries wildcards
    fn glob_pattern(&self, pattern: &str, domain: &str) -> String {
        let root = Pattern::escape(&self.root.to_string_lossy());
        let expanded = pattern
            .replace("{Domain}", &Pattern::escape(&pascal_case(domain)))
            .replace("{domain}", &Pattern::escape(domain));
        if root.is_empty() {
            expanded
        } else {
            format!("{}/{}", root.trim_end_matches('/'), expanded.trim_start_matches('/'))
        }
    }

    /// Every file matching any of `patterns`, sorted and deduplicated
    fn glob_all(&self, patterns: &[String], domain: &str, what: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut found = Vec::new();
        for pattern in patterns {
            let full = self.glob_pattern(pattern, domain);
            debug!(what, domain, pattern = %full, "globbing");

            let entries = glob(&full).map_err(|e| DiscoveryError::Pattern {
                pattern: full.clone(),
                message: e.to_string(),
            })?;

            for entry in entries {
                let path = entry.map_err(|e| DiscoveryError::Io {
                    path: e.path().to_path_buf(),
                    source: e.into_error(),
                })?;
                if path.is_file() {
                    found.push(path);
                }
            }
        }

        found.sort();
        found.dedup();
        Ok(found)
    }
}

impl Locator for GlobLocator {
    fn locate(&self, role: Role, domain: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
        match self.conventions.get(&role) {
            Some(patterns) => self.glob_all(patterns, domain, role.as_str()),
            None => Ok(Vec::new()),
        }
    }

    fn locate_flow(&self, artifact: FlowArtifact, domain: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
        match self.flow.get(&artifact) {
            Some(patterns) => self.glob_all(patterns, domain, artifact.as_str()),
            None => Ok(Vec::new()),
        }
    }
}

/// Locator backed by a fixed table, for callers that already know their files
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    entries: BTreeMap<(Role, String), Vec<PathBuf>>,
    flow_entries: BTreeMap<(FlowArtifact, String), Vec<PathBuf>>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: Role, domain: &str, paths: Vec<PathBuf>) -> Self {
        self.entries
            .entry((role, domain.to_string()))
            .or_default()
            .extend(paths);
        self
    }

    pub fn with_flow(mut self, artifact: FlowArtifact, domain: &str, paths: Vec<PathBuf>) -> Self {
        self.flow_entries
            .entry((artifact, domain.to_string()))
            .or_default()
            .extend(paths);
        self
    }
}

fn sorted(paths: Option<&Vec<PathBuf>>) -> Vec<PathBuf> {
    let mut paths = paths.cloned().unwrap_or_default();
    paths.sort();
    paths.dedup();
    paths
}

impl Locator for StaticLocator {
    fn locate(&self, role: Role, domain: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
        Ok(sorted(self.entries.get(&(role, domain.to_string()))))
    }

    fn locate_flow(&self, artifact: FlowArtifact, domain: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
        Ok(sorted(self.flow_entries.get(&(artifact, domain.to_string()))))
    }
}

/// Locate every role in canonical order, one after another
pub fn discover_all(locator: &dyn Locator, domain: &str) -> Result<BTreeMap<Role, Vec<PathBuf>>, DiscoveryError> {
    let mut found = BTreeMap::new();
    for role in Role::CANONICAL {
        let mut paths = locator.locate(role, domain)?;
        paths.sort();
        paths.dedup();
        found.insert(role, paths);
    }
    Ok(found)
}

/// Locate every role on the blocking pool. Completion order does not
/// affect the result: roles are keyed and each path list is sorted.
pub async fn discover_concurrently(
    locator: Arc<dyn Locator>,
    domain: &str,
) -> Result<BTreeMap<Role, Vec<PathBuf>>, DiscoveryError> {
    let mut tasks = JoinSet::new();
    for role in Role::CANONICAL {
        let locator = Arc::clone(&locator);
        let domain = domain.to_string();
        tasks.spawn_blocking(move || (role, locator.locate(role, &domain)));
    }

    let mut found = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (role, result) = joined.map_err(|e| DiscoveryError::Task(e.to_string()))?;
        let mut paths = result?;
        paths.sort();
        paths.dedup();
        debug!(%role, domain, files = paths.len(), "discovered");
        found.insert(role, paths);
    }
    Ok(found)
}
