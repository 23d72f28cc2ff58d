use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::discovery::{discover_all, discover_concurrently, DiscoveryError, Locator};
use crate::layer::Role;

/// Artifacts of one role for a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactNode {
    pub domain: String,
    pub role: Role,
    pub locations: Vec<PathBuf>,
}

impl ImpactNode {
    pub fn is_resolved(&self) -> bool {
        !self.locations.is_empty()
    }
}

/// Producer → consumer dependency between adjacent roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactEdge {
    pub from: Role,
    pub to: Role,
    pub relation: String,
}

/// Everything that must change, and in which order, when a field of the
/// domain changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactGraph {
    pub domain: String,
    /// One node per role, canonical order
    pub nodes: Vec<ImpactNode>,
    pub edges: Vec<ImpactEdge>,
    pub missing_critical: Vec<Role>,
    /// DTO and Adapter both resolved
    pub backend_integrated: bool,
}

impl ImpactGraph {
    /// Build the graph from per-role discovery results. Roles absent from
    /// `discovered` become zero-location nodes.
    pub fn from_discovery(domain: &str, discovered: &BTreeMap<Role, Vec<PathBuf>>) -> Self {
        let nodes: Vec<ImpactNode> = Role::CANONICAL
            .iter()
            .map(|role| {
                let mut locations = discovered.get(role).cloned().unwrap_or_default();
                locations.sort();
                locations.dedup();
                ImpactNode {
                    domain: domain.to_string(),
                    role: *role,
                    locations,
                }
            })
            .collect();

        let edges = nodes
            .windows(2)
            .filter(|pair| pair[0].is_resolved() && pair[1].is_resolved())
            .map(|pair| ImpactEdge {
                from: pair[0].role,
                to: pair[1].role,
                relation: pair[0].role.relation().to_string(),
            })
            .collect();

        let missing_critical: Vec<Role> = nodes
            .iter()
            .filter(|node| node.role.is_critical() && !node.is_resolved())
            .map(|node| node.role)
            .collect();

        let resolved = |role: Role| nodes.iter().any(|n| n.role == role && n.is_resolved());
        let backend_integrated = resolved(Role::Dto) && resolved(Role::Adapter);

        if !missing_critical.is_empty() {
            warn!(domain, missing = ?missing_critical, "critical artifacts not found");
        }

        Self {
            domain: domain.to_string(),
            nodes,
            edges,
            missing_critical,
            backend_integrated,
        }
    }

    pub fn node(&self, role: Role) -> Option<&ImpactNode> {
        self.nodes.iter().find(|node| node.role == role)
    }

    pub fn locations(&self, role: Role) -> &[PathBuf] {
        self.node(role).map(|node| node.locations.as_slice()).unwrap_or(&[])
    }

    pub fn resolved_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .nodes
            .iter()
            .filter(|node| node.is_resolved())
            .map(|node| node.role)
            .collect();
        roles.sort();
        roles
    }

    /// Change order for adding a field: contract first, consumers after
    pub fn bottom_up(&self) -> Vec<Role> {
        self.resolved_roles()
    }

    /// Change order for removing a field: consumers first, contract last
    pub fn top_down(&self) -> Vec<Role> {
        let mut roles = self.resolved_roles();
        roles.reverse();
        roles
    }

    pub fn total_files(&self) -> usize {
        self.nodes.iter().map(|node| node.locations.len()).sum()
    }

    pub fn has_missing_critical(&self) -> bool {
        !self.missing_critical.is_empty()
    }
}

/// Discover and build the graph for `domain`, one role at a time
pub fn build_graph(domain: &str, locator: &dyn Locator) -> Result<ImpactGraph, DiscoveryError> {
    let discovered = discover_all(locator, domain)?;
    let graph = ImpactGraph::from_discovery(domain, &discovered);
    debug!(domain, files = graph.total_files(), edges = graph.edges.len(), "built impact graph");
    Ok(graph)
}

/// Same as [`build_graph`], with the per-role lookups running concurrently
pub async fn build_graph_concurrently(
    domain: &str,
    locator: Arc<dyn Locator>,
) -> Result<ImpactGraph, DiscoveryError> {
    let discovered = discover_concurrently(locator, domain).await?;
    let graph = ImpactGraph::from_discovery(domain, &discovered);
    debug!(domain, files = graph.total_files(), edges = graph.edges.len(), "built impact graph");
    Ok(graph)
}
