use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::discovery::{DiscoveryError, Locator};
use crate::layer::{pascal_case, FlowArtifact, Role, SchemaLayer};

/// Layer roles a request passes through between the backend API and the UI
pub const FLOW_ROLES: [Role; 5] = [Role::Dto, Role::Adapter, Role::Model, Role::Presenter, Role::Mapper];

/// Every file a request for one domain touches, frontend to backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFlow {
    pub domain: String,
    /// Type and converter files, keyed by role
    pub layers: BTreeMap<Role, Vec<PathBuf>>,
    pub artifacts: BTreeMap<FlowArtifact, Vec<PathBuf>>,
    /// Declaration name shown for each type in the conversion diagram
    pub declarations: BTreeMap<SchemaLayer, String>,
}

impl ApiFlow {
    /// A domain without any service file has no API flow to trace
    pub fn found(&self) -> bool {
        FlowArtifact::SERVICES.iter().any(|artifact| !self.files(*artifact).is_empty())
    }

    pub fn files(&self, artifact: FlowArtifact) -> &[PathBuf] {
        self.artifacts.get(&artifact).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn layer_files(&self, role: Role) -> &[PathBuf] {
        self.layers.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn declaration(&self, layer: SchemaLayer) -> String {
        self.declarations
            .get(&layer)
            .cloned()
            .unwrap_or_else(|| default_declaration(layer, &self.domain))
    }

    pub fn total_files(&self) -> usize {
        let layers: usize = self.layers.values().map(Vec::len).sum();
        let artifacts: usize = self.artifacts.values().map(Vec::len).sum();
        layers + artifacts
    }
}

fn default_declaration(layer: SchemaLayer, domain: &str) -> String {
    let suffix = match layer {
        SchemaLayer::Dto => "Dto",
        SchemaLayer::Model => "Model",
        SchemaLayer::Presenter => "Presenter",
    };
    format!("{}{}", pascal_case(domain), suffix)
}

fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths.dedup();
    paths
}

/// Locate the flow's layer files and artifacts for `domain`
pub fn trace_flow(locator: &dyn Locator, domain: &str) -> Result<ApiFlow, DiscoveryError> {
    let mut layers = BTreeMap::new();
    for role in FLOW_ROLES {
        layers.insert(role, sorted(locator.locate(role, domain)?));
    }

    let mut artifacts = BTreeMap::new();
    for artifact in FlowArtifact::ALL {
        let paths = sorted(locator.locate_flow(artifact, domain)?);
        debug!(%artifact, domain, files = paths.len(), "traced");
        artifacts.insert(artifact, paths);
    }

    let declarations = SchemaLayer::ALL
        .iter()
        .map(|layer| (*layer, default_declaration(*layer, domain)))
        .collect();

    let flow = ApiFlow {
        domain: domain.to_string(),
        layers,
        artifacts,
        declarations,
    };
    info!(domain, found = flow.found(), files = flow.total_files(), "traced api flow");
    Ok(flow)
}
