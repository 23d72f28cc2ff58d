use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the three data-shape layers that declare the same entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaLayer {
    Dto,
    Model,
    Presenter,
}

impl SchemaLayer {
    pub const ALL: [SchemaLayer; 3] = [SchemaLayer::Dto, SchemaLayer::Model, SchemaLayer::Presenter];

    /// Artifact role whose files carry this layer's declaration
    pub fn role(self) -> Role {
        match self {
            SchemaLayer::Dto => Role::Dto,
            SchemaLayer::Model => Role::Model,
            SchemaLayer::Presenter => Role::Presenter,
        }
    }
}

impl fmt::Display for SchemaLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaLayer::Dto => "DTO",
            SchemaLayer::Model => "Model",
            SchemaLayer::Presenter => "Presenter",
        };
        f.write_str(name)
    }
}

impl FromStr for SchemaLayer {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dto" => Ok(SchemaLayer::Dto),
            "model" => Ok(SchemaLayer::Model),
            "presenter" => Ok(SchemaLayer::Presenter),
            _ => Err(LayerError::UnknownLayer(s.to_string())),
        }
    }
}

/// Artifact roles in canonical producer-to-consumer order.
///
/// The derived `Ord` follows declaration order, so sorting roles yields the
/// bottom-up change order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Dto,
    Adapter,
    Model,
    Presenter,
    Mapper,
    Service,
    Hook,
    Ui,
}

impl Role {
    pub const CANONICAL: [Role; 8] = [
        Role::Dto,
        Role::Adapter,
        Role::Model,
        Role::Presenter,
        Role::Mapper,
        Role::Service,
        Role::Hook,
        Role::Ui,
    ];

    /// Roles whose absence breaks the domain
    pub const CRITICAL: [Role; 4] = [Role::Model, Role::Presenter, Role::Mapper, Role::Service];

    pub fn is_critical(self) -> bool {
        Self::CRITICAL.contains(&self)
    }

    pub fn position(self) -> usize {
        self as usize
    }

    /// Next role downstream in canonical order
    pub fn consumer(self) -> Option<Role> {
        Self::CANONICAL.get(self.position() + 1).copied()
    }

    /// True when `other` directly follows `self` in canonical order
    pub fn is_adjacent_to(self, other: Role) -> bool {
        self.consumer() == Some(other)
    }

    /// Short verb describing how the consumer depends on this role
    pub fn relation(self) -> &'static str {
        match self {
            Role::Dto => "adapts",
            Role::Adapter => "defines",
            Role::Model => "implements",
            Role::Presenter => "converts",
            Role::Mapper => "used in",
            Role::Service => "called by",
            Role::Hook => "provides to",
            Role::Ui => "",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Dto => "DTO",
            Role::Adapter => "Adapter",
            Role::Model => "Model",
            Role::Presenter => "Presenter",
            Role::Mapper => "Mapper",
            Role::Service => "Service",
            Role::Hook => "Hook",
            Role::Ui => "UI",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dto" => Ok(Role::Dto),
            "adapter" => Ok(Role::Adapter),
            "model" => Ok(Role::Model),
            "presenter" => Ok(Role::Presenter),
            "mapper" => Ok(Role::Mapper),
            "service" => Ok(Role::Service),
            "hook" | "hooks" => Ok(Role::Hook),
            "ui" => Ok(Role::Ui),
            _ => Err(LayerError::UnknownRole(s.to_string())),
        }
    }
}

/// Files on a request's path through a domain that the impact graph does
/// not model: services on either side, route handlers and endpoint tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowArtifact {
    PlanningService,
    CurrentService,
    BackendService,
    ApiHandler,
    FrontendEndpoint,
    BackendEndpoint,
    Interface,
    Module,
}

impl FlowArtifact {
    pub const ALL: [FlowArtifact; 8] = [
        FlowArtifact::PlanningService,
        FlowArtifact::CurrentService,
        FlowArtifact::BackendService,
        FlowArtifact::ApiHandler,
        FlowArtifact::FrontendEndpoint,
        FlowArtifact::BackendEndpoint,
        FlowArtifact::Interface,
        FlowArtifact::Module,
    ];

    /// Artifacts whose presence means the domain has an API flow at all
    pub const SERVICES: [FlowArtifact; 3] = [
        FlowArtifact::PlanningService,
        FlowArtifact::CurrentService,
        FlowArtifact::BackendService,
    ];

    /// Config key
    pub fn as_str(self) -> &'static str {
        match self {
            FlowArtifact::PlanningService => "planning_service",
            FlowArtifact::CurrentService => "current_service",
            FlowArtifact::BackendService => "backend_service",
            FlowArtifact::ApiHandler => "api_handler",
            FlowArtifact::FrontendEndpoint => "frontend_endpoint",
            FlowArtifact::BackendEndpoint => "backend_endpoint",
            FlowArtifact::Interface => "interface",
            FlowArtifact::Module => "module",
        }
    }
}

impl fmt::Display for FlowArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Unknown schema layer: {0} (expected dto, model or presenter)")]
    UnknownLayer(String),

    #[error("Unknown artifact role: {0}")]
    UnknownRole(String),
}

/// Converts a domain identifier such as `brochure` or `press-release` to
/// the PascalCase stem used in declaration names.
pub fn pascal_case(domain: &str) -> String {
    domain
        .split(|c: char| c == '-' || c == '_' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
