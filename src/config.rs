use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::comparator::CompareOptions;
use crate::discovery::{expand_pattern, Conventions, FlowConventions, GlobLocator};
use crate::field_mapping::FieldMapping;
use crate::layer::{FlowArtifact, Role, SchemaLayer};
use crate::mapping_registry::{seeded_mappings, MappingError, MappingRegistry};

/// JSON Schema every config file must satisfy before deserialisation
const CONFIG_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "additionalProperties": false,
  "properties": {
    "root": { "type": "string" },
    "conventions": {
      "type": "object",
      "propertyNames": {
        "enum": ["dto", "adapter", "model", "presenter", "mapper", "service", "hook", "ui"]
      },
      "additionalProperties": { "$ref": "#/definitions/names" }
    },
    "flow": {
      "type": "object",
      "propertyNames": {
        "enum": [
          "planning_service",
          "current_service",
          "backend_service",
          "api_handler",
          "frontend_endpoint",
          "backend_endpoint",
          "interface",
          "module"
        ]
      },
      "additionalProperties": { "$ref": "#/definitions/names" }
    },
    "declarations": {
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "dto": { "$ref": "#/definitions/names" },
        "model": { "$ref": "#/definitions/names" },
        "presenter": { "$ref": "#/definitions/names" }
      }
    },
    "mappings": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["source", "target"],
        "additionalProperties": false,
        "properties": {
          "source": { "type": "string", "minLength": 1 },
          "target": { "type": "string", "minLength": 1 },
          "transform": {
            "oneOf": [
              {
                "type": "string",
                "enum": [
                  "null_to_undefined",
                  "undefined_to_null",
                  "string_to_number",
                  "number_to_string",
                  "string_to_date",
                  "date_to_string"
                ]
              },
              {
                "type": "object",
                "required": ["custom"],
                "additionalProperties": false,
                "properties": { "custom": { "type": "string" } }
              }
            ]
          }
        }
      }
    },
    "strict_extra_fields": { "type": "boolean" }
  },
  "definitions": {
    "names": {
      "type": "array",
      "items": { "type": "string", "minLength": 1 }
    }
  }
}"##;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config does not match schema:\n  {}", .0.join("\n  "))]
    Schema(Vec<String>),

    #[error("Failed to read config values: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Declaration name templates per schema layer, tried in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationCandidates {
    pub dto: Vec<String>,
    pub model: Vec<String>,
    pub presenter: Vec<String>,
}

impl Default for DeclarationCandidates {
    fn default() -> Self {
        Self {
            dto: vec!["{Domain}ResponseDto".to_string(), "{Domain}Dto".to_string()],
            model: vec!["{Domain}Model".to_string()],
            presenter: vec!["{Domain}Presenter".to_string(), "{Domain}Model".to_string()],
        }
    }
}

impl DeclarationCandidates {
    pub fn templates(&self, layer: SchemaLayer) -> &[String] {
        match layer {
            SchemaLayer::Dto => &self.dto,
            SchemaLayer::Model => &self.model,
            SchemaLayer::Presenter => &self.presenter,
        }
    }

    /// Templates with `{domain}`/`{Domain}` filled in
    pub fn expanded(&self, layer: SchemaLayer, domain: &str) -> Vec<String> {
        self.templates(layer)
            .iter()
            .map(|template| expand_pattern(template, domain))
            .collect()
    }
}

/// Project configuration: where layers live, what they are called and how
/// DTO fields are renamed on the way into the Model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub root: PathBuf,
    pub conventions: Conventions,
    pub flow: FlowConventions,
    pub declarations: DeclarationCandidates,
    pub mappings: Vec<FieldMapping>,
    pub strict_extra_fields: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            conventions: default_conventions(),
            flow: default_flow_conventions(),
            declarations: DeclarationCandidates::default(),
            mappings: seeded_mappings(),
            strict_extra_fields: false,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs_err::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), mappings = config.mappings.len(), "loaded config");
        Ok(config)
    }

    /// Parse and schema-check a YAML document. Omitted keys keep their
    /// defaults; an empty document is the default config.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let instance: JsonValue = serde_yaml::from_str(text)?;
        if instance.is_null() {
            // only comments
            return Ok(Self::default());
        }
        validate_against_schema(&instance)?;

        // `{custom: ...}` maps only read as enum variants through serde_json
        let config: SyncConfig = serde_json::from_value(instance)?;
        // Surface mapping conflicts at load time
        config.mapping_registry()?;
        debug!(root = %config.root.display(), "config validated");
        Ok(config)
    }

    pub fn mapping_registry(&self) -> Result<MappingRegistry, ConfigError> {
        Ok(MappingRegistry::new(self.mappings.iter().cloned())?)
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            strict_extra_fields: self.strict_extra_fields,
        }
    }

    /// Replace the root, e.g. from a command-line flag
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_strict_extra_fields(mut self, strict: bool) -> Self {
        self.strict_extra_fields = strict;
        self
    }

    pub fn locator(&self) -> GlobLocator {
        GlobLocator::new(&self.root, self.conventions.clone()).with_flow(self.flow.clone())
    }
}

fn validate_against_schema(instance: &JsonValue) -> Result<(), ConfigError> {
    let schema: JsonValue =
        serde_json::from_str(CONFIG_SCHEMA).map_err(|e| ConfigError::Schema(vec![e.to_string()]))?;
    let compiled = JSONSchema::compile(&schema).map_err(|e| ConfigError::Schema(vec![e.to_string()]))?;

    let result = compiled.validate(instance);
    if let Err(errors) = result {
        let messages: Vec<String> = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect();
        return Err(ConfigError::Schema(messages));
    }
    Ok(())
}

/// Layout of a Next.js-style app: backend contracts under `api/_backend`,
/// feature code under `(planning)` route groups.
pub fn default_conventions() -> Conventions {
    let mut conventions = Conventions::new();
    let mut add = |role: Role, patterns: &[&str]| {
        conventions.insert(role, patterns.iter().map(|p| p.to_string()).collect());
    };

    add(Role::Dto, &["**/api/_backend/**/{domain}/types/{domain}.dto.ts"]);
    add(Role::Adapter, &["**/api/_backend/**/{domain}/types/{domain}.adapter.ts"]);
    add(Role::Model, &["**/(planning)/**/{domain}/_types/{domain}.model.ts"]);
    add(Role::Presenter, &["**/(planning)/**/{domain}/_types/{domain}*.presenter.ts"]);
    add(Role::Mapper, &["**/(planning)/**/{domain}/_services/{domain}.mapper.ts"]);
    add(
        Role::Service,
        &[
            "**/(planning)/**/{domain}/_services/{domain}.service.ts",
            "**/(current)/**/{domain}/_services/{domain}.service.ts",
        ],
    );
    add(Role::Hook, &["**/(planning)/**/{domain}/_hooks/**/*.ts"]);
    add(
        Role::Ui,
        &[
            "**/(planning)/**/{domain}/_ui/**/*.section.tsx",
            "**/(planning)/**/{domain}/_ui/**/*.panel.tsx",
            "**/(planning)/**/{domain}/_ui/**/*.module.tsx",
        ],
    );
    conventions
}

/// Where a request for a domain travels: frontend services in both route
/// groups, the backend service and module, the CMS route handlers.
pub fn default_flow_conventions() -> FlowConventions {
    let mut flow = FlowConventions::new();
    let mut add = |artifact: FlowArtifact, patterns: &[&str]| {
        flow.insert(artifact, patterns.iter().map(|p| p.to_string()).collect());
    };

    add(
        FlowArtifact::PlanningService,
        &["**/(planning)/**/{domain}/_services/{domain}.service.ts"],
    );
    add(
        FlowArtifact::CurrentService,
        &["**/(current)/**/{domain}/_services/{domain}.service.ts"],
    );
    add(
        FlowArtifact::BackendService,
        &["**/api/_backend/**/{domain}/{domain}.service.ts"],
    );
    add(
        FlowArtifact::ApiHandler,
        &[
            "**/api/(cms)/**/{domain}/**/route.ts",
            "**/api/(cms)/**/{domain}s/**/route.ts",
            "**/api/(cms)/**/({domain})/**/route.ts",
            "**/api/(cms)/**/*{domain}-*/**/route.ts",
        ],
    );
    add(FlowArtifact::FrontendEndpoint, &["**/(current)/**/{domain}.endpoints.ts"]);
    add(FlowArtifact::BackendEndpoint, &["**/api/_backend/**/{domain}.endpoints.ts"]);
    add(FlowArtifact::Interface, &["**/{domain}/_services/{domain}.interface.ts"]);
    add(FlowArtifact::Module, &["**/api/_backend/**/{domain}/{domain}.module.ts"]);
    flow
}
