use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::changes::{analyze_changes, ChangeAnalysis};
use crate::comparator::compare_schemas;
use crate::config::SyncConfig;
use crate::diff::{DiffResult, DiffSummary, Issue, IssueKind, Severity};
use crate::discovery::{DiscoveryError, Locator};
use crate::extractor::{extract, find_declaration, try_extract, Schema};
use crate::impact::{build_graph, build_graph_concurrently, ImpactGraph};
use crate::layer::{pascal_case, Role, SchemaLayer};
use crate::mapper_audit::{audit_mapper, MapperAudit};
use crate::mapping_registry::{MappingError, MappingRegistry};
use crate::trace::{trace_flow, ApiFlow};

/// Runs discovery, extraction, comparison and the mapper audit for a domain
pub struct ConsistencyEngine {
    config: SyncConfig,
    dto_mapping: MappingRegistry,
    locator: Arc<dyn Locator>,
}

/// Result of a check that may not have been possible to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Checked { result: T },
    Skipped { reason: String, severity: Severity },
}

impl<T> Outcome<T> {
    fn skipped(reason: impl Into<String>, severity: Severity) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
            severity,
        }
    }

    pub fn checked(&self) -> Option<&T> {
        match self {
            Outcome::Checked { result } => Some(result),
            Outcome::Skipped { .. } => None,
        }
    }
}

/// Where a layer's declaration was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerFile {
    pub role: Role,
    pub path: Option<PathBuf>,
    pub declaration: Option<String>,
    pub field_count: usize,
}

/// Everything `validate` found for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: String,
    pub files: Vec<LayerFile>,
    pub dto_to_model: Outcome<DiffResult>,
    pub model_to_presenter: Outcome<DiffResult>,
    pub mapper: Outcome<MapperAudit>,
    pub summary: DiffSummary,
}

impl DomainReport {
    pub fn passed(&self) -> bool {
        self.summary.passed
    }

    /// Every issue in the report: comparison divergences, skipped checks and
    /// unconverted mapper fields
    pub fn issues(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        for (label, outcome) in [
            ("DTO → Model", &self.dto_to_model),
            ("Model → Presenter", &self.model_to_presenter),
        ] {
            match outcome {
                Outcome::Checked { result } => issues.extend(result.issues()),
                Outcome::Skipped { reason, severity } => {
                    issues.push(Issue::new(*severity, IssueKind::MissingArtifact, label, reason.clone()))
                }
            }
        }
        match &self.mapper {
            Outcome::Checked { result } => issues.extend(result.issues()),
            Outcome::Skipped { reason, severity } => {
                issues.push(Issue::new(*severity, IssueKind::MissingArtifact, "Mapper", reason.clone()))
            }
        }
        issues
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("No {role} file found for domain '{domain}'")]
    NotFound { role: Role, domain: String },
}

/// A located, read and extracted declaration
struct LoadedSchema {
    schema: Schema,
}

impl ConsistencyEngine {
    pub fn new(config: SyncConfig, locator: Arc<dyn Locator>) -> Result<Self, EngineError> {
        let dto_mapping = MappingRegistry::new(config.mappings.iter().cloned())?;
        Ok(Self {
            config,
            dto_mapping,
            locator,
        })
    }

    /// Engine that globs the config's conventions under its root
    pub fn from_config(config: SyncConfig) -> Result<Self, EngineError> {
        let locator = Arc::new(config.locator());
        Self::new(config, locator)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Check DTO → Model, Model → Presenter and the Mapper for `domain`
    pub fn validate(&self, domain: &str) -> Result<DomainReport, EngineError> {
        info!(domain, "validating domain");

        let dto = self.load(SchemaLayer::Dto, domain)?;
        let model = self.load(SchemaLayer::Model, domain)?;
        let presenter = self.load(SchemaLayer::Presenter, domain)?;
        let mapper_path = self.locator.locate(Role::Mapper, domain)?.into_iter().next();

        let options = self.config.compare_options();

        let dto_to_model = match (&dto, &model) {
            (None, _) => Outcome::skipped("DTO file not found (frontend-only domain)", Severity::Info),
            (_, None) => Outcome::skipped("Model file not found", Severity::Critical),
            (Some(dto), Some(model)) => match empty_schema(&[dto, model]) {
                Some(reason) => Outcome::skipped(reason, Severity::Warning),
                None => Outcome::Checked {
                    result: compare_schemas(&dto.schema, &model.schema, &self.dto_mapping, options),
                },
            },
        };

        let identity = MappingRegistry::identity();
        let model_to_presenter = match (&model, &presenter) {
            (None, _) => Outcome::skipped("Model file not found", Severity::Critical),
            (_, None) => Outcome::skipped("Presenter file not found", Severity::Critical),
            (Some(model), Some(presenter)) => match empty_schema(&[model, presenter]) {
                Some(reason) => Outcome::skipped(reason, Severity::Warning),
                None => Outcome::Checked {
                    result: compare_schemas(&model.schema, &presenter.schema, &identity, options),
                },
            },
        };

        let mapper = match (&mapper_path, &model, &presenter) {
            (None, _, _) => Outcome::skipped("Mapper file not found", Severity::Critical),
            (Some(path), Some(model), Some(presenter)) if !model.schema.is_empty() && !presenter.schema.is_empty() => {
                let text = read_source(path)?;
                Outcome::Checked {
                    result: audit_mapper(&text, &model.schema.fields, &presenter.schema.fields),
                }
            }
            _ => Outcome::skipped("Mapper audit needs both Model and Presenter fields", Severity::Info),
        };

        let files = vec![
            layer_file(Role::Dto, dto.as_ref()),
            layer_file(Role::Model, model.as_ref()),
            layer_file(Role::Presenter, presenter.as_ref()),
            LayerFile {
                role: Role::Mapper,
                path: mapper_path,
                declaration: None,
                field_count: 0,
            },
        ];

        let mut report = DomainReport {
            domain: domain.to_string(),
            files,
            dto_to_model,
            model_to_presenter,
            mapper,
            summary: DiffSummary::default(),
        };
        report.summary = DiffSummary::from_issues(&report.issues());

        info!(
            domain,
            critical = report.summary.critical_issues,
            warnings = report.summary.warnings,
            passed = report.summary.passed,
            "validation finished"
        );
        Ok(report)
    }

    /// Extracted fields of one layer
    pub fn fields(&self, domain: &str, layer: SchemaLayer) -> Result<Schema, EngineError> {
        self.load(layer, domain)?
            .map(|loaded| loaded.schema)
            .ok_or_else(|| EngineError::NotFound {
                role: layer.role(),
                domain: domain.to_string(),
            })
    }

    /// Compare the current Model declaration against a baseline copy of its
    /// source text
    pub fn changes(&self, domain: &str, baseline_text: &str) -> Result<ChangeAnalysis, EngineError> {
        let current = self.fields(domain, SchemaLayer::Model)?;

        let candidates = self.config.declarations.expanded(SchemaLayer::Model, domain);
        let baseline_name = find_declaration(baseline_text, &candidates).unwrap_or(current.declaration.as_str());
        let baseline = extract(baseline_text, baseline_name);
        debug!(domain, declaration = baseline_name, fields = baseline.len(), "baseline extracted");

        Ok(analyze_changes(domain, &current.declaration, &baseline, &current.fields))
    }

    pub fn impact(&self, domain: &str) -> Result<ImpactGraph, EngineError> {
        Ok(build_graph(domain, self.locator.as_ref())?)
    }

    pub async fn impact_concurrently(&self, domain: &str) -> Result<ImpactGraph, EngineError> {
        Ok(build_graph_concurrently(domain, Arc::clone(&self.locator)).await?)
    }

    /// Files a request for `domain` passes through, with the declaration
    /// names actually found in the type files
    pub fn trace(&self, domain: &str) -> Result<ApiFlow, EngineError> {
        let mut flow = trace_flow(self.locator.as_ref(), domain)?;
        for layer in SchemaLayer::ALL {
            if let Some(loaded) = self.load(layer, domain)? {
                flow.declarations.insert(layer, loaded.schema.declaration);
            }
        }
        Ok(flow)
    }

    /// Locate the layer's files and extract the first candidate declaration
    /// any of them contains. When none does, the first file is kept with an
    /// empty field list.
    fn load(&self, layer: SchemaLayer, domain: &str) -> Result<Option<LoadedSchema>, EngineError> {
        let paths = self.locator.locate(layer.role(), domain)?;
        let candidates = self.config.declarations.expanded(layer, domain);

        for path in &paths {
            let text = read_source(path)?;
            let Some(name) = find_declaration(&text, &candidates) else {
                debug!(%layer, path = %path.display(), "no candidate declaration in file");
                continue;
            };

            let fields = match try_extract(&text, name) {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(%layer, path = %path.display(), error = %err, "declaration could not be parsed");
                    Vec::new()
                }
            };
            debug!(%layer, declaration = name, fields = fields.len(), "extracted");

            let schema = Schema::new(layer, domain, name)
                .with_fields(fields)
                .with_source(path.clone());
            return Ok(Some(LoadedSchema { schema }));
        }

        let Some(first) = paths.first() else {
            return Ok(None);
        };
        let name = candidates
            .first()
            .cloned()
            .unwrap_or_else(|| pascal_case(domain));
        warn!(%layer, path = %first.display(), expected = ?candidates, "no candidate declaration found");

        Ok(Some(LoadedSchema {
            schema: Schema::new(layer, domain, &name).with_source(first.clone()),
        }))
    }
}

fn read_source(path: &Path) -> Result<String, EngineError> {
    let text = fs_err::read_to_string(path).map_err(|source| EngineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "read source");
    Ok(text)
}

fn empty_schema(loaded: &[&LoadedSchema]) -> Option<String> {
    loaded
        .iter()
        .find(|l| l.schema.is_empty())
        .map(|l| format!("no fields extracted from {} ({})", l.schema.declaration, l.schema.layer))
}

fn layer_file(role: Role, loaded: Option<&LoadedSchema>) -> LayerFile {
    match loaded {
        Some(loaded) => LayerFile {
            role,
            path: loaded.schema.source.clone(),
            declaration: Some(loaded.schema.declaration.clone()),
            field_count: loaded.schema.fields.len(),
        },
        None => LayerFile {
            role,
            path: None,
            declaration: None,
            field_count: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticLocator;
    use std::fs;
    use tempfile::TempDir;

    const DTO: &str = r#"
export interface BrochureResponseDto {
  id: string;
  title: string;
  isActive: boolean;
  description: string | null;
}
"#;

    const MODEL: &str = r#"
export interface BrochureModel {
  id: string;
  title: string;
  isPublic: boolean;
  content: string | null;
}
"#;

    const PRESENTER: &str = r#"
export class BrochurePresenter {
  readonly id: string;
  readonly title: string;
  readonly isPublic: boolean;
  readonly content: string | null;

  static create(model: BrochureModel): BrochurePresenter {
    return new BrochurePresenter(model);
  }
}
"#;

    const MAPPER: &str = r#"
export class BrochureMapper {
  static fromModel(model: BrochureModel): BrochurePresenter {
    return BrochurePresenter.create({
      id: model.id,
      title: model.title,
      isPublic: model.isPublic,
      content: model.content,
    });
  }

  static toModel(presenter: BrochurePresenter): BrochureModel {
    return { ...presenter };
  }
}
"#;

    struct Fixture {
        dir: TempDir,
        locator: StaticLocator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                locator: StaticLocator::new(),
            }
        }

        fn file(mut self, role: Role, name: &str, content: &str) -> Self {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            self.locator = self.locator.with(role, "brochure", vec![path]);
            self
        }

        fn engine(&self) -> ConsistencyEngine {
            ConsistencyEngine::new(SyncConfig::default(), Arc::new(self.locator.clone())).unwrap()
        }
    }

    fn full() -> Fixture {
        Fixture::new()
            .file(Role::Dto, "brochure.dto.ts", DTO)
            .file(Role::Model, "brochure.model.ts", MODEL)
            .file(Role::Presenter, "brochure.presenter.ts", PRESENTER)
            .file(Role::Mapper, "brochure.mapper.ts", MAPPER)
    }

    #[test]
    fn test_consistent_domain_passes() {
        let report = full().engine().validate("brochure").unwrap();

        assert!(report.passed(), "issues: {:?}", report.issues());
        assert!(report.dto_to_model.checked().unwrap().is_empty());
        assert!(report.model_to_presenter.checked().unwrap().is_empty());
        assert!(report.mapper.checked().unwrap().is_complete());
        assert_eq!(report.files[0].declaration.as_deref(), Some("BrochureResponseDto"));
        assert_eq!(report.files[2].field_count, 4);
    }

    #[test]
    fn test_presenter_missing_field_fails() {
        let model = MODEL.replace("  content: string | null;\n", "  content: string | null;\n  viewCount: number;\n");
        let fixture = Fixture::new()
            .file(Role::Dto, "brochure.dto.ts", DTO)
            .file(Role::Model, "brochure.model.ts", &model)
            .file(Role::Presenter, "brochure.presenter.ts", PRESENTER)
            .file(Role::Mapper, "brochure.mapper.ts", MAPPER);

        let report = fixture.engine().validate("brochure").unwrap();

        assert!(!report.passed());
        let diff = report.model_to_presenter.checked().unwrap();
        assert_eq!(diff.missing_names(), vec!["viewCount"]);
        // fromModel does not assign it either
        let audit = report.mapper.checked().unwrap();
        assert_eq!(audit.from_model.missing_fields, vec!["viewCount"]);
        // viewCount is also only in the Model relative to the DTO
        assert_eq!(report.dto_to_model.checked().unwrap().extra_names(), vec!["viewCount"]);
        assert_eq!(report.summary.critical_issues, 2);
    }

    #[test]
    fn test_frontend_only_domain_skips_dto() {
        let fixture = Fixture::new()
            .file(Role::Model, "brochure.model.ts", MODEL)
            .file(Role::Presenter, "brochure.presenter.ts", PRESENTER)
            .file(Role::Mapper, "brochure.mapper.ts", MAPPER);

        let report = fixture.engine().validate("brochure").unwrap();

        assert!(report.passed());
        assert!(matches!(
            report.dto_to_model,
            Outcome::Skipped { severity: Severity::Info, .. }
        ));
        assert_eq!(report.summary.informational, 1);
    }

    #[test]
    fn test_missing_presenter_and_mapper_are_critical() {
        let fixture = Fixture::new().file(Role::Model, "brochure.model.ts", MODEL);

        let report = fixture.engine().validate("brochure").unwrap();

        assert!(!report.passed());
        assert!(matches!(
            report.model_to_presenter,
            Outcome::Skipped { severity: Severity::Critical, .. }
        ));
        assert!(matches!(report.mapper, Outcome::Skipped { severity: Severity::Critical, .. }));
        assert_eq!(report.summary.critical_issues, 2);
    }

    #[test]
    fn test_undeclared_schema_degrades_to_warning() {
        let fixture = Fixture::new()
            .file(Role::Model, "brochure.model.ts", "export type Other = { id: string };\n")
            .file(Role::Presenter, "brochure.presenter.ts", PRESENTER)
            .file(Role::Mapper, "brochure.mapper.ts", MAPPER);

        let report = fixture.engine().validate("brochure").unwrap();

        assert!(matches!(
            report.model_to_presenter,
            Outcome::Skipped { severity: Severity::Warning, .. }
        ));
        assert_eq!(report.files[1].declaration.as_deref(), Some("BrochureModel"));
        assert_eq!(report.files[1].field_count, 0);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let locator = StaticLocator::new().with(Role::Model, "brochure", vec![PathBuf::from("/nonexistent/brochure.model.ts")]);
        let engine = ConsistencyEngine::new(SyncConfig::default(), Arc::new(locator)).unwrap();

        assert!(matches!(engine.validate("brochure"), Err(EngineError::Read { .. })));
    }

    #[test]
    fn test_fields_and_not_found() {
        let fixture = full();
        let engine = fixture.engine();

        let schema = engine.fields("brochure", SchemaLayer::Presenter).unwrap();
        assert_eq!(schema.declaration, "BrochurePresenter");
        assert_eq!(schema.fields.len(), 4);

        let engine = Fixture::new().engine();
        assert!(matches!(
            engine.fields("brochure", SchemaLayer::Dto),
            Err(EngineError::NotFound { role: Role::Dto, .. })
        ));
    }

    #[test]
    fn test_changes_against_baseline() {
        let fixture = full();
        let engine = fixture.engine();
        let baseline = MODEL.replace("  isPublic: boolean;\n", "");

        let analysis = engine.changes("brochure", &baseline).unwrap();
        assert_eq!(analysis.declaration, "BrochureModel");
        assert_eq!(analysis.summary.added, 1);
        assert!(!analysis.has_breaking_changes());
    }

    #[test]
    fn test_conflicting_config_rejected() {
        let mut config = SyncConfig::default();
        config.mappings.push(crate::field_mapping::FieldMapping::new("name", "title"));

        let result = ConsistencyEngine::new(config, Arc::new(StaticLocator::new()));
        assert!(matches!(result, Err(EngineError::Mapping(_))));
    }

    #[test]
    fn test_trace_uses_found_declarations() {
        let fixture = full();
        let engine = fixture.engine();

        let flow = engine.trace("brochure").unwrap();
        assert_eq!(flow.declaration(SchemaLayer::Dto), "BrochureResponseDto");
        assert_eq!(flow.declaration(SchemaLayer::Presenter), "BrochurePresenter");
        assert_eq!(flow.layer_files(Role::Mapper).len(), 1);
        // the fixture registers no service files
        assert!(!flow.found());
    }

    #[tokio::test]
    async fn test_impact_through_engine() {
        let fixture = full();
        let engine = fixture.engine();
        let sequential = engine.impact("brochure").unwrap();
        let concurrent = engine.impact_concurrently("brochure").await.unwrap();
        assert_eq!(sequential, concurrent);
        assert_eq!(sequential.missing_critical, vec![Role::Service]);
    }
}
