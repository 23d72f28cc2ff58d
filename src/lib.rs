// Cross-layer schema consistency checks for DTO, Model and Presenter declarations
pub mod layer;
pub mod extractor;
pub mod field_mapping;
pub mod mapping_registry;
pub mod diff;
pub mod comparator;
pub mod discovery;
pub mod impact;
pub mod trace;
pub mod mapper_audit;
pub mod changes;
pub mod config;
pub mod engine;
pub mod reporter;

// Re-export core types for convenience
pub use layer::{FlowArtifact, Role, SchemaLayer};
pub use extractor::{extract, FieldDeclaration, Schema};
pub use field_mapping::{FieldMapping, ValueTransform};
pub use mapping_registry::MappingRegistry;
pub use diff::{DiffResult, DiffSummary, Issue, Severity};
pub use comparator::{compare, CompareOptions};
pub use discovery::{GlobLocator, Locator, StaticLocator};
pub use impact::{build_graph, ImpactGraph};
pub use trace::{trace_flow, ApiFlow};
pub use changes::{analyze_changes, ChangeAnalysis};
pub use config::SyncConfig;
pub use engine::{ConsistencyEngine, DomainReport};
pub use reporter::{render, Report, ReportFormat, Reporter};
