use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::changes::{ChangeAnalysis, ChangeType};
use crate::diff::{DiffResult, DiffSummary, Issue, Severity};
use crate::engine::{DomainReport, LayerFile, Outcome};
use crate::extractor::{FieldDeclaration, Schema};
use crate::impact::ImpactGraph;
use crate::layer::{FlowArtifact, Role, SchemaLayer};
use crate::mapper_audit::{ConversionCoverage, MapperAudit};
use crate::trace::{ApiFlow, FLOW_ROLES};

/// How many locations a console section lists before collapsing the rest
const MAX_LISTED_LOCATIONS: usize = 5;

/// Reporter for rendering diffs, domain reports and impact graphs
pub struct Reporter {
    output_format: ReportFormat,
    field: Option<String>,
}

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
    /// Diagram text; impact graphs and API flows only
    Mermaid,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Console => "console",
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
            ReportFormat::Mermaid => "mermaid",
        };
        f.write_str(name)
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            "mermaid" | "mmd" => Ok(ReportFormat::Mermaid),
            _ => Err(ReportError::UnknownFormat(s.to_string())),
        }
    }
}

/// Anything the reporter can render
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum Report<'a> {
    Diff(&'a DiffResult),
    Domain(&'a DomainReport),
    Graph(&'a ImpactGraph),
    Fields(&'a Schema),
    Changes(&'a ChangeAnalysis),
    Flow(&'a ApiFlow),
}

impl Report<'_> {
    fn subject(&self) -> &'static str {
        match self {
            Report::Diff(_) => "diff",
            Report::Domain(_) => "domain report",
            Report::Graph(_) => "impact graph",
            Report::Fields(_) => "field list",
            Report::Changes(_) => "change analysis",
            Report::Flow(_) => "api flow",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{format} output is not available for a {subject}")]
    UnsupportedFormat {
        format: ReportFormat,
        subject: &'static str,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unknown report format: {0} (expected console, json, yaml or mermaid)")]
    UnknownFormat(String),
}

/// Change-order direction of a flow diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Adding a field: contract first
    BottomUp,
    /// Removing a field: consumers first
    TopDown,
}

/// Render `report` with a default reporter
pub fn render(report: Report<'_>, format: ReportFormat) -> Result<String, ReportError> {
    Reporter::new().with_format(format).render(report)
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
            field: None,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Annotate graph diagrams with the field being changed
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn format(&self) -> ReportFormat {
        self.output_format
    }

    /// Render according to the configured output format. Pure: the input is
    /// only checked for structural consistency, never touched on disk.
    pub fn render(&self, report: Report<'_>) -> Result<String, ReportError> {
        check_structure(report)?;

        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_report(report)),
            ReportFormat::Json => self.format_json_report(report),
            ReportFormat::Yaml => self.format_yaml_report(report),
            ReportFormat::Mermaid => match report {
                Report::Graph(graph) => Ok(self.format_mermaid_report(graph)),
                Report::Flow(flow) => Ok(format_mermaid_flow(flow)),
                other => Err(ReportError::UnsupportedFormat {
                    format: ReportFormat::Mermaid,
                    subject: other.subject(),
                }),
            },
        }
    }

    fn format_console_report(&self, report: Report<'_>) -> String {
        match report {
            Report::Diff(diff) => console_diff(diff),
            Report::Domain(domain) => console_domain(domain),
            Report::Graph(graph) => console_graph(graph),
            Report::Fields(schema) => console_fields(schema),
            Report::Changes(analysis) => console_changes(analysis),
            Report::Flow(flow) => console_flow(flow),
        }
    }

    fn format_json_report(&self, report: Report<'_>) -> Result<String, ReportError> {
        serde_json::to_string_pretty(&report).map_err(|e| ReportError::Serialization(e.to_string()))
    }

    fn format_yaml_report(&self, report: Report<'_>) -> Result<String, ReportError> {
        serde_yaml::to_string(&report).map_err(|e| ReportError::Serialization(e.to_string()))
    }

    fn format_mermaid_report(&self, graph: &ImpactGraph) -> String {
        let mut output = String::new();
        output.push_str(&format!("# Impact Diagram: {}\n\n", graph.domain));
        if let Some(field) = &self.field {
            output.push_str(&format!("Field: `{}`\n\n", field));
        }

        output.push_str("## Dependencies\n\n```mermaid\n");
        output.push_str(&mermaid_dependencies(graph, self.field.as_deref()));
        output.push_str("```\n\n");

        output.push_str("## Adding a field (bottom-up)\n\n```mermaid\n");
        output.push_str(&mermaid_flow(graph, FlowDirection::BottomUp));
        output.push_str("```\n\n");

        output.push_str("## Removing a field (top-down)\n\n```mermaid\n");
        output.push_str(&mermaid_flow(graph, FlowDirection::TopDown));
        output.push_str("```\n");
        output
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Mermaid flowchart of the graph's nodes and edges
pub fn dependency_diagram(graph: &ImpactGraph, field: Option<&str>) -> Result<String, ReportError> {
    check_graph(graph)?;
    Ok(mermaid_dependencies(graph, field))
}

/// Mermaid chain of the conversions a record goes through, backend API to
/// UI and back. Type nodes without a file are marked missing.
pub fn type_conversion_diagram(flow: &ApiFlow) -> Result<String, ReportError> {
    check_flow(flow)?;
    Ok(mermaid_type_conversion(flow))
}

/// Mermaid flowchart of one change-order guide
pub fn flow_diagram(graph: &ImpactGraph, direction: FlowDirection) -> Result<String, ReportError> {
    check_graph(graph)?;
    Ok(mermaid_flow(graph, direction))
}

fn check_structure(report: Report<'_>) -> Result<(), ReportError> {
    match report {
        Report::Diff(diff) => check_diff(diff),
        Report::Domain(domain) => {
            for outcome in [&domain.dto_to_model, &domain.model_to_presenter] {
                if let Some(diff) = outcome.checked() {
                    check_diff(diff)?;
                }
            }
            Ok(())
        }
        Report::Graph(graph) => check_graph(graph),
        Report::Flow(flow) => check_flow(flow),
        Report::Fields(_) | Report::Changes(_) => Ok(()),
    }
}

/// A field reported missing cannot also carry a mismatch, and cannot be
/// reported missing twice.
fn check_diff(diff: &DiffResult) -> Result<(), ReportError> {
    let mut seen = BTreeSet::new();
    for missing in &diff.missing_in_target {
        if !seen.insert(missing.field.name.as_str()) {
            return Err(ReportError::MalformedInput(format!(
                "field {} is reported missing twice",
                missing.field.name
            )));
        }
        let mismatched = diff
            .type_mismatches
            .iter()
            .map(|m| m.target_field.as_str())
            .chain(diff.optionality_mismatches.iter().map(|m| m.target_field.as_str()))
            .any(|target| target == missing.expected_name);
        if mismatched {
            return Err(ReportError::MalformedInput(format!(
                "field {} is both missing and mismatched",
                missing.field.name
            )));
        }
    }
    Ok(())
}

fn check_graph(graph: &ImpactGraph) -> Result<(), ReportError> {
    for pair in graph.nodes.windows(2) {
        if pair[0].role >= pair[1].role {
            return Err(ReportError::MalformedInput(format!(
                "nodes out of canonical order: {} before {}",
                pair[0].role, pair[1].role
            )));
        }
    }

    for edge in &graph.edges {
        for role in [edge.from, edge.to] {
            match graph.node(role) {
                Some(node) if node.is_resolved() => {}
                Some(_) => {
                    return Err(ReportError::MalformedInput(format!(
                        "edge {} → {} references unresolved {}",
                        edge.from, edge.to, role
                    )))
                }
                None => {
                    return Err(ReportError::MalformedInput(format!(
                        "edge {} → {} references unknown {}",
                        edge.from, edge.to, role
                    )))
                }
            }
        }
        if !edge.from.is_adjacent_to(edge.to) {
            return Err(ReportError::MalformedInput(format!(
                "edge {} → {} skips the canonical order",
                edge.from, edge.to
            )));
        }
    }
    Ok(())
}

fn check_flow(flow: &ApiFlow) -> Result<(), ReportError> {
    if let Some(role) = flow.layers.keys().find(|role| !FLOW_ROLES.contains(role)) {
        return Err(ReportError::MalformedInput(format!(
            "{} files are not part of an api flow",
            role
        )));
    }
    Ok(())
}

fn console_diff(diff: &DiffResult) -> String {
    let mut output = String::new();
    output.push_str(&format!("=== {} → {} ===\n\n", diff.source, diff.target));
    output.push_str(&issue_sections(&diff.issues(), &diff.source, &diff.target));
    output.push('\n');
    output.push_str(&summary_line(&diff.summary()));
    output
}

/// Severity-grouped issue list; an empty list says so explicitly
fn issue_sections(issues: &[Issue], source: &str, target: &str) -> String {
    let mut output = String::new();

    if issues.is_empty() {
        output.push_str(&format!("✅ No divergences between {} and {}\n", source, target));
        return output;
    }
    if !issues.iter().any(|i| i.severity == Severity::Critical) {
        output.push_str("✅ No critical issues\n");
    }

    for (severity, heading) in [
        (Severity::Critical, "❌ Critical"),
        (Severity::Warning, "⚠️  Warnings"),
        (Severity::Info, "ℹ️  Info"),
    ] {
        let group: Vec<&Issue> = issues.iter().filter(|i| i.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        output.push_str(&format!("{} ({}):\n", heading, group.len()));
        for issue in group {
            output.push_str(&format!("   - {}: {}\n", issue.field, issue.message));
        }
    }
    output
}

fn summary_line(summary: &DiffSummary) -> String {
    format!(
        "Summary: {} critical, {} warning(s), {} info\nResult: {}\n",
        summary.critical_issues,
        summary.warnings,
        summary.informational,
        if summary.passed { "PASSED" } else { "FAILED" }
    )
}

fn console_domain(report: &DomainReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("=== Layer Consistency: {} ===\n\n", report.domain));

    output.push_str("Files:\n");
    for file in &report.files {
        output.push_str(&format!("  {:<10} {}\n", file.role.as_str(), describe_file(file)));
    }
    output.push('\n');

    for (source, target, outcome) in [
        ("DTO", "Model", &report.dto_to_model),
        ("Model", "Presenter", &report.model_to_presenter),
    ] {
        output.push_str(&format!("=== {} → {} ===\n", source, target));
        match outcome {
            Outcome::Checked { result } => {
                output.push_str(&issue_sections(&result.issues(), source, target));
            }
            Outcome::Skipped { reason, severity } => {
                output.push_str(&format!("{} Skipped: {}\n", severity_icon(*severity), reason));
            }
        }
        output.push('\n');
    }

    output.push_str("=== Mapper ===\n");
    match &report.mapper {
        Outcome::Checked { result } => output.push_str(&console_mapper(result)),
        Outcome::Skipped { reason, severity } => {
            output.push_str(&format!("{} Skipped: {}\n", severity_icon(*severity), reason));
        }
    }
    output.push('\n');

    output.push_str("=== Summary ===\n");
    output.push_str(&format!("Total issues: {}\n", report.summary.total_issues));
    output.push_str(&summary_line(&report.summary));

    if !report.passed() {
        output.push_str("\nNext steps:\n");
        output.push_str("  1. Add the missing fields to the target layer\n");
        output.push_str("  2. Convert them in Mapper.fromModel() and Mapper.toModel()\n");
        output.push_str(&format!("  3. Re-run validation for {}\n", report.domain));
    }
    output
}

fn describe_file(file: &LayerFile) -> String {
    match (&file.path, &file.declaration) {
        (None, _) => "❌ not found".to_string(),
        (Some(path), Some(declaration)) => format!(
            "✅ {} ({}, {} fields)",
            path.display(),
            declaration,
            file.field_count
        ),
        (Some(path), None) => format!("✅ {}", path.display()),
    }
}

fn console_mapper(audit: &MapperAudit) -> String {
    let mut output = String::new();
    for (coverage, source) in [(&audit.from_model, "Model"), (&audit.to_model, "Presenter")] {
        output.push_str(&coverage_line(coverage, source));
    }
    output
}

fn coverage_line(coverage: &ConversionCoverage, source: &str) -> String {
    if !coverage.found {
        return format!("❌ {}() not found\n", coverage.method);
    }
    if coverage.missing_fields.is_empty() {
        return format!("✅ {}() converts every {} field\n", coverage.method, source);
    }
    format!(
        "❌ {}() does not convert: {}\n",
        coverage.method,
        coverage.missing_fields.join(", ")
    )
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "❌",
        Severity::Warning => "⚠️ ",
        Severity::Info => "ℹ️ ",
    }
}

fn console_graph(graph: &ImpactGraph) -> String {
    let mut output = String::new();
    output.push_str(&format!("=== Impact Analysis: {} ===\n\n", graph.domain));

    for node in &graph.nodes {
        output.push_str(&format!("📁 {}\n", node.role));
        if !node.is_resolved() {
            if node.role.is_critical() {
                output.push_str("   ❌ NOT FOUND (critical)\n");
            } else {
                output.push_str("   ⚠️  not found\n");
            }
            continue;
        }
        for location in node.locations.iter().take(MAX_LISTED_LOCATIONS) {
            output.push_str(&format!("   ✅ {}\n", location.display()));
        }
        if node.locations.len() > MAX_LISTED_LOCATIONS {
            output.push_str(&format!(
                "   ... and {} more\n",
                node.locations.len() - MAX_LISTED_LOCATIONS
            ));
        }
    }

    if !graph.edges.is_empty() {
        output.push_str("\nDependencies:\n");
        for edge in &graph.edges {
            output.push_str(&format!("  {} --{}--> {}\n", edge.from, edge.relation, edge.to));
        }
    }

    output.push_str(&format!(
        "\nSummary: {} file(s) across {} role(s)\n",
        graph.total_files(),
        graph.resolved_roles().len()
    ));
    if graph.has_missing_critical() {
        let missing: Vec<&str> = graph.missing_critical.iter().map(|r| r.as_str()).collect();
        output.push_str(&format!("⚠️  Missing critical: {}\n", missing.join(", ")));
    }
    output.push_str(&format!(
        "Backend integrated: {}\n",
        if graph.backend_integrated { "yes" } else { "no" }
    ));

    output.push_str("\n=== Change Order: adding a field (bottom-up) ===\n");
    output.push_str(&numbered_steps(&graph.bottom_up(), FlowDirection::BottomUp));

    output.push_str("\n=== Change Order: removing a field (top-down) ===\n");
    output.push_str(&numbered_steps(&graph.top_down(), FlowDirection::TopDown));

    if graph.backend_integrated {
        output.push_str("\n=== Change Order: renaming a backend field ===\n");
        output.push_str("  1. DTO: rename the field to match the new payload\n");
        output.push_str("  2. Adapter: map the new name onto the existing Model field\n");
        output.push_str("  3. Done: Model and its consumers stay unchanged\n");
    }
    output
}

fn numbered_steps(order: &[Role], direction: FlowDirection) -> String {
    if order.is_empty() {
        return "  (no artifacts found)\n".to_string();
    }
    order
        .iter()
        .enumerate()
        .map(|(idx, role)| format!("  {}. {}\n", idx + 1, step_text(*role, direction)))
        .collect()
}

fn step_text(role: Role, direction: FlowDirection) -> &'static str {
    match direction {
        FlowDirection::BottomUp => match role {
            Role::Dto => "DTO: add the field to the response type",
            Role::Adapter => "Adapter: map it onto the Model",
            Role::Model => "Model: declare the field",
            Role::Presenter => "Presenter: expose it",
            Role::Mapper => "Mapper: convert it in fromModel() and toModel()",
            Role::Service => "Service: pass it through",
            Role::Hook => "Hook: return it",
            Role::Ui => "UI: render it",
        },
        FlowDirection::TopDown => match role {
            Role::Ui => "UI: stop rendering the field",
            Role::Hook => "Hook: stop returning it",
            Role::Service => "Service: stop passing it",
            Role::Mapper => "Mapper: drop it from fromModel() and toModel()",
            Role::Presenter => "Presenter: remove it",
            Role::Model => "Model: remove the declaration",
            Role::Adapter => "Adapter: stop mapping it",
            Role::Dto => "DTO: remove it from the response type",
        },
    }
}

fn mermaid_dependencies(graph: &ImpactGraph, field: Option<&str>) -> String {
    let mut output = String::from("graph TD\n");
    if let Some(field) = field {
        output.push_str(&format!("    %% impact of changing {} in {}\n", field, graph.domain));
    }

    for node in &graph.nodes {
        if node.is_resolved() {
            let mut label = node.role.to_string();
            for location in node.locations.iter().take(3) {
                label.push_str("<br/>");
                label.push_str(&file_name(location));
            }
            if node.locations.len() > 3 {
                label.push_str(&format!("<br/>+{} more", node.locations.len() - 3));
            }
            if let Some(field) = field {
                label.push_str(&format!("<br/>+ {}", field));
            }
            output.push_str(&format!("    {}[\"{}\"]\n", node.role, escape_label(&label)));
        } else if node.role.is_critical() {
            output.push_str(&format!("    {}[\"{} (missing)\"]:::missing\n", node.role, node.role));
        }
    }

    for edge in &graph.edges {
        output.push_str(&format!("    {} -->|{}| {}\n", edge.from, edge.relation, edge.to));
    }

    if graph.has_missing_critical() {
        output.push_str("    classDef missing stroke-dasharray: 5 5,stroke:#d33\n");
    }
    output
}

fn mermaid_flow(graph: &ImpactGraph, direction: FlowDirection) -> String {
    let (order, start) = match direction {
        FlowDirection::BottomUp => (graph.bottom_up(), "Start: Add Field"),
        FlowDirection::TopDown => (graph.top_down(), "Start: Remove Field"),
    };

    let mut output = String::from("graph TD\n");
    output.push_str(&format!("    Start([{}])\n", start));
    for (idx, role) in order.iter().enumerate() {
        output.push_str(&format!(
            "    Step{}[\"{}. {}\"]\n",
            idx + 1,
            idx + 1,
            escape_label(step_text(*role, direction))
        ));
    }
    output.push_str("    End([Done])\n");

    let mut previous = "Start".to_string();
    for idx in 0..order.len() {
        let current = format!("Step{}", idx + 1);
        output.push_str(&format!("    {} --> {}\n", previous, current));
        previous = current;
    }
    output.push_str(&format!("    {} --> End\n", previous));
    output
}

fn console_flow(flow: &ApiFlow) -> String {
    let mut output = String::new();
    output.push_str(&format!("=== API Flow: {} ===\n\n", flow.domain));

    if !flow.found() {
        output.push_str(&format!("❌ No service files found for: {}\n", flow.domain));
        output.push_str("\n💡 Suggestions:\n");
        output.push_str("   1. Check the domain spelling (lowercase, hyphen-separated)\n");
        output.push_str(&format!("   2. Search the sources for \"{}\"\n", flow.domain));
        output.push_str("   3. Try the plural or a related name\n");
        return output;
    }

    output.push_str(&format!("✅ Found API flow for: {}\n", flow.domain));

    output.push_str("\n📦 Frontend Services:\n");
    let planning = flow.files(FlowArtifact::PlanningService);
    let current = flow.files(FlowArtifact::CurrentService);
    if planning.is_empty() && current.is_empty() {
        output.push_str("   ⚠️  Not found\n");
    } else {
        if !planning.is_empty() {
            output.push_str(&labelled("Planning:", planning));
        }
        if !current.is_empty() {
            output.push_str(&labelled("Current:", current));
        }
    }

    output.push_str("\n📦 Backend Service:\n");
    output.push_str(&listed(flow.files(FlowArtifact::BackendService)));

    output.push_str("\n📦 API Handlers (route.ts):\n");
    output.push_str(&listed(flow.files(FlowArtifact::ApiHandler)));

    output.push_str("\n📄 Type Files:\n");
    output.push_str(&labelled("DTO:", flow.layer_files(Role::Dto)));
    output.push_str(&labelled("Model:", flow.layer_files(Role::Model)));
    output.push_str(&labelled("Presenter:", flow.layer_files(Role::Presenter)));

    output.push_str("\n🔄 Converter Files:\n");
    output.push_str(&labelled("Adapter:", flow.layer_files(Role::Adapter)));
    output.push_str(&labelled("Mapper:", flow.layer_files(Role::Mapper)));

    output.push_str("\n🌐 Endpoint Files:\n");
    output.push_str(&labelled("Frontend:", flow.files(FlowArtifact::FrontendEndpoint)));
    output.push_str(&labelled("Backend:", flow.files(FlowArtifact::BackendEndpoint)));

    let interface = flow.files(FlowArtifact::Interface);
    let module = flow.files(FlowArtifact::Module);
    if !interface.is_empty() || !module.is_empty() {
        output.push_str("\n📋 Optional Files:\n");
        if !interface.is_empty() {
            output.push_str(&labelled("Interface:", interface));
        }
        if !module.is_empty() {
            output.push_str(&labelled("Module:", module));
        }
    }

    output.push_str(&format!("\n📊 Summary: Found {} file(s)\n", flow.total_files()));
    output
}

/// `label path` per line, the label only on the first
fn labelled(label: &str, paths: &[PathBuf]) -> String {
    const WIDTH: usize = 11;
    if paths.is_empty() {
        return format!("   {:<width$}⚠️  Not found\n", label, width = WIDTH);
    }
    paths
        .iter()
        .enumerate()
        .map(|(idx, path)| {
            let label = if idx == 0 { label } else { "" };
            format!("   {:<width$}{}\n", label, path.display(), width = WIDTH)
        })
        .collect()
}

fn listed(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "   ⚠️  Not found\n".to_string();
    }
    paths.iter().map(|path| format!("   {}\n", path.display())).collect()
}

fn format_mermaid_flow(flow: &ApiFlow) -> String {
    let mut output = String::new();
    output.push_str(&format!("# API Flow: {}\n\n", flow.domain));
    output.push_str("## Type Conversion\n\n```mermaid\n");
    output.push_str(&mermaid_type_conversion(flow));
    output.push_str("```\n");
    output
}

fn mermaid_type_conversion(flow: &ApiFlow) -> String {
    let type_missing = |layer: SchemaLayer| flow.layer_files(layer.role()).is_empty();
    let frontend_missing =
        flow.files(FlowArtifact::PlanningService).is_empty() && flow.files(FlowArtifact::CurrentService).is_empty();

    let node = |id: &str, label: &str, missing: bool| {
        let class = if missing { ":::missing" } else { "" };
        format!("    {}[\"{}\"]{}\n", id, escape_label(label), class)
    };
    let step = |stage: &str, call: &str, missing: bool| {
        let mut label = format!("{}<br/>{}", stage, call);
        if missing {
            label.push_str("<br/>(missing)");
        }
        format!("\"{}\"", label)
    };

    let backend = step("Backend Service", "fetch()", flow.files(FlowArtifact::BackendService).is_empty());
    let handler = step("API Handler", "ServiceResponse", flow.files(FlowArtifact::ApiHandler).is_empty());
    let adapter_missing = flow.layer_files(Role::Adapter).is_empty();
    let mapper_missing = flow.layer_files(Role::Mapper).is_empty();

    let dto = flow.declaration(SchemaLayer::Dto);
    let model = flow.declaration(SchemaLayer::Model);
    let presenter = flow.declaration(SchemaLayer::Presenter);

    let mut output = String::from("graph LR\n");
    output.push_str("    API[Backend API JSON]\n");
    output.push_str(&node("DTO", &dto, type_missing(SchemaLayer::Dto)));
    output.push_str(&node("Model", &model, type_missing(SchemaLayer::Model)));
    output.push_str(&node("FS", "Frontend Service", frontend_missing));
    output.push_str(&node("Presenter", &presenter, type_missing(SchemaLayer::Presenter)));
    output.push_str("    UI[UI Component]\n");
    output.push_str(&format!("    API -->|{}| DTO\n", backend));
    output.push_str(&format!("    DTO -->|{}| Model\n", step("Adapter", "fromResponse()", adapter_missing)));
    output.push_str(&format!("    Model -->|{}| FS\n", handler));
    output.push_str(&format!("    FS -->|{}| Presenter\n", step("Mapper", "fromModel()", mapper_missing)));
    output.push_str("    Presenter -->|\"React Props\"| UI\n");

    output.push_str("\n    %% create and update travel back\n");
    output.push_str("    UI2[UI Form]\n");
    output.push_str(&node("Presenter2", &presenter, type_missing(SchemaLayer::Presenter)));
    output.push_str(&node("Model2", &model, type_missing(SchemaLayer::Model)));
    output.push_str(&node("AH", "API Handler", flow.files(FlowArtifact::ApiHandler).is_empty()));
    output.push_str(&node("DTO2", &dto, type_missing(SchemaLayer::Dto)));
    output.push_str("    API2[Backend API]\n");
    output.push_str("    UI2 -->|\"User Input\"| Presenter2\n");
    output.push_str(&format!("    Presenter2 -->|{}| Model2\n", step("Mapper", "toModel()", mapper_missing)));
    output.push_str("    Model2 -->|\"Frontend Service\"| AH\n");
    output.push_str(&format!("    AH -->|{}| DTO2\n", step("Adapter", "toRequest()", adapter_missing)));
    output.push_str(&format!("    DTO2 -->|{}| API2\n", backend));

    if output.contains(":::missing") {
        output.push_str("    classDef missing stroke-dasharray: 5 5,stroke:#d33\n");
    }
    output
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}

fn console_fields(schema: &Schema) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "=== {} ({}, {}) ===\n",
        schema.declaration, schema.layer, schema.domain
    ));
    if let Some(source) = &schema.source {
        output.push_str(&format!("Source: {}\n", source.display()));
    }
    output.push('\n');

    if schema.is_empty() {
        output.push_str("No fields found\n");
        return output;
    }

    let required: Vec<&FieldDeclaration> = schema.required_fields().collect();
    let optional: Vec<&FieldDeclaration> = schema.optional_fields().collect();

    if !required.is_empty() {
        output.push_str(&format!("✅ Required fields ({}):\n", required.len()));
        for field in required {
            output.push_str(&format!("   - {}: {}\n", field.name, field.type_expr));
        }
    }
    if !optional.is_empty() {
        output.push_str(&format!("🔹 Optional fields ({}):\n", optional.len()));
        for field in optional {
            output.push_str(&format!("   - {}?: {}\n", field.name, field.type_expr));
        }
    }

    output.push_str(&format!("\nTotal: {} field(s)\n", schema.fields.len()));
    output
}

fn console_changes(analysis: &ChangeAnalysis) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "=== Changes: {} ({}) ===\n\n",
        analysis.declaration, analysis.domain
    ));

    if analysis.is_empty() {
        output.push_str("✅ No field changes\n");
        return output;
    }

    for (change_type, heading) in [
        (ChangeType::Added, "➕ Added"),
        (ChangeType::Removed, "➖ Removed"),
        (ChangeType::TypeChanged, "✏️  Type changed"),
        (ChangeType::OptionalityChanged, "✏️  Optionality changed"),
    ] {
        let group: Vec<_> = analysis.of_type(change_type).collect();
        if group.is_empty() {
            continue;
        }
        output.push_str(&format!("{} ({}):\n", heading, group.len()));
        for change in group {
            let marker = if change.breaking { " (breaking)" } else { "" };
            output.push_str(&format!("   - {}{}\n", change.describe(), marker));
        }
    }

    let summary = &analysis.summary;
    output.push_str(&format!(
        "\nSummary: {} change(s): {} added, {} removed, {} modified\n",
        summary.total_changes, summary.added, summary.removed, summary.modified
    ));
    if summary.has_breaking_changes {
        output.push_str("⚠️  Breaking changes: update every consumer top-down before releasing\n");
    } else {
        output.push_str("✅ No breaking changes\n");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::analyze_changes;
    use crate::comparator::compare;
    use crate::diff::{MissingField, TypeMismatch};
    use crate::impact::{ImpactEdge, ImpactNode};
    use crate::layer::SchemaLayer;
    use crate::mapping_registry::MappingRegistry;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn field(name: &str, type_expr: &str) -> FieldDeclaration {
        FieldDeclaration::new(name, type_expr, false, 1)
    }

    fn graph(roles: &[Role]) -> ImpactGraph {
        let discovered: BTreeMap<Role, Vec<PathBuf>> = roles
            .iter()
            .map(|role| (*role, vec![PathBuf::from(format!("src/brochure.{}.ts", role.as_str().to_lowercase()))]))
            .collect();
        ImpactGraph::from_discovery("brochure", &discovered)
    }

    #[test]
    fn test_reporter_creation() {
        let reporter = Reporter::new();
        assert_eq!(reporter.format(), ReportFormat::Console);
        assert_eq!(Reporter::new().with_format(ReportFormat::Json).format(), ReportFormat::Json);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("yml".parse::<ReportFormat>().unwrap(), ReportFormat::Yaml);
        assert!(matches!("html".parse::<ReportFormat>(), Err(ReportError::UnknownFormat(_))));
    }

    #[test]
    fn test_console_diff_groups_by_severity_with_hint() {
        let dto = vec![field("id", "string"), field("description", "string|null"), field("price", "string")];
        let model = vec![field("id", "string"), field("price", "number"), field("displayTitle", "string")];
        let mut diff = compare(&dto, &model, &MappingRegistry::seeded());
        diff.source = "DTO".to_string();
        diff.target = "Model".to_string();

        let text = render(Report::Diff(&diff), ReportFormat::Console).unwrap();

        assert!(text.contains("=== DTO → Model ==="));
        assert!(text.contains("❌ Critical (1):"));
        assert!(text.contains("description: missing in Model (should map to: content (null → undefined))"));
        assert!(text.contains("⚠️  Warnings (1):"));
        assert!(text.contains("price: DTO: string vs Model: number"));
        assert!(text.contains("ℹ️  Info (1):"));
        assert!(text.contains("Result: FAILED"));

        let critical = text.find("Critical").unwrap();
        let info = text.find("Info (").unwrap();
        assert!(critical < info);
    }

    #[test]
    fn test_empty_diff_distinguishable_from_extras_only() {
        let empty = DiffResult::new("Model", "Presenter");
        let mut extras = DiffResult::new("Model", "Presenter");
        extras.extra_in_target.push(field("displayTitle", "string"));

        let empty_text = render(Report::Diff(&empty), ReportFormat::Console).unwrap();
        let extras_text = render(Report::Diff(&extras), ReportFormat::Console).unwrap();

        assert!(empty_text.contains("No divergences between Model and Presenter"));
        assert!(!extras_text.contains("No divergences"));
        assert!(extras_text.contains("No critical issues"));
        assert!(extras_text.contains("displayTitle: only in Presenter"));
        assert!(empty_text.contains("Result: PASSED"));
        assert!(extras_text.contains("Result: PASSED"));
        assert_ne!(empty_text, extras_text);
    }

    #[test]
    fn test_json_and_yaml_output() {
        let mut diff = DiffResult::new("Model", "Presenter");
        diff.extra_in_target.push(field("displayTitle", "string"));

        let json = render(Report::Diff(&diff), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["extra_in_target"][0]["name"], "displayTitle");
        assert_eq!(value["extra_severity"], "info");

        let yaml = render(Report::Diff(&diff), ReportFormat::Yaml).unwrap();
        assert!(yaml.contains("displayTitle"));
    }

    #[test]
    fn test_mermaid_rejected_for_diff() {
        let diff = DiffResult::new("DTO", "Model");
        let result = render(Report::Diff(&diff), ReportFormat::Mermaid);
        assert!(matches!(result, Err(ReportError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_diff_missing_and_mismatched_is_malformed() {
        let mut diff = DiffResult::new("DTO", "Model");
        diff.missing_in_target.push(MissingField {
            field: field("price", "string"),
            expected_name: "price".to_string(),
            hint: None,
        });
        diff.type_mismatches.push(TypeMismatch {
            field: "price".to_string(),
            target_field: "price".to_string(),
            source_type: "string".to_string(),
            target_type: "number".to_string(),
        });

        let result = render(Report::Diff(&diff), ReportFormat::Console);
        assert!(matches!(result, Err(ReportError::MalformedInput(_))));
    }

    #[test]
    fn test_console_graph_with_guides() {
        let graph = graph(&Role::CANONICAL);
        let text = render(Report::Graph(&graph), ReportFormat::Console).unwrap();

        assert!(text.contains("=== Impact Analysis: brochure ==="));
        assert!(text.contains("DTO --adapts--> Adapter"));
        assert!(text.contains("  1. DTO: add the field to the response type"));
        assert!(text.contains("  1. UI: stop rendering the field"));
        assert!(text.contains("renaming a backend field"));
        assert!(text.contains("Backend integrated: yes"));
    }

    #[test]
    fn test_console_graph_flags_missing_critical() {
        let graph = graph(&[Role::Model, Role::Ui]);
        let text = render(Report::Graph(&graph), ReportFormat::Console).unwrap();

        assert!(text.contains("❌ NOT FOUND (critical)"));
        assert!(text.contains("Missing critical: Presenter, Mapper, Service"));
        assert!(!text.contains("Dependencies:"));
        assert!(!text.contains("renaming a backend field"));
    }

    #[test]
    fn test_console_graph_collapses_long_lists() {
        let mut discovered = BTreeMap::new();
        discovered.insert(
            Role::Ui,
            (0..8).map(|i| PathBuf::from(format!("ui/part{}.section.tsx", i))).collect(),
        );
        let graph = ImpactGraph::from_discovery("brochure", &discovered);

        let text = render(Report::Graph(&graph), ReportFormat::Console).unwrap();
        assert!(text.contains("... and 3 more"));
    }

    #[test]
    fn test_mermaid_graph_output() {
        let graph = graph(&[Role::Model, Role::Presenter, Role::Ui]);
        let text = Reporter::new()
            .with_format(ReportFormat::Mermaid)
            .with_field("viewCount")
            .render(Report::Graph(&graph))
            .unwrap();

        assert!(text.contains("```mermaid\ngraph TD\n"));
        assert!(text.contains("Model -->|implements| Presenter"));
        assert!(!text.contains("Presenter -->|converts| UI"));
        assert!(text.contains("Mapper[\"Mapper (missing)\"]:::missing"));
        assert!(text.contains("+ viewCount"));
        assert!(text.contains("Start([Start: Add Field])"));
        assert!(text.contains("Start([Start: Remove Field])"));
    }

    #[test]
    fn test_flow_diagram_chain() {
        let graph = graph(&[Role::Model, Role::Presenter]);
        let flow = flow_diagram(&graph, FlowDirection::BottomUp).unwrap();

        assert!(flow.contains("Step1[\"1. Model: declare the field\"]"));
        assert!(flow.contains("Start --> Step1"));
        assert!(flow.contains("Step1 --> Step2"));
        assert!(flow.contains("Step2 --> End"));

        let empty = ImpactGraph::from_discovery("x", &BTreeMap::new());
        assert!(flow_diagram(&empty, FlowDirection::TopDown).unwrap().contains("Start --> End"));
    }

    #[test]
    fn test_graph_with_skipping_edge_is_malformed() {
        let mut graph = graph(&[Role::Model, Role::Ui]);
        graph.edges.push(ImpactEdge {
            from: Role::Model,
            to: Role::Ui,
            relation: "implements".to_string(),
        });

        assert!(matches!(
            dependency_diagram(&graph, None),
            Err(ReportError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_graph_with_unknown_node_is_malformed() {
        let graph = ImpactGraph {
            domain: "x".to_string(),
            nodes: vec![ImpactNode {
                domain: "x".to_string(),
                role: Role::Model,
                locations: vec![PathBuf::from("x.model.ts")],
            }],
            edges: vec![ImpactEdge {
                from: Role::Model,
                to: Role::Presenter,
                relation: "implements".to_string(),
            }],
            missing_critical: Vec::new(),
            backend_integrated: false,
        };

        let result = render(Report::Graph(&graph), ReportFormat::Json);
        assert!(matches!(result, Err(ReportError::MalformedInput(_))));
    }

    fn api_flow() -> ApiFlow {
        let mut layers = BTreeMap::new();
        for role in FLOW_ROLES {
            layers.insert(role, Vec::new());
        }
        layers.insert(Role::Dto, vec![PathBuf::from("api/brochure.dto.ts")]);
        layers.insert(Role::Model, vec![PathBuf::from("planning/brochure.model.ts")]);
        layers.insert(Role::Presenter, vec![PathBuf::from("planning/brochure.presenter.ts")]);
        layers.insert(Role::Mapper, vec![PathBuf::from("planning/brochure.mapper.ts")]);

        let mut artifacts = BTreeMap::new();
        for artifact in FlowArtifact::ALL {
            artifacts.insert(artifact, Vec::new());
        }
        artifacts.insert(FlowArtifact::PlanningService, vec![PathBuf::from("planning/brochure.service.ts")]);
        artifacts.insert(
            FlowArtifact::ApiHandler,
            vec![PathBuf::from("cms/brochures/[id]/route.ts"), PathBuf::from("cms/brochures/route.ts")],
        );

        let mut declarations = BTreeMap::new();
        declarations.insert(SchemaLayer::Dto, "BrochureResponseDto".to_string());

        ApiFlow {
            domain: "brochure".to_string(),
            layers,
            artifacts,
            declarations,
        }
    }

    #[test]
    fn test_console_flow_sections() {
        let flow = api_flow();
        let text = render(Report::Flow(&flow), ReportFormat::Console).unwrap();

        assert!(text.contains("=== API Flow: brochure ==="));
        assert!(text.contains("✅ Found API flow for: brochure"));
        assert!(text.contains("   Planning:  planning/brochure.service.ts\n"));
        assert!(!text.contains("Current:"));
        assert!(text.contains("📦 Backend Service:\n   ⚠️  Not found\n"));
        assert!(text.contains("   cms/brochures/route.ts\n"));
        assert!(text.contains("   Adapter:   ⚠️  Not found\n"));
        assert!(!text.contains("Optional Files"));
        assert!(text.contains("📊 Summary: Found 7 file(s)"));
    }

    #[test]
    fn test_console_flow_not_found() {
        let mut flow = api_flow();
        flow.artifacts.insert(FlowArtifact::PlanningService, Vec::new());

        let text = render(Report::Flow(&flow), ReportFormat::Console).unwrap();
        assert!(text.contains("❌ No service files found for: brochure"));
        assert!(text.contains("Suggestions"));
        assert!(!text.contains("Type Files"));
    }

    #[test]
    fn test_mermaid_type_conversion() {
        let flow = api_flow();
        let text = render(Report::Flow(&flow), ReportFormat::Mermaid).unwrap();

        assert!(text.starts_with("# API Flow: brochure\n"));
        assert!(text.contains("```mermaid\ngraph LR\n"));
        assert!(text.contains("DTO[\"BrochureResponseDto\"]\n"));
        assert!(text.contains("Model[\"BrochureModel\"]\n"));
        assert!(text.contains("DTO -->|\"Adapter<br/>fromResponse()<br/>(missing)\"| Model"));
        assert!(text.contains("FS -->|\"Mapper<br/>fromModel()\"| Presenter"));
        assert!(text.contains("API -->|\"Backend Service<br/>fetch()<br/>(missing)\"| DTO"));
        assert!(text.contains("Presenter2 -->|\"Mapper<br/>toModel()\"| Model2"));
        assert!(!text.contains(":::missing"));
    }

    #[test]
    fn test_type_conversion_marks_missing_types() {
        let mut flow = api_flow();
        flow.layers.insert(Role::Presenter, Vec::new());

        let diagram = type_conversion_diagram(&flow).unwrap();
        assert!(diagram.contains("Presenter[\"BrochurePresenter\"]:::missing"));
        assert!(diagram.contains("Presenter2[\"BrochurePresenter\"]:::missing"));
        assert!(diagram.contains("classDef missing"));
    }

    #[test]
    fn test_flow_with_foreign_role_is_malformed() {
        let mut flow = api_flow();
        flow.layers.insert(Role::Ui, vec![PathBuf::from("brochure.section.tsx")]);

        assert!(matches!(
            render(Report::Flow(&flow), ReportFormat::Json),
            Err(ReportError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_flow_serializes_to_json() {
        let flow = api_flow();
        let json = render(Report::Flow(&flow), ReportFormat::Json).unwrap();
        assert!(json.contains("\"api_handler\""));
        assert!(json.contains("\"dto\": \"BrochureResponseDto\""));
    }

    #[test]
    fn test_console_fields_required_first() {
        let schema = Schema::new(SchemaLayer::Model, "brochure", "BrochureModel").with_fields(vec![
            FieldDeclaration::new("content", "string", true, 3),
            field("id", "string"),
        ]);

        let text = render(Report::Fields(&schema), ReportFormat::Console).unwrap();
        let required = text.find("Required fields (1)").unwrap();
        let optional = text.find("Optional fields (1)").unwrap();
        assert!(required < optional);
        assert!(text.contains("content?: string"));
        assert!(text.contains("Total: 2 field(s)"));
    }

    #[test]
    fn test_console_changes() {
        let baseline = vec![field("id", "string"), field("title", "string")];
        let current = vec![field("id", "number"), field("viewCount", "number")];
        let analysis = analyze_changes("brochure", "BrochureModel", &baseline, &current);

        let text = render(Report::Changes(&analysis), ReportFormat::Console).unwrap();
        assert!(text.contains("➕ Added (1):"));
        assert!(text.contains("title: string (breaking)"));
        assert!(text.contains("id: string → number (breaking)"));
        assert!(text.contains("Breaking changes"));
    }
}
