use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extractor::FieldDeclaration;
use crate::field_mapping::FieldMapping;

/// How much a divergence matters. Ordered so `Critical` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingInTarget,
    ExtraInTarget,
    TypeMismatch,
    OptionalityMismatch,
    MissingConversion,
    MissingArtifact,
}

/// Flattened view of a single divergence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub field: String,
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, kind: IssueKind, field: &str, message: String) -> Self {
        Self {
            severity,
            kind,
            field: field.to_string(),
            message,
        }
    }
}

/// Source field with no counterpart in the target layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub field: FieldDeclaration,
    /// Name the target layer was expected to use
    pub expected_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub field: String,
    pub target_field: String,
    pub source_type: String,
    pub target_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalityMismatch {
    pub field: String,
    pub target_field: String,
    pub source_optional: bool,
    pub target_optional: bool,
}

/// Divergences between one source layer and one target layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub source: String,
    pub target: String,
    pub missing_in_target: Vec<MissingField>,
    pub extra_in_target: Vec<FieldDeclaration>,
    pub type_mismatches: Vec<TypeMismatch>,
    pub optionality_mismatches: Vec<OptionalityMismatch>,
    /// Severity assigned to extra-in-target fields
    pub extra_severity: Severity,
}

/// Issue counts; `passed` ignores everything below critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub total_issues: usize,
    pub critical_issues: usize,
    pub warnings: usize,
    pub informational: usize,
    pub passed: bool,
}

impl Default for DiffSummary {
    /// Nothing counted yet, which passes
    fn default() -> Self {
        Self {
            total_issues: 0,
            critical_issues: 0,
            warnings: 0,
            informational: 0,
            passed: true,
        }
    }
}

impl DiffSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut summary = DiffSummary::default();
        for issue in issues {
            summary.add(issue.severity);
        }
        summary
    }

    pub fn add(&mut self, severity: Severity) {
        self.total_issues += 1;
        match severity {
            Severity::Critical => {
                self.critical_issues += 1;
                self.passed = false;
            }
            Severity::Warning => self.warnings += 1,
            Severity::Info => self.informational += 1,
        }
    }

    pub fn merge(&mut self, other: &DiffSummary) {
        self.total_issues += other.total_issues;
        self.critical_issues += other.critical_issues;
        self.warnings += other.warnings;
        self.informational += other.informational;
        self.passed = self.passed && other.passed;
    }
}

impl DiffResult {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            missing_in_target: Vec::new(),
            extra_in_target: Vec::new(),
            type_mismatches: Vec::new(),
            optionality_mismatches: Vec::new(),
            extra_severity: Severity::Info,
        }
    }

    pub fn missing_names(&self) -> Vec<&str> {
        self.missing_in_target
            .iter()
            .map(|missing| missing.field.name.as_str())
            .collect()
    }

    pub fn extra_names(&self) -> Vec<&str> {
        self.extra_in_target.iter().map(|f| f.name.as_str()).collect()
    }

    /// Target fields the source lacks, read from the target's side
    pub fn missing_in_source(&self) -> Vec<&str> {
        self.extra_names()
    }

    pub fn is_empty(&self) -> bool {
        self.missing_in_target.is_empty()
            && self.extra_in_target.is_empty()
            && self.type_mismatches.is_empty()
            && self.optionality_mismatches.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        !self.missing_in_target.is_empty()
    }

    /// Divergences with their severity, critical first
    pub fn issues(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        for missing in &self.missing_in_target {
            let message = match &missing.hint {
                Some(mapping) => format!(
                    "missing in {} (should map to: {})",
                    self.target,
                    mapping.hint()
                ),
                None => format!("missing in {}", self.target),
            };
            issues.push(Issue::new(Severity::Critical, IssueKind::MissingInTarget, &missing.field.name, message));
        }

        for mismatch in &self.type_mismatches {
            issues.push(Issue::new(
                Severity::Warning,
                IssueKind::TypeMismatch,
                &mismatch.field,
                format!(
                    "{}: {} vs {}: {}",
                    self.source, mismatch.source_type, self.target, mismatch.target_type
                ),
            ));
        }

        for mismatch in &self.optionality_mismatches {
            issues.push(Issue::new(
                Severity::Warning,
                IssueKind::OptionalityMismatch,
                &mismatch.field,
                format!(
                    "{} {} vs {} {}",
                    self.source,
                    optionality_label(mismatch.source_optional),
                    self.target,
                    optionality_label(mismatch.target_optional)
                ),
            ));
        }

        for extra in &self.extra_in_target {
            issues.push(Issue::new(
                self.extra_severity,
                IssueKind::ExtraInTarget,
                &extra.name,
                format!("only in {}", self.target),
            ));
        }

        issues
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_issues(&self.issues())
    }
}

pub fn optionality_label(optional: bool) -> &'static str {
    if optional {
        "optional"
    } else {
        "required"
    }
}
