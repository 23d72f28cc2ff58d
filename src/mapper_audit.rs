use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diff::{Issue, IssueKind, Severity};
use crate::extractor::{find_block, FieldDeclaration};

pub const FROM_MODEL: &str = "fromModel";
pub const TO_MODEL: &str = "toModel";

/// Which fields one mapper method assigns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionCoverage {
    pub method: String,
    pub found: bool,
    pub missing_fields: Vec<String>,
}

impl ConversionCoverage {
    pub fn is_complete(&self) -> bool {
        self.found && self.missing_fields.is_empty()
    }
}

/// Coverage of both Mapper directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperAudit {
    /// Model → Presenter, checked against Model fields
    pub from_model: ConversionCoverage,
    /// Presenter → Model, checked against Presenter fields
    pub to_model: ConversionCoverage,
}

impl MapperAudit {
    pub fn issues(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        for coverage in [&self.from_model, &self.to_model] {
            for field in &coverage.missing_fields {
                let message = if coverage.found {
                    format!("not converted in Mapper.{}()", coverage.method)
                } else {
                    format!("Mapper.{}() not found", coverage.method)
                };
                issues.push(Issue::new(Severity::Critical, IssueKind::MissingConversion, field, message));
            }
        }
        issues
    }

    pub fn is_complete(&self) -> bool {
        self.from_model.is_complete() && self.to_model.is_complete()
    }
}

pub fn audit_mapper(
    mapper_text: &str,
    model_fields: &[FieldDeclaration],
    presenter_fields: &[FieldDeclaration],
) -> MapperAudit {
    MapperAudit {
        from_model: method_coverage(mapper_text, FROM_MODEL, model_fields),
        to_model: method_coverage(mapper_text, TO_MODEL, presenter_fields),
    }
}

/// Check that the body of `method` assigns every field
pub fn method_coverage(text: &str, method: &str, fields: &[FieldDeclaration]) -> ConversionCoverage {
    let lines: Vec<&str> = text.lines().collect();
    let header = method_header(method);

    let body = match find_block(&lines, &header, method) {
        Ok(span) => lines[span.start..=span.end].join("\n"),
        Err(err) => {
            debug!(method, error = %err, "mapper method not found");
            return ConversionCoverage {
                method: method.to_string(),
                found: false,
                missing_fields: fields.iter().map(|f| f.name.clone()).collect(),
            };
        }
    };

    if spread_pattern().is_match(&body) {
        debug!(method, "spread assignment covers all fields");
        return ConversionCoverage {
            method: method.to_string(),
            found: true,
            missing_fields: Vec::new(),
        };
    }

    let missing_fields = fields
        .iter()
        .filter(|field| !assigns(&body, &field.name))
        .map(|field| field.name.clone())
        .collect();

    ConversionCoverage {
        method: method.to_string(),
        found: true,
        missing_fields,
    }
}

/// `field: value`, `{ field, ... }` shorthand, or `this.field = value`
fn assigns(body: &str, field: &str) -> bool {
    let name = regex::escape(field);
    let pattern = format!(
        r"(?:^|[^\w$.]){name}\s*:|[{{,]\s*{name}\s*[,}}]|\.{name}\s*=[^=]",
        name = name
    );
    Regex::new(&pattern).expect("escaped field name").is_match(body)
}

fn method_header(method: &str) -> Regex {
    let pattern = format!(
        r"^\s*(?:export\s+)?(?:(?:public|private|protected|static|async)\s+)*(?:function\s+)?{}\s*(?:<[^>]*>)?\s*[(=:]",
        regex::escape(method)
    );
    Regex::new(&pattern).expect("escaped method name")
}

fn spread_pattern() -> &'static Regex {
    use std::sync::OnceLock;
    static SPREAD: OnceLock<Regex> = OnceLock::new();
    SPREAD.get_or_init(|| Regex::new(r"\.\.\.\s*[A-Za-z_$]").expect("static pattern"))
}
