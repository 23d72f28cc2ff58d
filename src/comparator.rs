use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::diff::{DiffResult, MissingField, OptionalityMismatch, Severity, TypeMismatch};
use crate::extractor::{FieldDeclaration, Schema};
use crate::mapping_registry::MappingRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Report extra-in-target fields as warnings instead of info
    #[serde(default)]
    pub strict_extra_fields: bool,
}

/// Compare two field lists through `mapping`.
///
/// Output lists are sorted by field name, so the result does not depend on
/// declaration order.
pub fn compare(source: &[FieldDeclaration], target: &[FieldDeclaration], mapping: &MappingRegistry) -> DiffResult {
    compare_with(source, target, mapping, CompareOptions::default())
}

pub fn compare_with(
    source: &[FieldDeclaration],
    target: &[FieldDeclaration],
    mapping: &MappingRegistry,
    options: CompareOptions,
) -> DiffResult {
    let mut diff = DiffResult::new("source", "target");
    fill_diff(&mut diff, source, target, mapping, options);
    diff
}

/// Compare two extracted schemas, labelling the result with their layers
pub fn compare_schemas(
    source: &Schema,
    target: &Schema,
    mapping: &MappingRegistry,
    options: CompareOptions,
) -> DiffResult {
    let mut diff = DiffResult::new(&source.layer.to_string(), &target.layer.to_string());
    fill_diff(&mut diff, &source.fields, &target.fields, mapping, options);

    debug!(
        domain = %source.domain,
        source = %source.layer,
        target = %target.layer,
        missing = diff.missing_in_target.len(),
        extra = diff.extra_in_target.len(),
        type_mismatches = diff.type_mismatches.len(),
        optionality_mismatches = diff.optionality_mismatches.len(),
        "compared schemas"
    );
    diff
}

fn fill_diff(
    diff: &mut DiffResult,
    source: &[FieldDeclaration],
    target: &[FieldDeclaration],
    mapping: &MappingRegistry,
    options: CompareOptions,
) {
    let source_by_name: BTreeMap<&str, &FieldDeclaration> =
        source.iter().map(|f| (f.name.as_str(), f)).collect();
    let target_by_name: BTreeMap<&str, &FieldDeclaration> =
        target.iter().map(|f| (f.name.as_str(), f)).collect();

    for (name, source_field) in &source_by_name {
        let expected = mapping.forward(name);

        let Some(target_field) = target_by_name.get(expected) else {
            diff.missing_in_target.push(MissingField {
                field: (*source_field).clone(),
                expected_name: expected.to_string(),
                hint: mapping.hint(name).cloned(),
            });
            continue;
        };

        let label = display_name(name, expected);

        if source_field.normalized_type() != target_field.normalized_type() {
            diff.type_mismatches.push(TypeMismatch {
                field: label.clone(),
                target_field: expected.to_string(),
                source_type: source_field.type_expr.clone(),
                target_type: target_field.type_expr.clone(),
            });
        }

        if source_field.optional != target_field.optional {
            diff.optionality_mismatches.push(OptionalityMismatch {
                field: label,
                target_field: expected.to_string(),
                source_optional: source_field.optional,
                target_optional: target_field.optional,
            });
        }
    }

    for (name, target_field) in &target_by_name {
        let expected = mapping.reverse(name);
        if !source_by_name.contains_key(expected) {
            diff.extra_in_target.push((*target_field).clone());
        }
    }

    diff.extra_severity = if options.strict_extra_fields {
        Severity::Warning
    } else {
        Severity::Info
    };
}

/// `isActive → isPublic` for renamed pairs, the bare name otherwise
fn display_name(source: &str, target: &str) -> String {
    if source == target {
        source.to_string()
    } else {
        format!("{} → {}", source, target)
    }
}
