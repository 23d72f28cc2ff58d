use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::comparator::compare;
use crate::extractor::FieldDeclaration;
use crate::mapping_registry::MappingRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    TypeChanged,
    OptionalityChanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::TypeChanged => "type changed",
            ChangeType::OptionalityChanged => "optionality changed",
        };
        f.write_str(label)
    }
}

/// One field-level change between a baseline declaration and the current one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<FieldDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<FieldDeclaration>,
    /// Whether existing consumers can break
    pub breaking: bool,
}

impl FieldChange {
    pub fn describe(&self) -> String {
        match (self.change_type, &self.old_value, &self.new_value) {
            (ChangeType::Added, _, Some(new)) => format!("{}: {}", new.name, new.type_expr),
            (ChangeType::Removed, Some(old), _) => format!("{}: {}", old.name, old.type_expr),
            (ChangeType::TypeChanged, Some(old), Some(new)) => {
                format!("{}: {} → {}", self.field, old.type_expr, new.type_expr)
            }
            (ChangeType::OptionalityChanged, Some(old), Some(new)) => format!(
                "{}: {} → {}",
                self.field,
                crate::diff::optionality_label(old.optional),
                crate::diff::optionality_label(new.optional)
            ),
            _ => self.field.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub total_changes: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub has_breaking_changes: bool,
}

/// Field changes of one declaration relative to a baseline copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub domain: String,
    pub declaration: String,
    pub changes: Vec<FieldChange>,
    pub summary: ChangeSummary,
}

impl ChangeAnalysis {
    pub fn of_type(&self, change_type: ChangeType) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(move |c| c.change_type == change_type)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn has_breaking_changes(&self) -> bool {
        self.summary.has_breaking_changes
    }
}

/// Compare the baseline field list with the current one.
///
/// Removals, type changes and optional → required are breaking; additions
/// and required → optional are not.
pub fn analyze_changes(
    domain: &str,
    declaration: &str,
    baseline: &[FieldDeclaration],
    current: &[FieldDeclaration],
) -> ChangeAnalysis {
    let diff = compare(baseline, current, &MappingRegistry::identity());
    let before: BTreeMap<&str, &FieldDeclaration> = baseline.iter().map(|f| (f.name.as_str(), f)).collect();
    let after: BTreeMap<&str, &FieldDeclaration> = current.iter().map(|f| (f.name.as_str(), f)).collect();
    let pair = |name: &str| (before.get(name).map(|f| (*f).clone()), after.get(name).map(|f| (*f).clone()));

    let mut changes = Vec::new();

    for added in &diff.extra_in_target {
        changes.push(FieldChange {
            field: added.name.clone(),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(added.clone()),
            breaking: false,
        });
    }

    for removed in &diff.missing_in_target {
        changes.push(FieldChange {
            field: removed.field.name.clone(),
            change_type: ChangeType::Removed,
            old_value: Some(removed.field.clone()),
            new_value: None,
            breaking: true,
        });
    }

    for mismatch in &diff.type_mismatches {
        let (old_value, new_value) = pair(&mismatch.target_field);
        changes.push(FieldChange {
            field: mismatch.target_field.clone(),
            change_type: ChangeType::TypeChanged,
            old_value,
            new_value,
            breaking: true,
        });
    }

    for mismatch in &diff.optionality_mismatches {
        let (old_value, new_value) = pair(&mismatch.target_field);
        changes.push(FieldChange {
            field: mismatch.target_field.clone(),
            change_type: ChangeType::OptionalityChanged,
            old_value,
            new_value,
            breaking: mismatch.source_optional && !mismatch.target_optional,
        });
    }

    changes.sort_by(|a, b| a.change_type.cmp(&b.change_type).then_with(|| a.field.cmp(&b.field)));

    let summary = ChangeSummary {
        total_changes: changes.len(),
        added: changes.iter().filter(|c| c.change_type == ChangeType::Added).count(),
        removed: changes.iter().filter(|c| c.change_type == ChangeType::Removed).count(),
        modified: changes
            .iter()
            .filter(|c| matches!(c.change_type, ChangeType::TypeChanged | ChangeType::OptionalityChanged))
            .count(),
        has_breaking_changes: changes.iter().any(|c| c.breaking),
    };

    ChangeAnalysis {
        domain: domain.to_string(),
        declaration: declaration.to_string(),
        changes,
        summary,
    }
}
