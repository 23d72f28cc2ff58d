use std::collections::BTreeMap;
use thiserror::Error;

use crate::field_mapping::{FieldMapping, ValueTransform};

/// Immutable table of field renames between two adjacent layers.
///
/// Lookups that miss fall back to the field's own name, so an empty
/// registry behaves as the identity mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRegistry {
    forward: BTreeMap<String, FieldMapping>,
    reverse: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Mapping conflict: {field} maps to both {existing} and {conflicting}")]
    Conflict {
        field: String,
        existing: String,
        conflicting: String,
    },

    #[error("Mapping has an empty field name: {0}")]
    EmptyName(String),
}

impl MappingRegistry {
    /// Build a registry, rejecting any name that would resolve two ways
    pub fn new(entries: impl IntoIterator<Item = FieldMapping>) -> Result<Self, MappingError> {
        let mut registry = Self::default();

        for entry in entries {
            if entry.source.trim().is_empty() || entry.target.trim().is_empty() {
                return Err(MappingError::EmptyName(entry.to_string()));
            }

            if let Some(existing) = registry.forward.get(&entry.source) {
                if existing.target != entry.target {
                    return Err(MappingError::Conflict {
                        field: entry.source.clone(),
                        existing: existing.target.clone(),
                        conflicting: entry.target.clone(),
                    });
                }
                continue;
            }

            if let Some(existing) = registry.reverse.get(&entry.target) {
                return Err(MappingError::Conflict {
                    field: entry.target.clone(),
                    existing: existing.clone(),
                    conflicting: entry.source.clone(),
                });
            }

            registry.reverse.insert(entry.target.clone(), entry.source.clone());
            registry.forward.insert(entry.source.clone(), entry);
        }

        Ok(registry)
    }

    /// Registry with no renames; adjacent layers share names
    pub fn identity() -> Self {
        Self::default()
    }

    /// Known DTO → Model renames
    pub fn seeded() -> Self {
        Self::new(seeded_mappings()).expect("seeded mappings are conflict-free")
    }

    /// Expected target-layer name for a source-layer field
    pub fn forward<'a>(&'a self, field: &'a str) -> &'a str {
        self.forward
            .get(field)
            .map(|mapping| mapping.target.as_str())
            .unwrap_or(field)
    }

    /// Expected source-layer name for a target-layer field
    pub fn reverse<'a>(&'a self, field: &'a str) -> &'a str {
        self.reverse.get(field).map(String::as_str).unwrap_or(field)
    }

    /// The rename registered for a source-layer field, if any
    pub fn hint(&self, field: &str) -> Option<&FieldMapping> {
        self.forward.get(field)
    }

    /// Registry that maps in the opposite direction
    pub fn inverse(&self) -> Self {
        let forward = self
            .forward
            .values()
            .map(|mapping| (mapping.target.clone(), mapping.inverted()))
            .collect();
        let reverse = self
            .forward
            .values()
            .map(|mapping| (mapping.source.clone(), mapping.target.clone()))
            .collect();
        Self { forward, reverse }
    }

    /// Entries sorted by source name
    pub fn entries(&self) -> impl Iterator<Item = &FieldMapping> {
        self.forward.values()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Renames observed between backend payloads and domain models
pub fn seeded_mappings() -> Vec<FieldMapping> {
    vec![
        // attachments
        FieldMapping::new("name", "fileName"),
        FieldMapping::new("url", "fileUrl"),
        FieldMapping::new("size", "fileSize"),
        // categories
        FieldMapping::new("isActive", "isPublic"),
        // documents
        FieldMapping::new("createdBy", "authorId"),
        // translations
        FieldMapping::new("description", "content").with_transform(ValueTransform::NullToUndefined),
        // pagination
        FieldMapping::new("limit", "size"),
    ]
}
