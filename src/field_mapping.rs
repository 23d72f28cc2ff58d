use serde::{Deserialize, Serialize};
use std::fmt;

/// A known rename between two adjacent layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<ValueTransform>,
}

/// Value conversion an adapter performs alongside the rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    /// `dto.x ?? undefined`
    NullToUndefined,
    /// `model.x ?? null`
    UndefinedToNull,
    StringToNumber,
    NumberToString,
    /// ISO string to date object
    StringToDate,
    DateToString,
    /// Free-form note for conversions without a named variant
    Custom(String),
}

impl ValueTransform {
    /// The conversion applied when mapping in the opposite direction
    pub fn inverted(&self) -> ValueTransform {
        match self {
            ValueTransform::NullToUndefined => ValueTransform::UndefinedToNull,
            ValueTransform::UndefinedToNull => ValueTransform::NullToUndefined,
            ValueTransform::StringToNumber => ValueTransform::NumberToString,
            ValueTransform::NumberToString => ValueTransform::StringToNumber,
            ValueTransform::StringToDate => ValueTransform::DateToString,
            ValueTransform::DateToString => ValueTransform::StringToDate,
            // free text describes both directions
            ValueTransform::Custom(note) => ValueTransform::Custom(note.clone()),
        }
    }
}

impl fmt::Display for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueTransform::NullToUndefined => f.write_str("null → undefined"),
            ValueTransform::UndefinedToNull => f.write_str("undefined → null"),
            ValueTransform::StringToNumber => f.write_str("string → number"),
            ValueTransform::NumberToString => f.write_str("number → string"),
            ValueTransform::StringToDate => f.write_str("string → Date"),
            ValueTransform::DateToString => f.write_str("Date → string"),
            ValueTransform::Custom(note) => f.write_str(note),
        }
    }
}

impl FieldMapping {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Same rename read from the target side
    pub fn inverted(&self) -> FieldMapping {
        FieldMapping {
            source: self.target.clone(),
            target: self.source.clone(),
            transform: self.transform.as_ref().map(ValueTransform::inverted),
        }
    }

    /// Text shown next to a missing field, e.g. `content (null → undefined)`
    pub fn hint(&self) -> String {
        match &self.transform {
            Some(transform) => format!("{} ({})", self.target, transform),
            None => self.target.clone(),
        }
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_mapping_creation() {
        let mapping = FieldMapping::new("isActive", "isPublic");

        assert_eq!(mapping.source, "isActive");
        assert_eq!(mapping.target, "isPublic");
        assert!(mapping.transform.is_none());
        assert_eq!(mapping.to_string(), "isActive→isPublic");
    }

    #[test]
    fn test_inverted_mapping_swaps_transform() {
        let mapping = FieldMapping::new("description", "content")
            .with_transform(ValueTransform::NullToUndefined);
        let inverted = mapping.inverted();

        assert_eq!(inverted.source, "content");
        assert_eq!(inverted.target, "description");
        assert_eq!(inverted.transform, Some(ValueTransform::UndefinedToNull));
        assert_eq!(inverted.inverted(), mapping);
    }

    #[test]
    fn test_hint_text() {
        let plain = FieldMapping::new("createdBy", "authorId");
        assert_eq!(plain.hint(), "authorId");

        let noted = FieldMapping::new("description", "content")
            .with_transform(ValueTransform::NullToUndefined);
        assert_eq!(noted.hint(), "content (null → undefined)");
    }

    /// Config documents reach serde as JSON values after schema validation
    fn from_yaml(text: &str) -> FieldMapping {
        let value: serde_json::Value = serde_yaml::from_str(text).unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_transform_deserializes_from_yaml() {
        let mapping = from_yaml(
            r#"
            source: price
            target: amount
            transform: string_to_number
            "#,
        );
        assert_eq!(mapping.transform, Some(ValueTransform::StringToNumber));

        let custom = from_yaml(
            r#"
            source: tags
            target: labels
            transform:
              custom: "csv string → string[]"
            "#,
        );
        assert_eq!(custom.transform, Some(ValueTransform::Custom("csv string → string[]".to_string())));
    }

    #[test]
    fn test_custom_transform_inverts_to_itself() {
        let note = ValueTransform::Custom("parse ISO date".to_string());
        assert_eq!(note.inverted(), note);
        assert_eq!(note.inverted().inverted(), note);
    }
}
