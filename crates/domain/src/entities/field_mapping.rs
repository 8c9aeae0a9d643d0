//! FieldMapping - association from a source column to a target schema field

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::errors::{DomainError, DomainResult};

/// One source → target association with the suggester's confidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    /// Empty string means the source field is intentionally unmapped
    #[serde(default)]
    pub target_field: String,
    /// 0..=100
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub reasoning: String,
}

impl FieldMapping {
    pub fn new(source_field: impl Into<String>, target_field: impl Into<String>, confidence: u8) -> Self {
        Self {
            source_field: source_field.into(),
            target_field: target_field.into(),
            confidence,
            reasoning: String::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Whether this mapping writes into the target schema
    pub fn is_mapped(&self) -> bool {
        !self.target_field.trim().is_empty()
    }
}

/// Candidate mapping returned by the suggestion collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub source_field: String,
    pub suggested_mapping: String,
    pub confidence: u8,
    #[serde(default)]
    pub reasoning: String,
}

impl From<MappingSuggestion> for FieldMapping {
    fn from(suggestion: MappingSuggestion) -> Self {
        Self {
            source_field: suggestion.source_field,
            target_field: suggestion.suggested_mapping,
            confidence: suggestion.confidence.min(100),
            reasoning: suggestion.reasoning,
        }
    }
}

/// Validated mapping set, read-only once a migration starts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldMapping>", into = "Vec<FieldMapping>")]
pub struct FieldMappings {
    mappings: Vec<FieldMapping>,
}

impl FieldMappings {
    /// Build a mapping set, rejecting duplicate source fields and
    /// out-of-range confidence values
    pub fn new(mappings: Vec<FieldMapping>) -> DomainResult<Self> {
        let mut seen = HashSet::new();
        for mapping in &mappings {
            if !seen.insert(mapping.source_field.as_str()) {
                return Err(DomainError::DuplicateSourceField(mapping.source_field.clone()));
            }
            if mapping.confidence > 100 {
                return Err(DomainError::InvalidConfidence {
                    field: mapping.source_field.clone(),
                    value: mapping.confidence as u32,
                });
            }
        }
        Ok(Self { mappings })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.mappings.iter()
    }

    /// Mappings with a non-empty target field
    pub fn active(&self) -> impl Iterator<Item = &FieldMapping> {
        self.mappings.iter().filter(|m| m.is_mapped())
    }

    pub fn get(&self, source_field: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.source_field == source_field)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Target fields claimed by more than one source field.
    /// Not an error: surfaced as a validation warning.
    pub fn duplicate_targets(&self) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for mapping in self.active() {
            *counts.entry(mapping.target_field.as_str()).or_default() += 1;
        }
        let mut duplicates: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(target, _)| target.to_string())
            .collect();
        duplicates.sort();
        duplicates
    }
}

impl TryFrom<Vec<FieldMapping>> for FieldMappings {
    type Error = DomainError;

    fn try_from(mappings: Vec<FieldMapping>) -> Result<Self, Self::Error> {
        Self::new(mappings)
    }
}

impl From<FieldMappings> for Vec<FieldMapping> {
    fn from(mappings: FieldMappings) -> Self {
        mappings.mappings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_source_field_rejected() {
        let result = FieldMappings::new(vec![
            FieldMapping::new("item_name", "title", 90),
            FieldMapping::new("item_name", "description", 40),
        ]);
        assert_eq!(
            result,
            Err(DomainError::DuplicateSourceField("item_name".to_string()))
        );
    }

    #[test]
    fn test_duplicate_targets_are_warnings() {
        let mappings = FieldMappings::new(vec![
            FieldMapping::new("name", "title", 90),
            FieldMapping::new("display_name", "title", 60),
            FieldMapping::new("notes", "", 0),
            FieldMapping::new("cost", "price", 80),
        ])
        .expect("duplicate targets are allowed");

        assert_eq!(mappings.duplicate_targets(), vec!["title".to_string()]);
        assert_eq!(mappings.active().count(), 3);
    }

    #[test]
    fn test_deserialization_validates() {
        let json = r#"[{"source_field":"a","target_field":"title"},{"source_field":"a","target_field":"sku"}]"#;
        let parsed: Result<FieldMappings, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_suggestion_conversion_clamps_confidence() {
        let mapping: FieldMapping = MappingSuggestion {
            source_field: "qty".to_string(),
            suggested_mapping: "inventory_quantity".to_string(),
            confidence: 250,
            reasoning: "stock column".to_string(),
        }
        .into();
        assert_eq!(mapping.confidence, 100);
        assert!(mapping.is_mapped());
    }
}
