use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use domain::{target_fields, MappingSuggestion, RecordData, ResourceKind};

use super::{parse_json_response, sample_rows_json};
use crate::CompletionBackend;

#[derive(Debug, Deserialize)]
struct AdvisorResponse {
    mappings: Vec<RawSuggestion>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(alias = "sourceField")]
    source_field: String,
    #[serde(default, alias = "suggestedMapping", alias = "target_field")]
    suggested_mapping: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Агент для подбора соответствия полей
pub struct MappingAdvisorAgent {
    llm: Arc<dyn CompletionBackend>,
}

impl MappingAdvisorAgent {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self { llm }
    }

    pub async fn suggest_mappings(
        &self,
        fields: &[String],
        rows: &[RecordData],
        detected_source: &str,
    ) -> Result<Vec<MappingSuggestion>> {
        let catalogue = ResourceKind::ALL
            .iter()
            .map(|kind| format!("- {}: {}", kind.plural(), target_fields(*kind).join(", ")))
            .collect::<Vec<_>>()
            .join("\n");
        let fields_list = fields.join(", ");
        let sample = sample_rows_json(rows);

        let prompt = format!(
            r#"You map columns of a {detected_source} POS export onto a fixed e-commerce schema.

SOURCE COLUMNS: {fields_list}

TARGET FIELDS:
{catalogue}

SAMPLE ROWS:
{sample}

RULES:
- Every source column appears exactly once
- Use an empty suggested_mapping when no target field fits
- Never map two columns to the same target field
- Confidence is an integer from 0 to 100

Answer ONLY with JSON:
{{
    "mappings": [
        {{"source_field": "Item Name", "suggested_mapping": "title", "confidence": 95, "reasoning": "product display name"}}
    ]
}}"#
        );

        let response = self.llm.chat_simple(&prompt).await?;
        let parsed: AdvisorResponse = parse_json_response(&response)?;
        Ok(normalize(parsed.mappings, fields))
    }
}

/// Drop unknown source columns and unknown targets, normalise confidence to 0..=100
fn normalize(raw: Vec<RawSuggestion>, fields: &[String]) -> Vec<MappingSuggestion> {
    let known_targets: HashSet<&str> = ResourceKind::ALL
        .iter()
        .flat_map(|kind| target_fields(*kind).iter().copied())
        .collect();
    let requested: HashSet<&str> = fields.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    raw.into_iter()
        .filter(|s| requested.contains(s.source_field.as_str()))
        .filter(|s| seen.insert(s.source_field.clone()))
        .map(|s| {
            let target = s.suggested_mapping.unwrap_or_default();
            let known = known_targets.contains(target.as_str());
            let confidence = if s.confidence <= 1.0 { s.confidence * 100.0 } else { s.confidence };
            MappingSuggestion {
                source_field: s.source_field,
                suggested_mapping: if known { target } else { String::new() },
                confidence: if known { confidence.round().clamp(0.0, 100.0) as u8 } else { 0 },
                reasoning: s.reasoning,
            }
        })
        .collect()
}
