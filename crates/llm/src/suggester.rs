use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use common::SuggestionTimeoutConfig;
use domain::{FieldMappings, MappingSuggestion, RecordData};

use crate::agents::{DataValidatorAgent, MappingAdvisorAgent, SchemaDetectorAgent};
use crate::fallback::RuleBasedSuggester;
use crate::types::{DataValidationResult, DetectedSchema};
use crate::CompletionBackend;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    #[error("completion backend failed: {0}")]
    Backend(String),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

pub type SuggestionResult<T> = Result<T, SuggestionError>;

/// Schema detection, mapping suggestions and pre-flight data review
#[async_trait]
pub trait MappingSuggester: Send + Sync {
    async fn detect_schema(&self, rows: &[RecordData]) -> SuggestionResult<DetectedSchema>;

    async fn suggest_mappings(
        &self,
        fields: &[String],
        rows: &[RecordData],
        detected_source: &str,
    ) -> SuggestionResult<Vec<MappingSuggestion>>;

    async fn validate_data(
        &self,
        rows: &[RecordData],
        mappings: &FieldMappings,
    ) -> SuggestionResult<DataValidationResult>;
}

/// LLM-backed suggester that answers from the keyword rules whenever the
/// model is slow, unreachable or returns something unparseable
pub struct LlmMappingSuggester {
    schema_detector: SchemaDetectorAgent,
    mapping_advisor: MappingAdvisorAgent,
    data_validator: DataValidatorAgent,
    timeouts: SuggestionTimeoutConfig,
    fallback: RuleBasedSuggester,
}

impl LlmMappingSuggester {
    pub fn new(llm: Arc<dyn CompletionBackend>, timeouts: SuggestionTimeoutConfig) -> Self {
        Self {
            schema_detector: SchemaDetectorAgent::new(llm.clone()),
            mapping_advisor: MappingAdvisorAgent::new(llm.clone()),
            data_validator: DataValidatorAgent::new(llm),
            timeouts,
            fallback: RuleBasedSuggester::new(),
        }
    }

    async fn bounded<T>(
        operation: &'static str,
        timeout_ms: u64,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> SuggestionResult<T> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let message = e.to_string();
                if message.contains("JSON") || message.contains("распарсить") {
                    Err(SuggestionError::InvalidResponse(message))
                } else {
                    Err(SuggestionError::Backend(message))
                }
            }
            Err(_) => Err(SuggestionError::Timeout {
                operation,
                timeout_ms,
            }),
        }
    }
}

#[async_trait]
impl MappingSuggester for LlmMappingSuggester {
    async fn detect_schema(&self, rows: &[RecordData]) -> SuggestionResult<DetectedSchema> {
        let result = Self::bounded(
            "detect_schema",
            self.timeouts.schema_detection_timeout_ms,
            self.schema_detector.detect_schema(rows),
        )
        .await;

        match result {
            Ok(schema) => {
                info!(source = %schema.detected_source, fields = schema.fields.len(), "schema detected");
                Ok(schema)
            }
            Err(e) => {
                warn!(error = %e, "schema detection fell back to keyword rules");
                Ok(self.fallback.detect(rows))
            }
        }
    }

    async fn suggest_mappings(
        &self,
        fields: &[String],
        rows: &[RecordData],
        detected_source: &str,
    ) -> SuggestionResult<Vec<MappingSuggestion>> {
        let result = Self::bounded(
            "suggest_mappings",
            self.timeouts.suggest_timeout_ms,
            self.mapping_advisor.suggest_mappings(fields, rows, detected_source),
        )
        .await;

        match result {
            Ok(suggestions) if !suggestions.is_empty() || fields.is_empty() => Ok(suggestions),
            Ok(_) => {
                warn!("model returned no mappings, using keyword rules");
                Ok(self.fallback.suggest(fields, detected_source))
            }
            Err(e) => {
                warn!(error = %e, "mapping suggestion fell back to keyword rules");
                Ok(self.fallback.suggest(fields, detected_source))
            }
        }
    }

    async fn validate_data(
        &self,
        rows: &[RecordData],
        mappings: &FieldMappings,
    ) -> SuggestionResult<DataValidationResult> {
        let result = Self::bounded(
            "validate_data",
            self.timeouts.validate_timeout_ms,
            self.data_validator.validate_data(rows, mappings),
        )
        .await;

        match result {
            Ok(review) => Ok(review),
            Err(e) => {
                warn!(error = %e, "data review fell back to keyword rules");
                Ok(self.fallback.check(rows, mappings))
            }
        }
    }
}
