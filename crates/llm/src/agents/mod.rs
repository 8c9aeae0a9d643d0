pub mod data_validator;
pub mod mapping_advisor;
pub mod schema_detector;

// Реэкспорт всех агентов для удобства
pub use data_validator::DataValidatorAgent;
pub use mapping_advisor::MappingAdvisorAgent;
pub use schema_detector::SchemaDetectorAgent;

use anyhow::{anyhow, Result};
use domain::RecordData;
use serde::de::DeserializeOwned;

/// Rows quoted in prompts
pub(crate) const PROMPT_SAMPLE_ROWS: usize = 5;

pub(crate) fn sample_rows_json(rows: &[RecordData]) -> String {
    let sample: Vec<&RecordData> = rows.iter().take(PROMPT_SAMPLE_ROWS).collect();
    serde_json::to_string_pretty(&sample).unwrap_or_else(|_| "[]".to_string())
}

/// Extract the outermost JSON object from a completion and deserialize it
pub(crate) fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T> {
    let cleaned_response = response.trim();

    if let Some(json_start) = cleaned_response.find('{') {
        if let Some(json_end) = cleaned_response.rfind('}') {
            if json_end > json_start {
                let json_str = &cleaned_response[json_start..=json_end];
                return match serde_json::from_str::<T>(json_str) {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        // Попробуем исправить распространенные ошибки JSON
                        let fixed_json = fix_json_format(json_str);
                        serde_json::from_str(&fixed_json)
                            .map_err(|_| anyhow!("Не удалось распарсить ответ LLM: {}", e))
                    }
                };
            }
        }
    }

    Err(anyhow!("Не найден валидный JSON в ответе: {}", response))
}

fn fix_json_format(json_str: &str) -> String {
    json_str
        .replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false")
        .replace(",}", "}")
        .replace(",]", "]")
}
