use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, error, info};

pub mod agents;
pub mod fallback;
pub mod suggester;
pub mod types;

pub use agents::{DataValidatorAgent, MappingAdvisorAgent, SchemaDetectorAgent};
pub use fallback::RuleBasedSuggester;
pub use suggester::{LlmMappingSuggester, MappingSuggester, SuggestionError, SuggestionResult};
pub use types::{DataValidationResult, DetectedField, DetectedSchema, FieldDataType};

/// Anything that turns a prompt into a completion
///
/// Agents depend on this seam rather than on a concrete HTTP client.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn chat_simple(&self, message: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAI { api_key: String, model: String },
    Anthropic { api_key: String, model: String },
    /// Any OpenAI-compatible server (LM Studio, Ollama, vLLM)
    Local { url: String, model: String },
}

// OpenAI API types
#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChatChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIChatChoice {
    message: OpenAIMessage,
}

// Anthropic API types
#[derive(Debug, Serialize, Deserialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    client: reqwest::Client,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            client: reqwest::Client::new(),
            max_tokens: 2000,
            // mapping suggestions should be close to deterministic
            temperature: 0.1,
        }
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Загружаем .env если есть

        let provider_type = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let max_tokens = env::var("MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2000);
        let temperature = env::var("TEMPERATURE")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.1);

        let provider = match provider_type.as_str() {
            "openai" => {
                let api_key = env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY не установлен в .env"))?;
                let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
                LlmProvider::OpenAI { api_key, model }
            }
            "anthropic" => {
                let api_key = env::var("ANTHROPIC_API_KEY")
                    .map_err(|_| anyhow!("ANTHROPIC_API_KEY не установлен в .env"))?;
                let model = env::var("ANTHROPIC_MODEL")
                    .unwrap_or_else(|_| "claude-3-haiku-20240307".to_string());
                LlmProvider::Anthropic { api_key, model }
            }
            "local" => {
                let url = env::var("LOCAL_LLM_URL")
                    .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
                let model = env::var("LOCAL_LLM_MODEL")
                    .unwrap_or_else(|_| "llama-3.2-3b-instruct".to_string());
                LlmProvider::Local { url, model }
            }
            _ => return Err(anyhow!("Неподдерживаемый LLM_PROVIDER: {}", provider_type)),
        };

        Ok(Self::new(provider).with_limits(max_tokens, temperature))
    }

    pub fn provider_name(&self) -> String {
        match &self.provider {
            LlmProvider::OpenAI { model, .. } => format!("OpenAI ({model})"),
            LlmProvider::Anthropic { model, .. } => format!("Anthropic ({model})"),
            LlmProvider::Local { model, .. } => format!("Local ({model})"),
        }
    }

    fn user_message(message: &str) -> Vec<OpenAIMessage> {
        vec![OpenAIMessage {
            role: "user".to_string(),
            content: message.to_string(),
        }]
    }

    async fn openai_compatible_chat(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        model: &str,
        message: &str,
    ) -> Result<String> {
        let request = OpenAIChatRequest {
            model: model.to_string(),
            messages: Self::user_message(message),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        info!(model, endpoint, "sending completion request");
        debug!("Текст запроса: {}", message);

        let mut builder = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "LLM API ошибка: {}", error_text);
            return Err(anyhow!("LLM API ошибка {}: {}", status, error_text));
        }

        let chat_response: OpenAIChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Пустой ответ от {}", self.provider_name()))
    }

    async fn anthropic_chat(&self, api_key: &str, model: &str, message: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            messages: Self::user_message(message),
            temperature: Some(self.temperature),
        };

        info!(model, "sending completion request to Anthropic");

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("Content-Type", "application/json")
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic API ошибка: {}", error_text);
            return Err(anyhow!("Anthropic API ошибка: {}", error_text));
        }

        let chat_response: AnthropicResponse = response.json().await?;
        chat_response
            .content
            .into_iter()
            .next()
            .map(|content| content.text)
            .ok_or_else(|| anyhow!("Пустой ответ от Anthropic"))
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn chat_simple(&self, message: &str) -> Result<String> {
        match &self.provider {
            LlmProvider::OpenAI { api_key, model } => {
                self.openai_compatible_chat(
                    "https://api.openai.com/v1/chat/completions",
                    Some(api_key),
                    model,
                    message,
                )
                .await
            }
            LlmProvider::Anthropic { api_key, model } => {
                self.anthropic_chat(api_key, model, message).await
            }
            LlmProvider::Local { url, model } => {
                // Нормализуем базовый endpoint: убираем завершающее "/" и необязательный "/v1"
                let mut base = url.trim_end_matches('/');
                if let Some(stripped) = base.strip_suffix("/v1") {
                    base = stripped;
                }
                let endpoint = format!("{base}/chat/completions");
                self.openai_compatible_chat(&endpoint, None, model, message).await
            }
        }
    }
}
