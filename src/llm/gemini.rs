use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::llm::client::{
    MessageOptions, ModelCallError, ModelCallErrorKind, ModelClient, ModelResponse,
};
use crate::llm::http::{build_http_client, read_json, transport_error, with_retry};
use crate::validator::ResponseSchema;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Gemini `generateContent` client returning `application/json` output.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: ProviderConfig,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ModelCallError> {
        Ok(Self {
            http: build_http_client(&config)?,
            config,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate_once(
        &self,
        payload: &GenerateContentRequest,
        options: &MessageOptions,
    ) -> Result<ModelResponse, ModelCallError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.config.model
        );

        let mut request = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.config.api_key.as_str())
            .json(payload);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        let res = request.send().await.map_err(transport_error)?;
        let body: GenerateContentResponse = read_json(res).await?;

        let text = body
            .candidates
            .ok_or_else(|| other("No candidates returned"))?
            .into_iter()
            .next()
            .ok_or_else(|| other("Empty candidates list"))?
            .content
            .parts
            .into_iter()
            .find_map(|p| p.text)
            .ok_or_else(|| other("Model returned non-text content"))?;

        let (input_tokens, output_tokens) = body
            .usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();
        debug!(
            "Gemini call succeeded: input_tokens={}, output_tokens={}",
            input_tokens, output_tokens
        );

        Ok(ModelResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn call_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
        options: &MessageOptions,
    ) -> Result<ModelResponse, ModelCallError> {
        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: options.max_tokens,
                response_mime_type: "application/json".to_string(),
                response_schema: Some(openapi_schema(&schema.json_schema)),
            },
        };

        with_retry(
            self.name(),
            self.config.max_retries,
            self.config.initial_backoff,
            || self.generate_once(&payload, options),
        )
        .await
    }
}

fn other(message: &str) -> ModelCallError {
    ModelCallError::new(ModelCallErrorKind::Other, message)
}

/// Gemini accepts an OpenAPI subset: no draft marker, title or closed-object flags.
fn openapi_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "$schema" | "title" | "additionalProperties"))
                .map(|(k, v)| (k.clone(), openapi_schema(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(openapi_schema).collect()),
        other => other.clone(),
    }
}
