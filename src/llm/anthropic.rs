use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::llm::client::{
    MessageOptions, ModelCallError, ModelCallErrorKind, ModelClient, ModelResponse,
};
use crate::llm::http::{build_http_client, read_json, transport_error, with_retry};
use crate::validator::ResponseSchema;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
    output_config: Value,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic Messages API client requesting JSON-schema constrained output.
#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    config: ProviderConfig,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ModelCallError> {
        Ok(Self {
            http: build_http_client(&config)?,
            config,
            base_url: ANTHROPIC_API_URL.to_string(),
        })
    }

    /// Points the client at a different endpoint, e.g. a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send_once(
        &self,
        body: &MessagesRequest<'_>,
        options: &MessageOptions,
    ) -> Result<ModelResponse, ModelCallError> {
        let mut request = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let res = request.send().await.map_err(transport_error)?;
        let parsed: MessagesResponse = read_json(res).await?;

        let text = parsed
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
            .ok_or_else(|| {
                ModelCallError::new(ModelCallErrorKind::Other, "response had no text content")
            })?;

        debug!(
            "Anthropic call succeeded: input_tokens={}, output_tokens={}",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );

        Ok(ModelResponse {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn call_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
        options: &MessageOptions,
    ) -> Result<ModelResponse, ModelCallError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            output_config: json!({
                "format": {
                    "type": "json_schema",
                    "schema": strict_schema(&schema.json_schema),
                }
            }),
        };

        with_retry(
            self.name(),
            self.config.max_retries,
            self.config.initial_backoff,
            || self.send_once(&body, options),
        )
        .await
    }
}

/// Structured outputs require closed objects and reject the draft/title metadata.
fn strict_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        if object.get("type").and_then(Value::as_str) == Some("object") {
            object.insert("additionalProperties".to_string(), Value::Bool(false));
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AnalysisResult;
    use crate::validator::StructuredOutput;

    #[test]
    fn test_strict_schema_closes_root_object() {
        let schema = strict_schema(&AnalysisResult::response_schema().json_schema);
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
        assert!(schema["properties"]["certainty"].is_object());
    }
}
