use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validator::ResponseSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCallErrorKind {
    Timeout,
    Auth,
    RateLimit,
    Other,
}

impl fmt::Display for ModelCallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelCallErrorKind::Timeout => "timeout",
            ModelCallErrorKind::Auth => "auth",
            ModelCallErrorKind::RateLimit => "rate limit",
            ModelCallErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct ModelCallError {
    pub kind: ModelCallErrorKind,
    pub message: String,
    /// HTTP status the provider answered with, when there was one.
    pub status: Option<u16>,
}

impl ModelCallError {
    pub fn new(kind: ModelCallErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Maps an HTTP status from a provider onto the error kinds the pipeline knows.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ModelCallErrorKind::Auth,
            408 | 504 => ModelCallErrorKind::Timeout,
            429 => ModelCallErrorKind::RateLimit,
            _ => ModelCallErrorKind::Other,
        };
        Self {
            status: Some(status),
            ..Self::new(kind, format!("status {}: {}", status, body.into()))
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_some_and(|s| (500..600).contains(&s))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ModelCallErrorKind::RateLimit | ModelCallErrorKind::Timeout
        )
    }
}

/// Per-call knobs. Providers fall back to their own defaults for anything unset.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 1.0,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// The single capability the pipeline needs from a language model provider.
///
/// Implementations own transport, authentication and retries. They return the raw text
/// the model produced for `schema`; validation happens on the caller's side.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    async fn call_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
        options: &MessageOptions,
    ) -> Result<ModelResponse, ModelCallError>;
}

#[async_trait]
impl<C: ModelClient + ?Sized> ModelClient for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn call_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
        options: &MessageOptions,
    ) -> Result<ModelResponse, ModelCallError> {
        (**self).call_structured(prompt, schema, options).await
    }
}
