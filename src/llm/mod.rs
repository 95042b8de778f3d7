pub mod client;
pub mod prompts;

#[cfg(any(feature = "anthropic", feature = "gemini"))]
mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "gemini")]
pub mod gemini;

pub use client::*;
pub use prompts::{build_analysis_prompt, build_evaluation_prompt};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicClient;
#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;
