//! AI/LLM backends and the inference client built on them.
//!
//! # Supported Backends
//!
//! - **OpenAI-compatible**: OpenAI, DeepSeek, and any `/chat/completions` endpoint
//! - **Gemini**: Google's `generateContent` API
//! - **Anthropic**: Claude models via the messages API
//! - **Ollama**: Local inference via Ollama's OpenAI-compatible API
//!
//! [`InferenceBackend`] picks one from configuration; [`LlmInference`] wraps
//! it with the classify/summarize contract the pipeline consumes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mailsift::config::AiSettings;
//! use mailsift::providers::ai::{InferenceBackend, InferenceClient, LlmInference};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = InferenceBackend::from_settings(&AiSettings::default())?;
//! let client = LlmInference::new(Arc::new(backend));
//! let summary = client.summarize("Your order has shipped.").await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod anthropic;
mod backend;
mod gemini;
mod inference;
mod ollama;
mod openai;
mod traits;

pub use anthropic::AnthropicProvider;
pub use backend::InferenceBackend;
pub use gemini::GeminiProvider;
#[cfg(test)]
pub use inference::MockInferenceClient;
pub use inference::{
    classification_prompt, match_category, summary_prompt, InferenceClient, InferenceError,
    InferenceResult, LlmInference,
};
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, LlmResult,
    Message, Role, TokenUsage,
};
