//! Ollama backend.
//!
//! Ollama exposes an OpenAI-compatible API, so this wraps
//! [`OpenAiCompatibleProvider`] with local defaults and no API key.

use async_trait::async_trait;

use super::openai::OpenAiCompatibleProvider;
use super::traits::{CompletionRequest, CompletionResponse, LlmProvider, LlmResult};

/// Default Ollama API URL.
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434/v1";

/// Backend for a local Ollama server.
pub struct OllamaProvider {
    inner: OpenAiCompatibleProvider,
}

impl OllamaProvider {
    /// Creates a backend against the default localhost URL.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_url(OLLAMA_DEFAULT_URL, model)
    }

    pub fn with_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            inner: OpenAiCompatibleProvider::custom(base_url, None, model).named("ollama"),
        }
    }

    /// Overrides the HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.inner = self.inner.with_client(client);
        self
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        self.inner.complete(request).await
    }
}
