//! Configuration-selected inference backend.

use std::time::Duration;

use async_trait::async_trait;

use super::anthropic::AnthropicProvider;
use super::gemini::GeminiProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiCompatibleProvider;
use super::traits::{CompletionRequest, CompletionResponse, LlmProvider, LlmResult};
use crate::config::{AiProviderKind, AiSettings};

/// One of the supported backends, chosen by [`AiSettings::provider`].
///
/// Callers hold this as an [`LlmProvider`] and never branch on the variant.
pub enum InferenceBackend {
    OpenAi(OpenAiCompatibleProvider),
    DeepSeek(OpenAiCompatibleProvider),
    Gemini(GeminiProvider),
    Anthropic(AnthropicProvider),
    Ollama(OllamaProvider),
}

impl InferenceBackend {
    /// Builds the configured backend.
    pub fn from_settings(settings: &AiSettings) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        let model = settings.model_name();
        let key = settings.api_key.clone();
        let base_url = settings.base_url.clone();

        let backend = match settings.provider {
            AiProviderKind::OpenAi => {
                let mut p = OpenAiCompatibleProvider::openai(key, model).with_client(client);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                Self::OpenAi(p)
            }
            AiProviderKind::DeepSeek => {
                let mut p = OpenAiCompatibleProvider::deepseek(key, model).with_client(client);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                Self::DeepSeek(p)
            }
            AiProviderKind::Gemini => {
                let mut p = GeminiProvider::new(key, model).with_client(client);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                Self::Gemini(p)
            }
            AiProviderKind::Anthropic => {
                let mut p = AnthropicProvider::new(key, model).with_client(client);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                Self::Anthropic(p)
            }
            AiProviderKind::Ollama => {
                let p = match base_url {
                    Some(url) => OllamaProvider::with_url(url, model),
                    None => OllamaProvider::new(model),
                };
                Self::Ollama(p.with_client(client))
            }
        };

        Ok(backend)
    }

    fn as_provider(&self) -> &dyn LlmProvider {
        match self {
            Self::OpenAi(p) | Self::DeepSeek(p) => p,
            Self::Gemini(p) => p,
            Self::Anthropic(p) => p,
            Self::Ollama(p) => p,
        }
    }
}

#[async_trait]
impl LlmProvider for InferenceBackend {
    fn name(&self) -> &str {
        self.as_provider().name()
    }

    fn model(&self) -> &str {
        self.as_provider().model()
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        self.as_provider().complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: AiProviderKind) -> AiSettings {
        AiSettings {
            provider,
            api_key: "key".to_string(),
            ..AiSettings::default()
        }
    }

    #[test]
    fn selects_variant_by_provider() {
        let cases = [
            (AiProviderKind::OpenAi, "openai", "gpt-4o"),
            (AiProviderKind::DeepSeek, "deepseek", "deepseek-chat"),
            (AiProviderKind::Gemini, "gemini", "gemini-2.0-flash-lite"),
            (AiProviderKind::Anthropic, "anthropic", "claude-3-5-haiku-latest"),
            (AiProviderKind::Ollama, "ollama", "llama3.2"),
        ];

        for (kind, name, model) in cases {
            let backend = InferenceBackend::from_settings(&settings(kind)).unwrap();
            assert_eq!(backend.name(), name);
            assert_eq!(backend.model(), model);
        }
    }

    #[tokio::test]
    async fn base_url_override_is_honored() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"},"finish_reason":"stop"}]}"#)
            .create_async()
            .await;

        let mut ai = settings(AiProviderKind::DeepSeek);
        ai.base_url = Some(server.url());
        let backend = InferenceBackend::from_settings(&ai).unwrap();

        let response = backend
            .complete(&CompletionRequest::prompt("ping"))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(response.text, "ok");
    }
}
