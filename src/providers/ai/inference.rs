//! Message classification and summarization on top of an [`LlmProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::traits::{CompletionRequest, LlmError, LlmProvider};
use crate::domain::Category;

/// Output cap for summaries.
const SUMMARY_MAX_TOKENS: usize = 150;

/// Output cap for classification; the answer is a single category name.
const CLASSIFY_MAX_TOKENS: usize = 20;

/// Errors from the inference client.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Classification was requested against an empty label set.
    #[error("no categories to classify against")]
    EmptyCategories,

    /// The backend failed; not retried here.
    #[error("inference failed: {0}")]
    Backend(#[from] LlmError),
}

pub type InferenceResult<T> = Result<T, InferenceError>;

/// Classification and summarization contract, independent of the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Picks one of `categories` for the message body and returns its exact
    /// name as it appears in `categories`.
    async fn classify(&self, body: &str, categories: &[Category]) -> InferenceResult<String>;

    /// Produces a short summary of the message body.
    async fn summarize(&self, body: &str) -> InferenceResult<String>;

    /// Free-form completion of a prepared prompt.
    async fn ask(&self, prompt: &str) -> InferenceResult<String>;
}

/// [`InferenceClient`] backed by any [`LlmProvider`].
pub struct LlmInference {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl LlmInference {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Name of the backend in use, for logging.
    pub fn backend_name(&self) -> &str {
        self.provider.name()
    }

    async fn run(&self, request: CompletionRequest) -> InferenceResult<String> {
        let request = request.with_temperature(self.temperature);
        let response = self.provider.complete(&request).await?;
        Ok(response.text.trim().to_string())
    }
}

#[async_trait]
impl InferenceClient for LlmInference {
    async fn classify(&self, body: &str, categories: &[Category]) -> InferenceResult<String> {
        if categories.is_empty() {
            return Err(InferenceError::EmptyCategories);
        }

        let request = CompletionRequest::prompt(classification_prompt(body, categories))
            .with_max_tokens(CLASSIFY_MAX_TOKENS);
        let answer = self.run(request).await?;

        let chosen = match_category(&answer, categories)
            .map(|c| c.name.clone())
            .ok_or(InferenceError::EmptyCategories)?;

        tracing::debug!(
            backend = self.provider.name(),
            answer = %answer,
            chosen = %chosen,
            "classified message"
        );
        Ok(chosen)
    }

    async fn summarize(&self, body: &str) -> InferenceResult<String> {
        let request = CompletionRequest::prompt(summary_prompt(body))
            .with_max_tokens(SUMMARY_MAX_TOKENS);
        self.run(request).await
    }

    async fn ask(&self, prompt: &str) -> InferenceResult<String> {
        self.run(CompletionRequest::prompt(prompt)).await
    }
}

/// Builds the classification prompt: every category with its description,
/// then the body, then the answer-format instruction.
pub fn classification_prompt(body: &str, categories: &[Category]) -> String {
    let listing = categories
        .iter()
        .map(|c| format!("Category: {}\nCategory Description: {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Classify the following email into one of these categories:\n\n{listing}\n\n\
         Email content:\n{body}\n\n\
         Please respond with only the exact category name that best fits the email. \
         It must be one of the categories listed above."
    )
}

pub fn summary_prompt(body: &str) -> String {
    format!("Summarize the following email in 2-3 sentences: {body}")
}

/// Maps free-form model output onto a known category.
///
/// Exact case-insensitive match wins, then containment in either direction,
/// then the first category. Returns `None` only for an empty slice.
pub fn match_category<'a>(answer: &str, categories: &'a [Category]) -> Option<&'a Category> {
    let answer = answer.trim().to_lowercase();
    let normalized = |c: &Category| c.name.trim().to_lowercase();

    categories
        .iter()
        .find(|c| normalized(c) == answer)
        .or_else(|| {
            categories.iter().find(|c| {
                let name = normalized(c);
                answer.contains(&name) || name.contains(&answer)
            })
        })
        .or_else(|| categories.first())
}
