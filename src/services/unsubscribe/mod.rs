//! Unsubscribe automation for stored messages.
//!
//! [`UnsubscribeExecutor`] discovers unsubscribe URLs in a message body and
//! tries them in order. Each candidate page is handled by the first strategy
//! that applies: submit its form, follow or submit an unsubscribe-labelled
//! control, or ask the inference client for a [`Directive`].

mod directive;
mod discovery;
mod executor;
mod form;
mod page;

use serde::Serialize;
use thiserror::Error;

use crate::domain::MessageId;
use crate::providers::ai::InferenceError;

pub use directive::{directive_prompt, Directive};
pub use discovery::{discover_links, is_unsubscribe_text, normalize_url};
pub use executor::UnsubscribeExecutor;
pub use form::{fill_form, infer_field_value, FormField, PageForm};
pub use page::{analyze, select_target, PageAction};

/// Errors from unsubscribing one message.
#[derive(Debug, Error)]
pub enum UnsubscribeError {
    /// Nothing to try; no request was made.
    #[error("no unsubscribe links found")]
    NoLinks,

    #[error("all {} unsubscribe candidates failed", .attempts.len())]
    AllCandidatesFailed { attempts: Vec<Attempt> },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unrecognized directive: {0:?}")]
    UnrecognizedDirective(String),

    #[error("no actionable element for selector {0}")]
    ElementNotFound(String),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("unsubscribe cancelled")]
    Cancelled,
}

/// Result type for unsubscribe operations.
pub type Result<T> = std::result::Result<T, UnsubscribeError>;

/// A candidate URL that did not work out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub url: String,
    pub error: String,
}

/// How a candidate page was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The page's form was filled and submitted.
    Form,
    /// An unsubscribe-labelled link was followed.
    Link,
    /// The inference client picked the action.
    Ai,
}

/// A successful unsubscribe.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeReport {
    pub message_id: MessageId,
    pub succeeded_url: String,
    pub strategy: Strategy,
    /// Candidates tried and failed before the successful one.
    pub attempts: Vec<Attempt>,
}
