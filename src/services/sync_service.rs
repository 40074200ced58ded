//! Mailbox synchronization.
//!
//! [`SyncEngine`] runs one sync for one owner: fetch new remote messages
//! after a cursor, drop the ones already stored, classify and summarize the
//! rest concurrently, persist them and archive them remotely.
//!
//! Per-message failures are isolated. Messages that made it through stay
//! persisted even when others failed; the call then returns
//! [`SyncError::Partial`] carrying the full outcome.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{Category, Credential, Message, OwnerId};
use crate::providers::ai::{InferenceClient, InferenceError};
use crate::providers::email::{MailboxClient, ProviderError, RawMessage};
use crate::storage::{CategoryStore, DatabaseError, MessageStore, OwnerStore};

/// Errors from a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("owner {0} not found")]
    OwnerNotFound(OwnerId),

    #[error("owner {0} has no usable mailbox credential")]
    MissingCredential(OwnerId),

    #[error("no categories configured")]
    NoCategories,

    #[error("fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] DatabaseError),

    /// Cancelled mid-run; carries whatever was persisted before the stop.
    #[error("sync cancelled after persisting {} messages", .0.persisted.len())]
    Cancelled(Box<SyncOutcome>),

    /// Some messages failed; the rest were persisted.
    #[error("{} of {} messages failed to process", .0.failures.len(), .0.fetched.len())]
    Partial(Box<SyncOutcome>),
}

impl SyncError {
    /// The outcome of a partially successful or cancelled run.
    pub fn outcome(&self) -> Option<&SyncOutcome> {
        match self {
            SyncError::Partial(outcome) | SyncError::Cancelled(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn into_outcome(self) -> Option<SyncOutcome> {
        match self {
            SyncError::Partial(outcome) | SyncError::Cancelled(outcome) => Some(*outcome),
            _ => None,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// One message that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct MessageFailure {
    pub provider_id: String,
    pub error: String,
}

/// What a sync run saw and did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    /// Everything the mailbox returned after the cursor.
    pub fetched: Vec<RawMessage>,
    /// Messages stored by this call, in completion order.
    pub persisted: Vec<Message>,
    /// Provider ids skipped because they were already stored.
    pub already_stored: Vec<String>,
    pub failures: Vec<MessageFailure>,
}

impl SyncOutcome {
    /// Returns true if every fetched message was stored or already present.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What happened to one fetched message.
enum Processed {
    Persisted(Message),
    AlreadyStored(String),
    Failed(MessageFailure),
}

/// Orchestrates fetch, dedupe, classification and persistence for an owner.
pub struct SyncEngine {
    owners: Arc<dyn OwnerStore>,
    categories: Arc<dyn CategoryStore>,
    messages: Arc<dyn MessageStore>,
    mailbox: Arc<dyn MailboxClient>,
    inference: Arc<dyn InferenceClient>,
    concurrency: usize,
    max_fetch: u32,
}

impl SyncEngine {
    pub fn new(
        owners: Arc<dyn OwnerStore>,
        categories: Arc<dyn CategoryStore>,
        messages: Arc<dyn MessageStore>,
        mailbox: Arc<dyn MailboxClient>,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            owners,
            categories,
            messages,
            mailbox,
            inference,
            concurrency: 8,
            max_fetch: 10,
        }
    }

    /// Caps concurrent per-message processing. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Result-size limit used by [`sync_latest`](Self::sync_latest).
    pub fn with_max_fetch(mut self, max_fetch: u32) -> Self {
        self.max_fetch = max_fetch.max(1);
        self
    }

    /// On-demand sync: resumes from the owner's checkpoint and fetches at
    /// most the configured `max_fetch` messages.
    pub async fn sync_latest(
        &self,
        owner_id: &OwnerId,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let checkpoint = self.checkpoint(owner_id).await?;
        self.sync(owner_id, self.max_fetch, checkpoint.as_deref(), cancel)
            .await
    }

    /// Provider id of the owner's most recently received stored message.
    pub async fn checkpoint(&self, owner_id: &OwnerId) -> Result<Option<String>> {
        Ok(self
            .messages
            .latest_for_owner(owner_id)
            .await?
            .map(|m| m.provider_id))
    }

    /// Runs one sync for `owner_id`.
    ///
    /// Fetches up to `max_results` messages after `after_provider_id` (or the
    /// newest ones if `None`).
    pub async fn sync(
        &self,
        owner_id: &OwnerId,
        max_results: u32,
        after_provider_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let owner = self
            .owners
            .find_by_id(owner_id)
            .await?
            .ok_or_else(|| SyncError::OwnerNotFound(owner_id.clone()))?;
        let credential = owner
            .usable_credential()
            .cloned()
            .ok_or_else(|| SyncError::MissingCredential(owner_id.clone()))?;

        let categories = self.categories.find_all().await?;
        if categories.is_empty() {
            return Err(SyncError::NoCategories);
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled(Box::default())),
            fetched = self.mailbox.list_and_fetch(&credential, max_results, after_provider_id) => fetched?,
        };

        tracing::info!(
            owner_id = %owner_id,
            fetched = fetched.len(),
            cursor = after_provider_id.unwrap_or(""),
            "fetched messages"
        );

        let mut seen = HashSet::new();
        let candidates: Vec<&RawMessage> = fetched
            .iter()
            .filter(|raw| seen.insert(raw.provider_id.as_str()))
            .collect();

        let tasks: Vec<_> = candidates
            .into_iter()
            .map(|raw| self.process(owner_id, &credential, &categories, raw))
            .collect();

        let mut outcome = SyncOutcome::default();
        let cancelled = {
            let work = stream::iter(tasks).buffer_unordered(self.concurrency);
            tokio::pin!(work);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break true,
                    next = work.next() => next,
                };
                match next {
                    Some(Processed::Persisted(message)) => outcome.persisted.push(message),
                    Some(Processed::AlreadyStored(provider_id)) => {
                        outcome.already_stored.push(provider_id)
                    }
                    Some(Processed::Failed(failure)) => outcome.failures.push(failure),
                    None => break false,
                }
            }
        };
        outcome.fetched = fetched;

        if cancelled {
            tracing::warn!(
                owner_id = %owner_id,
                persisted = outcome.persisted.len(),
                "sync cancelled mid-run"
            );
            return Err(SyncError::Cancelled(Box::new(outcome)));
        }

        tracing::info!(
            owner_id = %owner_id,
            persisted = outcome.persisted.len(),
            already_stored = outcome.already_stored.len(),
            failed = outcome.failures.len(),
            "sync finished"
        );

        if outcome.is_success() {
            Ok(outcome)
        } else {
            Err(SyncError::Partial(Box::new(outcome)))
        }
    }

    async fn process(
        &self,
        owner_id: &OwnerId,
        credential: &Credential,
        categories: &[Category],
        raw: &RawMessage,
    ) -> Processed {
        let failed = |error: String| {
            Processed::Failed(MessageFailure {
                provider_id: raw.provider_id.clone(),
                error,
            })
        };

        match self
            .messages
            .find_by_provider_id(owner_id, &raw.provider_id)
            .await
        {
            Ok(Some(_)) => return Processed::AlreadyStored(raw.provider_id.clone()),
            Ok(None) => {}
            Err(e) => return failed(e.to_string()),
        }

        let (category, summary) = match self.classify_and_summarize(&raw.body, categories).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    owner_id = %owner_id,
                    provider_id = %raw.provider_id,
                    error = %e,
                    "inference failed, message not stored"
                );
                return failed(e.to_string());
            }
        };

        let mut message = Message::new(
            owner_id.clone(),
            raw.provider_id.clone(),
            raw.from.clone(),
            raw.subject.clone(),
            raw.body.clone(),
            raw.received_at,
        );
        message.classify(category.id.clone(), summary);

        match self.messages.create(&message).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                tracing::debug!(provider_id = %raw.provider_id, "stored by a concurrent sync");
                return Processed::AlreadyStored(raw.provider_id.clone());
            }
            Err(e) => return failed(e.to_string()),
        }

        match self.mailbox.archive(credential, &raw.provider_id).await {
            Ok(()) => {
                message.archived = true;
                if let Err(e) = self.messages.update(&message).await {
                    tracing::warn!(
                        provider_id = %raw.provider_id,
                        error = %e,
                        "failed to record archive flag"
                    );
                    message.archived = false;
                }
            }
            Err(e) => {
                tracing::warn!(
                    owner_id = %owner_id,
                    provider_id = %raw.provider_id,
                    error = %e,
                    "remote archive failed, keeping local copy"
                );
            }
        }

        Processed::Persisted(message)
    }

    async fn classify_and_summarize<'a>(
        &self,
        body: &str,
        categories: &'a [Category],
    ) -> std::result::Result<(&'a Category, String), InferenceError> {
        let (name, summary) = tokio::try_join!(
            self.inference.classify(body, categories),
            self.inference.summarize(body),
        )?;

        let category = categories
            .iter()
            .find(|c| c.name == name)
            .or_else(|| categories.first())
            .ok_or(InferenceError::EmptyCategories)?;
        Ok((category, summary))
    }
}
