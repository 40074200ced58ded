//! Message queries and bulk actions on stored messages.
//!
//! Bulk actions never touch messages owned by someone else: ids that are
//! missing or foreign are skipped without an error.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::unsubscribe::{UnsubscribeError, UnsubscribeExecutor};
use crate::domain::{Category, CategoryId, Credential, Message, MessageId, OwnerId};
use crate::providers::ai::{match_category, InferenceClient, InferenceError};
use crate::providers::email::{MailboxClient, ProviderError};
use crate::storage::{CategoryStore, DatabaseError, MessageStore, OwnerStore};

/// Errors from message queries and bulk actions.
#[derive(Debug, Error)]
pub enum BulkActionError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("owner {0} not found")]
    OwnerNotFound(OwnerId),

    #[error("owner {0} has no usable mailbox credential")]
    MissingCredential(OwnerId),

    #[error("remote mailbox error: {0}")]
    Remote(#[from] ProviderError),

    /// Deleted remotely but still stored locally.
    #[error("{} messages deleted remotely but not locally", .ids.len())]
    Divergence { ids: Vec<MessageId> },

    #[error("store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("bulk action cancelled")]
    Cancelled,
}

/// Result type for message service operations.
pub type Result<T> = std::result::Result<T, BulkActionError>;

/// Action applied to a set of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Archive,
    Read,
    Delete,
    Unsubscribe,
}

impl FromStr for BulkAction {
    type Err = BulkActionError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "archive" => Ok(Self::Archive),
            "read" => Ok(Self::Read),
            "delete" => Ok(Self::Delete),
            "unsubscribe" => Ok(Self::Unsubscribe),
            other => Err(BulkActionError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Archive => "archive",
            Self::Read => "read",
            Self::Delete => "delete",
            Self::Unsubscribe => "unsubscribe",
        })
    }
}

/// A message the action could not be applied to.
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub id: MessageId,
    pub error: String,
}

/// Per-id result of a bulk action.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub action: BulkAction,
    /// Ids the action succeeded for.
    pub succeeded: Vec<MessageId>,
    /// Missing or foreign ids.
    pub skipped: Vec<MessageId>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    fn new(action: BulkAction, skipped: Vec<MessageId>) -> Self {
        Self {
            action,
            succeeded: Vec::new(),
            skipped,
            failed: Vec::new(),
        }
    }

    fn fail(&mut self, id: &MessageId, error: impl ToString) {
        self.failed.push(BulkFailure {
            id: id.clone(),
            error: error.to_string(),
        });
    }
}

/// Stored-message operations for an owner.
pub struct MessageService {
    owners: Arc<dyn OwnerStore>,
    categories: Arc<dyn CategoryStore>,
    messages: Arc<dyn MessageStore>,
    mailbox: Arc<dyn MailboxClient>,
    inference: Arc<dyn InferenceClient>,
    unsubscriber: Arc<UnsubscribeExecutor>,
}

impl MessageService {
    pub fn new(
        owners: Arc<dyn OwnerStore>,
        categories: Arc<dyn CategoryStore>,
        messages: Arc<dyn MessageStore>,
        mailbox: Arc<dyn MailboxClient>,
        inference: Arc<dyn InferenceClient>,
        unsubscriber: Arc<UnsubscribeExecutor>,
    ) -> Self {
        Self {
            owners,
            categories,
            messages,
            mailbox,
            inference,
            unsubscriber,
        }
    }

    /// All stored messages of an owner, oldest first.
    pub async fn list_for_owner(&self, owner_id: &OwnerId) -> Result<Vec<Message>> {
        Ok(self.messages.find_by_owner(owner_id).await?)
    }

    /// An owner's messages in one category, newest first.
    pub async fn list_for_category(
        &self,
        owner_id: &OwnerId,
        category_id: &CategoryId,
    ) -> Result<Vec<Message>> {
        Ok(self.messages.find_by_category(owner_id, category_id).await?)
    }

    /// Classifies arbitrary text against the shared categories.
    pub async fn classify_body(&self, owner_id: &OwnerId, body: &str) -> Result<Category> {
        self.owners
            .find_by_id(owner_id)
            .await?
            .ok_or_else(|| BulkActionError::OwnerNotFound(owner_id.clone()))?;

        let categories = self.categories.find_all().await?;
        if categories.is_empty() {
            return Err(InferenceError::EmptyCategories.into());
        }
        let name = self.inference.classify(body, &categories).await?;
        match_category(&name, &categories)
            .cloned()
            .ok_or(BulkActionError::Inference(InferenceError::EmptyCategories))
    }

    /// Deletes messages remotely, then locally.
    pub async fn delete_messages(
        &self,
        owner_id: &OwnerId,
        ids: &[MessageId],
        cancel: &CancellationToken,
    ) -> Result<BulkReport> {
        self.apply(owner_id, ids, BulkAction::Delete, cancel).await
    }

    /// Parses `action` and applies it. Unknown tags fail before any work.
    pub async fn bulk_action(
        &self,
        owner_id: &OwnerId,
        ids: &[MessageId],
        action: &str,
        cancel: &CancellationToken,
    ) -> Result<BulkReport> {
        let action = action.parse()?;
        self.apply(owner_id, ids, action, cancel).await
    }

    /// Applies `action` to the owner's messages among `ids`.
    pub async fn apply(
        &self,
        owner_id: &OwnerId,
        ids: &[MessageId],
        action: BulkAction,
        cancel: &CancellationToken,
    ) -> Result<BulkReport> {
        let (owned, skipped) = self.owned_messages(owner_id, ids).await?;
        let mut report = BulkReport::new(action, skipped);

        match action {
            BulkAction::Archive | BulkAction::Read => {
                let credential = self.credential(owner_id).await?;
                for mut message in owned {
                    if cancel.is_cancelled() {
                        return Err(BulkActionError::Cancelled);
                    }
                    match self.mirror(&credential, &mut message, action).await {
                        Ok(()) => report.succeeded.push(message.id),
                        Err(e) => {
                            warn!(message_id = %message.id, %action, error = %e, "bulk action failed");
                            report.fail(&message.id, e);
                        }
                    }
                }
            }
            BulkAction::Delete => {
                let credential = self.credential(owner_id).await?;
                report.succeeded = self.delete_owned(&credential, owned, cancel).await?;
            }
            BulkAction::Unsubscribe => {
                for message in owned {
                    match self.unsubscriber.unsubscribe(&message, cancel).await {
                        Ok(_) => report.succeeded.push(message.id),
                        Err(UnsubscribeError::Cancelled) => return Err(BulkActionError::Cancelled),
                        Err(e) => {
                            debug!(message_id = %message.id, error = %e, "unsubscribe skipped");
                            report.fail(&message.id, e);
                        }
                    }
                }
            }
        }

        info!(
            owner_id = %owner_id,
            %action,
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "bulk action finished"
        );
        Ok(report)
    }

    async fn mirror(
        &self,
        credential: &Credential,
        message: &mut Message,
        action: BulkAction,
    ) -> Result<()> {
        if action == BulkAction::Read {
            self.mailbox.mark_read(credential, &message.provider_id).await?;
            return Ok(());
        }

        self.mailbox.archive(credential, &message.provider_id).await?;
        message.archived = true;
        message.updated_at = chrono::Utc::now();
        self.messages.update(message).await?;
        Ok(())
    }

    /// Remote batch delete first; local rows go only if it succeeded.
    async fn delete_owned(
        &self,
        credential: &Credential,
        owned: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>> {
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let provider_ids: Vec<String> = owned.iter().map(|m| m.provider_id.clone()).collect();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BulkActionError::Cancelled),
            deleted = self.mailbox.delete(credential, &provider_ids) => deleted?,
        }

        let mut deleted = Vec::with_capacity(owned.len());
        let mut diverged = Vec::new();
        for message in owned {
            match self.messages.delete(&message.id).await {
                Ok(()) => deleted.push(message.id),
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "local delete failed after remote delete");
                    diverged.push(message.id);
                }
            }
        }

        if diverged.is_empty() {
            Ok(deleted)
        } else {
            Err(BulkActionError::Divergence { ids: diverged })
        }
    }

    async fn owned_messages(
        &self,
        owner_id: &OwnerId,
        ids: &[MessageId],
    ) -> Result<(Vec<Message>, Vec<MessageId>)> {
        let mut owned = Vec::new();
        let mut skipped = Vec::new();
        for id in ids {
            match self.messages.find_by_id(id).await? {
                Some(message) if message.owner_id == *owner_id => owned.push(message),
                _ => {
                    debug!(message_id = %id, owner_id = %owner_id, "skipping missing or foreign message");
                    skipped.push(id.clone());
                }
            }
        }
        Ok((owned, skipped))
    }

    async fn credential(&self, owner_id: &OwnerId) -> Result<Credential> {
        let owner = self
            .owners
            .find_by_id(owner_id)
            .await?
            .ok_or_else(|| BulkActionError::OwnerNotFound(owner_id.clone()))?;
        owner
            .usable_credential()
            .cloned()
            .ok_or_else(|| BulkActionError::MissingCredential(owner_id.clone()))
    }
}
