//! Stored message domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CategoryId, MessageId, OwnerId};

/// A message synced from the owner's remote mailbox.
///
/// `(owner_id, provider_id)` is unique across the store and is the dedupe key
/// used by sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Local identifier.
    pub id: MessageId,
    /// Owner of the mailbox this message came from.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    /// Identifier assigned by the remote mailbox.
    #[serde(rename = "gmail_id")]
    pub provider_id: String,
    /// Raw `From` header value.
    pub from: String,
    pub subject: String,
    /// Canonical HTML body.
    pub body: String,
    /// AI summary, set once classified.
    pub summary: Option<String>,
    /// Assigned category, set once classified.
    pub category_id: Option<CategoryId>,
    pub received_at: DateTime<Utc>,
    /// Whether the message was archived in the remote mailbox.
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Creates an unclassified message with a fresh local id.
    pub fn new(
        owner_id: OwnerId,
        provider_id: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::generate(),
            owner_id,
            provider_id: provider_id.into(),
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
            summary: None,
            category_id: None,
            received_at,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once both summary and category are set.
    pub fn is_classified(&self) -> bool {
        self.summary.is_some() && self.category_id.is_some()
    }

    /// Applies classification results.
    pub fn classify(&mut self, category_id: CategoryId, summary: impl Into<String>) {
        self.category_id = Some(category_id);
        self.summary = Some(summary.into());
        self.updated_at = Utc::now();
    }
}
