//! Mailbox client trait definition.
//!
//! [`MailboxClient`] abstracts the remote mail provider. The sync engine,
//! bulk actions and scheduler only talk to the mailbox through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Credential;

/// Result type alias for mailbox operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mailbox operations.
///
/// Any of these coming out of [`MailboxClient::list_and_fetch`] means the
/// fetch failed as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed, credentials expired or were never provided.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-specific error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Well-known remote label identifiers.
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const UNREAD: &str = "UNREAD";
}

/// A message as fetched from the remote mailbox, body already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Identifier assigned by the provider.
    pub provider_id: String,
    pub from: String,
    pub subject: String,
    /// Canonical HTML body; empty if nothing could be decoded.
    pub body: String,
    /// Set when some part of the body failed to decode.
    pub body_degraded: bool,
    pub received_at: DateTime<Utc>,
}

/// Operations the pipeline needs from a remote mailbox.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Lists up to `max_results` messages and fetches each in full.
    ///
    /// With a cursor, everything up to and including the message bearing
    /// `after_provider_id` is skipped; if that id is not in the listed page,
    /// the result is empty. Order is the provider's listing order.
    async fn list_and_fetch(
        &self,
        credential: &Credential,
        max_results: u32,
        after_provider_id: Option<&str>,
    ) -> Result<Vec<RawMessage>>;

    /// Adds and removes labels on one remote message.
    async fn mutate_state(
        &self,
        credential: &Credential,
        provider_id: &str,
        add_labels: &[&str],
        remove_labels: &[&str],
    ) -> Result<()>;

    /// Permanently deletes remote messages. Fails as a whole.
    async fn delete(&self, credential: &Credential, provider_ids: &[String]) -> Result<()>;

    /// Removes a message from the inbox and marks it read.
    async fn archive(&self, credential: &Credential, provider_id: &str) -> Result<()> {
        self.mutate_state(credential, provider_id, &[], &[labels::INBOX, labels::UNREAD])
            .await
    }

    /// Marks a message read, leaving it in the inbox.
    async fn mark_read(&self, credential: &Credential, provider_id: &str) -> Result<()> {
        self.mutate_state(credential, provider_id, &[], &[labels::UNREAD])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailbox {
        mutations: Mutex<Vec<(String, Vec<String>, Vec<String>)>>,
    }

    #[async_trait]
    impl MailboxClient for RecordingMailbox {
        async fn list_and_fetch(
            &self,
            _credential: &Credential,
            _max_results: u32,
            _after_provider_id: Option<&str>,
        ) -> Result<Vec<RawMessage>> {
            Ok(vec![])
        }

        async fn mutate_state(
            &self,
            _credential: &Credential,
            provider_id: &str,
            add_labels: &[&str],
            remove_labels: &[&str],
        ) -> Result<()> {
            self.mutations.lock().unwrap().push((
                provider_id.to_string(),
                add_labels.iter().map(|s| s.to_string()).collect(),
                remove_labels.iter().map(|s| s.to_string()).collect(),
            ));
            Ok(())
        }

        async fn delete(&self, _credential: &Credential, _provider_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn archive_removes_inbox_and_unread() {
        let mailbox = RecordingMailbox::default();
        mailbox.archive(&Credential::new("t"), "gm-1").await.unwrap();

        let calls = mailbox.mutations.lock().unwrap();
        assert_eq!(calls[0].0, "gm-1");
        assert!(calls[0].1.is_empty());
        assert_eq!(calls[0].2, vec!["INBOX", "UNREAD"]);
    }

    #[tokio::test]
    async fn mark_read_removes_unread_only() {
        let mailbox = RecordingMailbox::default();
        mailbox.mark_read(&Credential::new("t"), "gm-2").await.unwrap();

        let calls = mailbox.mutations.lock().unwrap();
        assert_eq!(calls[0].2, vec!["UNREAD"]);
    }

    #[test]
    fn provider_error_messages() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(3),
        };
        assert!(err.to_string().contains("rate limit"));
        assert_eq!(
            ProviderError::Authentication("expired".into()).to_string(),
            "authentication failed: expired"
        );
    }
}
