//! Mailbox owner and provider credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// OAuth credentials for the owner's mailbox.
///
/// Acquired by the auth collaborator; the pipeline only reads them, apart
/// from writing back refreshed tokens.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: String::new(),
            expires_at: None,
        }
    }

    /// A credential with a blank access token cannot authorize any call.
    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// Returns true if the token expiry is known and in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The authenticated mailbox holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub credential: Credential,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Owner {
    /// Creates an owner with a fresh id.
    pub fn new(
        google_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        credential: Credential,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OwnerId::generate(),
            google_id: google_id.into(),
            email: email.into(),
            name: name.into(),
            credential,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the credential if it can authorize mailbox calls.
    pub fn usable_credential(&self) -> Option<&Credential> {
        Some(&self.credential).filter(|c| c.is_usable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn blank_token_is_not_usable() {
        let owner = Owner::new("g-1", "a@example.com", "A", Credential::new("  "));
        assert!(owner.usable_credential().is_none());

        let owner = Owner::new("g-1", "a@example.com", "A", Credential::new("tok"));
        assert!(owner.usable_credential().is_some());
    }

    #[test]
    fn expiry_check() {
        let now = Utc::now();
        let mut cred = Credential::new("tok");
        assert!(!cred.is_expired(now));

        cred.expires_at = Some(now - Duration::seconds(1));
        assert!(cred.is_expired(now));
    }

    #[test]
    fn debug_redacts_tokens() {
        let cred = Credential::new("secret-token");
        let dbg = format!("{:?}", cred);
        assert!(!dbg.contains("secret-token"));
    }
}
