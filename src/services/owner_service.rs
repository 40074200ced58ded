//! Owner lookup and credential bookkeeping.
//!
//! Tokens are acquired elsewhere; this service only records them.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::{Credential, Owner, OwnerId};
use crate::storage::{DatabaseError, OwnerStore, Result};

pub struct OwnerService {
    store: Arc<dyn OwnerStore>,
}

impl OwnerService {
    pub fn new(store: Arc<dyn OwnerStore>) -> Self {
        Self { store }
    }

    /// Returns the owner with this Google id, creating it on first login.
    ///
    /// An existing owner gets the new credential and profile fields.
    pub async fn get_or_create(
        &self,
        google_id: &str,
        email: &str,
        name: &str,
        credential: Credential,
    ) -> Result<Owner> {
        if let Some(mut owner) = self.store.find_by_google_id(google_id).await? {
            owner.email = email.to_string();
            owner.name = name.to_string();
            owner.credential = credential;
            owner.updated_at = Utc::now();
            self.store.update(&owner).await?;
            return Ok(owner);
        }

        let owner = Owner::new(google_id, email, name, credential);
        match self.store.create(&owner).await {
            Ok(()) => {
                info!(owner_id = %owner.id, "created owner");
                Ok(owner)
            }
            // Lost a race with a concurrent login.
            Err(e) if e.is_duplicate() => self
                .store
                .find_by_google_id(google_id)
                .await?
                .ok_or(e),
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: &OwnerId) -> Result<Option<Owner>> {
        self.store.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Owner>> {
        self.store.find_by_email(email).await
    }

    /// Stores a refreshed credential.
    pub async fn refresh_credentials(&self, id: &OwnerId, credential: Credential) -> Result<Owner> {
        let mut owner = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("owner {id}")))?;
        owner.credential = credential;
        owner.updated_at = Utc::now();
        self.store.update(&owner).await?;
        Ok(owner)
    }
}
