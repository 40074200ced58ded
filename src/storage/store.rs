//! Store traits consumed by the services, and their SQLite implementation.

use async_trait::async_trait;

use super::database::{Database, Result};
use super::queries::{categories, messages, owners};
use crate::domain::{Category, CategoryId, Message, MessageId, Owner, OwnerId};

/// Owner records and their mailbox credentials.
#[async_trait]
pub trait OwnerStore: Send + Sync {
    async fn find_by_id(&self, id: &OwnerId) -> Result<Option<Owner>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Owner>>;
    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<Owner>>;
    async fn create(&self, owner: &Owner) -> Result<()>;
    /// Persists changed profile fields or refreshed tokens.
    async fn update(&self, owner: &Owner) -> Result<()>;
    async fn list_all(&self) -> Result<Vec<Owner>>;
}

/// The shared category set.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// All categories, creation order.
    async fn find_all(&self) -> Result<Vec<Category>>;
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>>;
    async fn create(&self, category: &Category) -> Result<()>;
    async fn update(&self, category: &Category) -> Result<()>;
    async fn delete(&self, id: &CategoryId) -> Result<()>;
}

/// Stored messages.
///
/// Implementations must reject a second message with the same
/// `(owner_id, provider_id)` with [`DatabaseError::Duplicate`], atomically.
///
/// [`DatabaseError::Duplicate`]: super::DatabaseError::Duplicate
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: &Message) -> Result<()>;
    async fn update(&self, message: &Message) -> Result<()>;
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>>;
    async fn find_by_provider_id(
        &self,
        owner_id: &OwnerId,
        provider_id: &str,
    ) -> Result<Option<Message>>;
    /// Oldest received first.
    async fn find_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Message>>;
    async fn find_by_category(
        &self,
        owner_id: &OwnerId,
        category_id: &CategoryId,
    ) -> Result<Vec<Message>>;
    async fn delete(&self, id: &MessageId) -> Result<()>;
    /// The most recently received message, if any.
    async fn latest_for_owner(&self, owner_id: &OwnerId) -> Result<Option<Message>>;
}

/// All three stores over one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl OwnerStore for SqliteStore {
    async fn find_by_id(&self, id: &OwnerId) -> Result<Option<Owner>> {
        owners::get_by_id(&self.db, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Owner>> {
        owners::get_by_email(&self.db, email).await
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<Owner>> {
        owners::get_by_google_id(&self.db, google_id).await
    }

    async fn create(&self, owner: &Owner) -> Result<()> {
        owners::insert(&self.db, owner).await
    }

    async fn update(&self, owner: &Owner) -> Result<()> {
        owners::update(&self.db, owner).await
    }

    async fn list_all(&self) -> Result<Vec<Owner>> {
        owners::get_all(&self.db).await
    }
}

#[async_trait]
impl CategoryStore for SqliteStore {
    async fn find_all(&self) -> Result<Vec<Category>> {
        categories::get_all(&self.db).await
    }

    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>> {
        categories::get_by_id(&self.db, id).await
    }

    async fn create(&self, category: &Category) -> Result<()> {
        categories::insert(&self.db, category).await
    }

    async fn update(&self, category: &Category) -> Result<()> {
        categories::update(&self.db, category).await
    }

    async fn delete(&self, id: &CategoryId) -> Result<()> {
        categories::delete(&self.db, id).await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(&self, message: &Message) -> Result<()> {
        messages::insert(&self.db, message).await
    }

    async fn update(&self, message: &Message) -> Result<()> {
        messages::update(&self.db, message).await
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>> {
        messages::get_by_id(&self.db, id).await
    }

    async fn find_by_provider_id(
        &self,
        owner_id: &OwnerId,
        provider_id: &str,
    ) -> Result<Option<Message>> {
        messages::get_by_provider_id(&self.db, owner_id, provider_id).await
    }

    async fn find_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Message>> {
        messages::get_by_owner(&self.db, owner_id).await
    }

    async fn find_by_category(
        &self,
        owner_id: &OwnerId,
        category_id: &CategoryId,
    ) -> Result<Vec<Message>> {
        messages::get_by_category(&self.db, owner_id, category_id).await
    }

    async fn delete(&self, id: &MessageId) -> Result<()> {
        messages::delete(&self.db, id).await
    }

    async fn latest_for_owner(&self, owner_id: &OwnerId) -> Result<Option<Message>> {
        messages::latest_for_owner(&self.db, owner_id).await
    }
}
