//! Management of the shared classification categories.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::domain::{default_category_seeds, Category, CategoryId, CategorySeed};
use crate::storage::{CategoryStore, DatabaseError};

/// Errors from category management.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("category name must not be blank")]
    BlankName,

    #[error("category {0} not found")]
    NotFound(CategoryId),

    #[error("failed to read category seeds: {0}")]
    SeedRead(#[from] std::io::Error),

    #[error("invalid category seeds: {0}")]
    SeedParse(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type for category operations.
pub type Result<T> = std::result::Result<T, CategoryError>;

/// CRUD and seeding for categories.
pub struct CategoryService {
    store: Arc<dyn CategoryStore>,
}

impl CategoryService {
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, name: &str, description: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CategoryError::BlankName);
        }
        let category = Category::new(name, description.trim());
        self.store.create(&category).await?;
        Ok(category)
    }

    pub async fn get(&self, id: &CategoryId) -> Result<Category> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| CategoryError::NotFound(id.clone()))
    }

    pub async fn list(&self) -> Result<Vec<Category>> {
        Ok(self.store.find_all().await?)
    }

    /// Applies the non-blank fields of the update.
    pub async fn update(&self, id: &CategoryId, name: &str, description: &str) -> Result<Category> {
        let mut category = self.get(id).await?;
        if !name.trim().is_empty() {
            category.name = name.trim().to_string();
        }
        if !description.trim().is_empty() {
            category.description = description.trim().to_string();
        }
        category.updated_at = Utc::now();
        self.store.update(&category).await?;
        Ok(category)
    }

    pub async fn delete(&self, id: &CategoryId) -> Result<()> {
        self.store.delete(id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => CategoryError::NotFound(id.clone()),
            other => other.into(),
        })
    }

    /// Inserts `seeds` if no category exists yet. Returns how many were added.
    pub async fn seed_defaults(&self, seeds: Vec<CategorySeed>) -> Result<usize> {
        if !self.store.find_all().await?.is_empty() {
            return Ok(0);
        }

        let mut added = 0;
        for seed in seeds.into_iter().filter(|s| !s.name.trim().is_empty()) {
            self.store.create(&Category::from(seed)).await?;
            added += 1;
        }
        info!(added, "seeded default categories");
        Ok(added)
    }

    /// Seeds from a JSON file, or the built-in list when `path` is `None`.
    pub async fn seed_from(&self, path: Option<&Path>) -> Result<usize> {
        let seeds = match path {
            Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
            None => default_category_seeds(),
        };
        self.seed_defaults(seeds).await
    }
}
