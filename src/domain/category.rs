//! Shared classification categories.
//!
//! Categories are global rather than per-owner. Their names form the label
//! space the inference client chooses from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CategoryId;

/// A classification label with a human description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Description handed to the model alongside the name.
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Creates a category with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CategoryId::generate(),
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Seed entry as it appears in a categories JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<CategorySeed> for Category {
    fn from(seed: CategorySeed) -> Self {
        Category::new(seed.name, seed.description)
    }
}

const DEFAULT_CATEGORIES_JSON: &str = r#"[
  {"name": "Work", "description": "Messages about work projects, meetings, colleagues and clients."},
  {"name": "Personal", "description": "Messages from friends and family or about personal matters."},
  {"name": "Newsletters", "description": "Recurring publications, digests and blog updates."},
  {"name": "Promotions", "description": "Marketing, sales, discounts and product announcements."},
  {"name": "Finance", "description": "Receipts, invoices, bank statements and payment notices."},
  {"name": "Social", "description": "Notifications from social networks and community sites."}
]"#;

/// Returns the built-in category seeds.
pub fn default_category_seeds() -> Vec<CategorySeed> {
    serde_json::from_str(DEFAULT_CATEGORIES_JSON).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_seeds_parse() {
        let seeds = default_category_seeds();
        assert_eq!(seeds.len(), 6);
        assert_eq!(seeds[0].name, "Work");
        assert!(!seeds[0].description.is_empty());
    }

    #[test]
    fn seed_without_description_defaults_empty() {
        let seeds: Vec<CategorySeed> = serde_json::from_str(r#"[{"name": "Misc"}]"#).unwrap();
        let category: Category = seeds[0].clone().into();
        assert_eq!(category.name, "Misc");
        assert_eq!(category.description, "");
    }
}
