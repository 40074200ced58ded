//! SQL schema definitions as const strings.

/// SQL to create the owners table.
pub const CREATE_OWNERS: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    id TEXT PRIMARY KEY,
    google_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    access_token TEXT NOT NULL DEFAULT '',
    refresh_token TEXT NOT NULL DEFAULT '',
    token_expires_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub const CREATE_OWNER_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_owners_email ON owners(email)
"#;

/// SQL to create the categories table. Categories are shared by all owners.
pub const CREATE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the messages table.
///
/// `(owner_id, provider_id)` is the dedupe key for sync; concurrent inserts
/// of the same pair fail here.
pub const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
    provider_id TEXT NOT NULL,
    from_address TEXT NOT NULL DEFAULT '',
    subject TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    summary TEXT,
    category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
    received_at TEXT NOT NULL,
    archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (owner_id, provider_id)
)
"#;

pub const CREATE_MESSAGE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_owner_received ON messages(owner_id, received_at DESC);
CREATE INDEX IF NOT EXISTS idx_messages_category ON messages(category_id)
"#;

/// Returns all migrations in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_OWNERS,
        CREATE_OWNER_INDEXES,
        CREATE_CATEGORIES,
        CREATE_MESSAGES,
        CREATE_MESSAGE_INDEXES,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_migrations_returns_statements() {
        assert_eq!(all_migrations().len(), 5);
    }

    #[test]
    fn messages_dedupe_key_is_unique() {
        assert!(CREATE_MESSAGES.contains("UNIQUE (owner_id, provider_id)"));
        assert!(CREATE_MESSAGES.contains("REFERENCES owners(id)"));
    }

    #[test]
    fn indexes_use_if_not_exists() {
        assert!(CREATE_OWNER_INDEXES.contains("IF NOT EXISTS"));
        assert!(CREATE_MESSAGE_INDEXES.contains("IF NOT EXISTS"));
    }
}
