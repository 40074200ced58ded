//! Message CRUD operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{from_sql_time, to_sql_time};
use crate::domain::{CategoryId, Message, MessageId, OwnerId};
use crate::storage::database::{Database, DatabaseError, Result};

const MESSAGE_COLUMNS: &str = r#"
    id, owner_id, provider_id, from_address, subject, body, summary,
    category_id, received_at, archived, created_at, updated_at
"#;

/// Inserts a new message.
///
/// Fails with [`DatabaseError::Duplicate`] if the owner already has a
/// message with the same provider id.
pub async fn insert(db: &Database, message: &Message) -> Result<()> {
    let message = message.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO messages (
                id, owner_id, provider_id, from_address, subject, body, summary,
                category_id, received_at, archived, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                message.id.0,
                message.owner_id.0,
                message.provider_id,
                message.from,
                message.subject,
                message.body,
                message.summary,
                message.category_id.as_ref().map(|c| c.0.as_str()),
                to_sql_time(&message.received_at),
                message.archived as i32,
                to_sql_time(&message.created_at),
                to_sql_time(&message.updated_at),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Writes back the mutable fields (classification, archive flag, body).
pub async fn update(db: &Database, message: &Message) -> Result<()> {
    let message = message.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            r#"
            UPDATE messages SET
                from_address = ?2, subject = ?3, body = ?4, summary = ?5,
                category_id = ?6, archived = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                message.id.0,
                message.from,
                message.subject,
                message.body,
                message.summary,
                message.category_id.as_ref().map(|c| c.0.as_str()),
                message.archived as i32,
                to_sql_time(&message.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("message {}", message.id)));
        }
        Ok(())
    })
    .await
}

/// Deletes a message.
pub async fn delete(db: &Database, id: &MessageId) -> Result<()> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [&id.0])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("message {}", id)));
        }
        Ok(())
    })
    .await
}

/// Retrieves a message by local id.
pub async fn get_by_id(db: &Database, id: &MessageId) -> Result<Option<Message>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row([&id.0], row_to_message).optional()?;
        Ok(result)
    })
    .await
}

/// Dedupe lookup by `(owner, provider_id)`.
pub async fn get_by_provider_id(
    db: &Database,
    owner_id: &OwnerId,
    provider_id: &str,
) -> Result<Option<Message>> {
    let owner_id = owner_id.clone();
    let provider_id = provider_id.to_string();

    db.with_conn(move |conn| {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE owner_id = ?1 AND provider_id = ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_row(params![owner_id.0, provider_id], row_to_message)
            .optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all of an owner's messages, oldest received first.
pub async fn get_by_owner(db: &Database, owner_id: &OwnerId) -> Result<Vec<Message>> {
    let owner_id = owner_id.clone();

    db.with_conn(move |conn| {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE owner_id = ?1 ORDER BY received_at, created_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([&owner_id.0], row_to_message)?;
        let messages: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(messages?)
    })
    .await
}

/// Retrieves an owner's messages in one category, newest first.
pub async fn get_by_category(
    db: &Database,
    owner_id: &OwnerId,
    category_id: &CategoryId,
) -> Result<Vec<Message>> {
    let owner_id = owner_id.clone();
    let category_id = category_id.clone();

    db.with_conn(move |conn| {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE owner_id = ?1 AND category_id = ?2
            ORDER BY received_at DESC
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id.0, category_id.0], row_to_message)?;
        let messages: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(messages?)
    })
    .await
}

/// The owner's most recently received message; the sync checkpoint.
///
/// Ties on `received_at` go to the most recently stored row.
pub async fn latest_for_owner(db: &Database, owner_id: &OwnerId) -> Result<Option<Message>> {
    let owner_id = owner_id.clone();

    db.with_conn(move |conn| {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE owner_id = ?1
            ORDER BY received_at DESC, created_at DESC
            LIMIT 1
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row([&owner_id.0], row_to_message).optional()?;
        Ok(result)
    })
    .await
}

fn row_to_message(row: &Row<'_>) -> std::result::Result<Message, rusqlite::Error> {
    let category_id: Option<String> = row.get(7)?;
    let received_at: String = row.get(8)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        owner_id: OwnerId(row.get(1)?),
        provider_id: row.get(2)?,
        from: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        summary: row.get(6)?,
        category_id: category_id.map(CategoryId),
        received_at: from_sql_time(8, &received_at)?,
        archived: row.get::<_, i32>(9)? != 0,
        created_at: from_sql_time(10, &created_at)?,
        updated_at: from_sql_time(11, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Credential, Owner};
    use crate::storage::queries::{categories, owners};
    use chrono::{Duration, TimeZone, Utc};

    async fn setup() -> (Database, Owner) {
        let db = Database::open_in_memory().await.unwrap();
        let owner = Owner::new("g-1", "a@example.com", "A", Credential::new("tok"));
        owners::insert(&db, &owner).await.unwrap();
        (db, owner)
    }

    fn message_at(owner: &Owner, provider_id: &str, secs: i64) -> Message {
        let at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Message::new(owner.id.clone(), provider_id, "x@example.com", "s", "<p>b</p>", at)
    }

    #[tokio::test]
    async fn insert_and_lookup_by_provider_id() {
        let (db, owner) = setup().await;
        let msg = message_at(&owner, "gm-1", 0);
        insert(&db, &msg).await.unwrap();

        let found = get_by_provider_id(&db, &owner.id, "gm-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, msg.id);
        assert_eq!(found.body, "<p>b</p>");
        assert!(!found.archived);
        assert!(get_by_provider_id(&db, &owner.id, "gm-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn same_provider_id_twice_is_duplicate() {
        let (db, owner) = setup().await;
        insert(&db, &message_at(&owner, "gm-1", 0)).await.unwrap();

        let err = insert(&db, &message_at(&owner, "gm-1", 5))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn same_provider_id_for_other_owner_is_fine() {
        let (db, owner) = setup().await;
        let other = Owner::new("g-2", "b@example.com", "B", Credential::new("tok"));
        owners::insert(&db, &other).await.unwrap();

        insert(&db, &message_at(&owner, "gm-1", 0)).await.unwrap();
        insert(&db, &message_at(&other, "gm-1", 0)).await.unwrap();
    }

    #[tokio::test]
    async fn owner_listing_is_oldest_first() {
        let (db, owner) = setup().await;
        insert(&db, &message_at(&owner, "late", 100)).await.unwrap();
        insert(&db, &message_at(&owner, "early", 1)).await.unwrap();

        let ids: Vec<_> = get_by_owner(&db, &owner.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.provider_id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn latest_is_max_received_at() {
        let (db, owner) = setup().await;
        assert!(latest_for_owner(&db, &owner.id).await.unwrap().is_none());

        insert(&db, &message_at(&owner, "a", 10)).await.unwrap();
        insert(&db, &message_at(&owner, "b", 30)).await.unwrap();
        insert(&db, &message_at(&owner, "c", 20)).await.unwrap();

        let latest = latest_for_owner(&db, &owner.id).await.unwrap().unwrap();
        assert_eq!(latest.provider_id, "b");
    }

    #[tokio::test]
    async fn latest_tie_goes_to_newest_row() {
        let (db, owner) = setup().await;
        let first = message_at(&owner, "first", 10);
        let mut second = message_at(&owner, "second", 10);
        second.created_at = first.created_at + Duration::seconds(1);

        insert(&db, &first).await.unwrap();
        insert(&db, &second).await.unwrap();

        let latest = latest_for_owner(&db, &owner.id).await.unwrap().unwrap();
        assert_eq!(latest.provider_id, "second");
    }

    #[tokio::test]
    async fn update_classification_and_filter_by_category() {
        let (db, owner) = setup().await;
        let category = Category::new("Work", "job");
        categories::insert(&db, &category).await.unwrap();

        let mut msg = message_at(&owner, "gm-1", 0);
        insert(&db, &msg).await.unwrap();
        insert(&db, &message_at(&owner, "gm-2", 1)).await.unwrap();

        msg.classify(category.id.clone(), "A summary");
        msg.archived = true;
        update(&db, &msg).await.unwrap();

        let filed = get_by_category(&db, &owner.id, &category.id).await.unwrap();
        assert_eq!(filed.len(), 1);
        assert_eq!(filed[0].summary.as_deref(), Some("A summary"));
        assert!(filed[0].archived);
    }

    #[tokio::test]
    async fn deleting_category_unclassifies_messages() {
        let (db, owner) = setup().await;
        let category = Category::new("Work", "job");
        categories::insert(&db, &category).await.unwrap();

        let mut msg = message_at(&owner, "gm-1", 0);
        msg.classify(category.id.clone(), "s");
        insert(&db, &msg).await.unwrap();

        categories::delete(&db, &category.id).await.unwrap();
        let loaded = get_by_id(&db, &msg.id).await.unwrap().unwrap();
        assert!(loaded.category_id.is_none());
    }

    #[tokio::test]
    async fn delete_removes_and_reports_missing() {
        let (db, owner) = setup().await;
        let msg = message_at(&owner, "gm-1", 0);
        insert(&db, &msg).await.unwrap();

        delete(&db, &msg.id).await.unwrap();
        assert!(get_by_id(&db, &msg.id).await.unwrap().is_none());
        assert!(matches!(
            delete(&db, &msg.id).await,
            Err(DatabaseError::NotFound(_))
        ));
    }
}
