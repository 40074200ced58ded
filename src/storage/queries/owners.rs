//! Owner CRUD operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{from_sql_time, to_sql_time};
use crate::domain::{Credential, Owner, OwnerId};
use crate::storage::database::{Database, DatabaseError, Result};

const OWNER_COLUMNS: &str = r#"
    id, google_id, email, name, access_token, refresh_token,
    token_expires_at, created_at, updated_at
"#;

/// Inserts a new owner.
pub async fn insert(db: &Database, owner: &Owner) -> Result<()> {
    let owner = owner.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO owners (
                id, google_id, email, name, access_token, refresh_token,
                token_expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                owner.id.0,
                owner.google_id,
                owner.email,
                owner.name,
                owner.credential.access_token,
                owner.credential.refresh_token,
                owner.credential.expires_at.as_ref().map(to_sql_time),
                to_sql_time(&owner.created_at),
                to_sql_time(&owner.updated_at),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Overwrites an owner's profile and credentials.
pub async fn update(db: &Database, owner: &Owner) -> Result<()> {
    let owner = owner.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            r#"
            UPDATE owners SET
                google_id = ?2, email = ?3, name = ?4, access_token = ?5,
                refresh_token = ?6, token_expires_at = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                owner.id.0,
                owner.google_id,
                owner.email,
                owner.name,
                owner.credential.access_token,
                owner.credential.refresh_token,
                owner.credential.expires_at.as_ref().map(to_sql_time),
                to_sql_time(&owner.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("owner {}", owner.id)));
        }
        Ok(())
    })
    .await
}

/// Retrieves an owner by id.
pub async fn get_by_id(db: &Database, id: &OwnerId) -> Result<Option<Owner>> {
    find_one(db, "id", id.0.clone()).await
}

/// Retrieves an owner by email address.
pub async fn get_by_email(db: &Database, email: &str) -> Result<Option<Owner>> {
    find_one(db, "email", email.to_string()).await
}

/// Retrieves an owner by Google account id.
pub async fn get_by_google_id(db: &Database, google_id: &str) -> Result<Option<Owner>> {
    find_one(db, "google_id", google_id.to_string()).await
}

async fn find_one(db: &Database, column: &'static str, value: String) -> Result<Option<Owner>> {
    db.with_conn(move |conn| {
        let sql = format!("SELECT {OWNER_COLUMNS} FROM owners WHERE {column} = ?1 LIMIT 1");
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row([&value], row_to_owner).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all owners, oldest first.
pub async fn get_all(db: &Database) -> Result<Vec<Owner>> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {OWNER_COLUMNS} FROM owners ORDER BY created_at, email");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_owner)?;
        let owners: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(owners?)
    })
    .await
}

fn row_to_owner(row: &Row<'_>) -> std::result::Result<Owner, rusqlite::Error> {
    let expires_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Owner {
        id: OwnerId(row.get(0)?),
        google_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        credential: Credential {
            access_token: row.get(4)?,
            refresh_token: row.get(5)?,
            expires_at: expires_at
                .as_deref()
                .map(|s| from_sql_time(6, s))
                .transpose()?,
        },
        created_at: from_sql_time(7, &created_at)?,
        updated_at: from_sql_time(8, &updated_at)?,
    })
}
