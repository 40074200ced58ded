//! Category CRUD operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{from_sql_time, to_sql_time};
use crate::domain::{Category, CategoryId};
use crate::storage::database::{Database, DatabaseError, Result};

/// Inserts a new category.
pub async fn insert(db: &Database, category: &Category) -> Result<()> {
    let category = category.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO categories (id, name, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                category.id.0,
                category.name,
                category.description,
                to_sql_time(&category.created_at),
                to_sql_time(&category.updated_at),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Updates name and description.
pub async fn update(db: &Database, category: &Category) -> Result<()> {
    let category = category.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "UPDATE categories SET name = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                category.id.0,
                category.name,
                category.description,
                to_sql_time(&category.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("category {}", category.id)));
        }
        Ok(())
    })
    .await
}

/// Deletes a category. Messages filed under it become unclassified.
pub async fn delete(db: &Database, id: &CategoryId) -> Result<()> {
    let id = id.clone();

    db.transaction(move |tx| {
        tx.execute(
            "UPDATE messages SET category_id = NULL WHERE category_id = ?1",
            [&id.0],
        )?;
        let changed = tx.execute("DELETE FROM categories WHERE id = ?1", [&id.0])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("category {}", id)));
        }
        Ok(())
    })
    .await
}

/// Retrieves a category by id.
pub async fn get_by_id(db: &Database, id: &CategoryId) -> Result<Option<Category>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = ?1",
        )?;
        let result = stmt.query_row([&id.0], row_to_category).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all categories in creation order, name as tiebreaker.
pub async fn get_all(db: &Database) -> Result<Vec<Category>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM categories
            ORDER BY created_at, name
            "#,
        )?;
        let rows = stmt.query_map([], row_to_category)?;
        let categories: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(categories?)
    })
    .await
}

fn row_to_category(row: &Row<'_>) -> std::result::Result<Category, rusqlite::Error> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;

    Ok(Category {
        id: CategoryId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: from_sql_time(3, &created_at)?,
        updated_at: from_sql_time(4, &updated_at)?,
    })
}
