//! Persistence for owners, categories and messages.
//!
//! - SQLite database wrapped for async use via `tokio::task::spawn_blocking`
//! - Free query functions per table in [`queries`]
//! - [`OwnerStore`], [`CategoryStore`] and [`MessageStore`] traits, all
//!   implemented by [`SqliteStore`]

mod database;
pub mod queries;
mod schema;
mod store;

pub use database::{Database, DatabaseError, Result};
pub use store::{CategoryStore, MessageStore, OwnerStore, SqliteStore};
