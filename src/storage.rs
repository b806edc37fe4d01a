//! SQLite-backed key-value record store.
//!
//! The store holds one row per record set: a store key such as
//! `medicationReminders_alex@example.com` mapped to a JSON-encoded array.
//! This mirrors the layout the companion UI used in browser local storage,
//! so the persisted shape is a drop-in replacement. Every mutation rewrites
//! the owner's whole set; there are no partial or delta writes.
//!
//! # Concurrency
//!
//! Writes are last-write-wins. Two processes pointed at the same database
//! file are not coordinated; that limitation is accepted, not worked around.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::Error;

/// Build the store key for a record type and owner, e.g.
/// `medicationReminders_alex@example.com`.
pub fn store_key(store_name: &str, owner_id: &str) -> String {
    format!("{store_name}_{owner_id}")
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:pillbox.db"
    ///   or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // A `sqlite::memory:` database exists per connection, so the pool
        // must hold exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS record_sets (
                store_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read the raw JSON value stored under `key`.
    ///
    /// # Returns
    ///
    /// `None` if no value has ever been saved under the key.
    pub async fn read_key(&self, key: &str) -> Result<Option<String>, Error> {
        let row = sqlx::query(
            r#"
            SELECT value FROM record_sets WHERE store_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// Write `value` under `key`, replacing any previous value.
    pub async fn write_key(&self, key: &str, value: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO record_sets (store_key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(store_key) DO UPDATE
            SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete the value stored under `key`. A no-op if the key is absent.
    pub async fn remove_key(&self, key: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            DELETE FROM record_sets WHERE store_key = ?
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
