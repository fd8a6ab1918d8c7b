//! SQLite storage backend
//!
//! Shares the relational schema and statements with the PostgreSQL backend.
//! Lock timestamps are stored as Unix epoch milliseconds.

use super::{decode_error, search_statement, validate_table_name, Dialect, Statements};
use crate::config::StorageConfig;
use crate::memory::to_chrono;
use crate::traits::ConditionStorage;
use async_trait::async_trait;
use chrono::Utc;
use condnum_core::condition::expiry_cutoff;
use condnum_core::{check_threshold, ConditionError, ConditionId, ConditionResult, Op, Probe};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// SQLite condition store
pub struct SqliteStorage {
    pool: SqlitePool,
    table: String,
    statements: Statements,
    create_lock_ttl: chrono::Duration,
}

impl SqliteStorage {
    /// Open the database at `config.uri`, creating the file and schema if missing
    pub async fn connect(config: &StorageConfig) -> ConditionResult<Self> {
        let options = SqliteConnectOptions::from_str(config.connection_uri())
            .map_err(decode_error)?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own empty
        // database, so the pool must hold exactly one long-lived connection.
        let in_memory = is_in_memory(config.connection_uri());
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.connection.max)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(decode_error)?;

        let storage = Self::with_pool(pool, &config.table.name, config.create_lock_ttl())?;
        storage.ensure_schema().await?;
        tracing::info!(
            "SQLite condition storage ready at '{}', table '{}'",
            config.connection_uri(),
            storage.table
        );
        Ok(storage)
    }

    /// Wrap an existing pool; the schema is not touched
    pub fn with_pool(
        pool: SqlitePool,
        table: &str,
        create_lock_ttl: Duration,
    ) -> ConditionResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            statements: Statements::new(Dialect::Sqlite, table),
            create_lock_ttl: to_chrono(create_lock_ttl),
        })
    }

    /// Create the table and lookup index if missing
    pub async fn ensure_schema(&self) -> ConditionResult<()> {
        sqlx::query(&self.statements.create_table)
            .execute(&self.pool)
            .await
            .map_err(decode_error)?;
        sqlx::query(&self.statements.create_lookup_index)
            .execute(&self.pool)
            .await
            .map_err(decode_error)?;
        Ok(())
    }
}

fn is_in_memory(uri: &str) -> bool {
    uri.contains(":memory:") || uri.contains("mode=memory")
}

#[async_trait]
impl ConditionStorage for SqliteStorage {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        check_threshold(value)?;
        let cutoff = expiry_cutoff(Utc::now(), self.create_lock_ttl).timestamp_millis();
        let row = sqlx::query(&self.statements.upsert)
            .bind(key)
            .bind(op.code())
            .bind(value)
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await
            .map_err(decode_error)?;

        match row {
            Some(row) => {
                let seq: i64 = row.try_get(0).map_err(decode_error)?;
                ConditionId::from_i64(seq)
                    .ok_or_else(|| ConditionError::internal(format!("negative id {}", seq)))
            }
            None => Err(ConditionError::conflict(format!(
                "key={}, op={}, val={}: create is locked",
                key, op, value
            ))),
        }
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        let seq = id
            .as_i64()
            .ok_or_else(|| ConditionError::not_found(format!("id={}", id)))?;
        let result = sqlx::query(&self.statements.lock)
            .bind(Utc::now().timestamp_millis())
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(decode_error)?;
        if result.rows_affected() < 1 {
            return Err(ConditionError::not_found(format!("id={}", id)));
        }
        Ok(())
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        let Some(seq) = id.as_i64() else {
            return Ok(());
        };
        sqlx::query(&self.statements.unlock)
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(decode_error)?;
        Ok(())
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        let Some(seq) = id.as_i64() else {
            return Ok(());
        };
        sqlx::query(&self.statements.delete)
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(decode_error)?;
        Ok(())
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        let probe = Probe::new(key, value);
        if !probe.is_satisfiable() {
            return Ok(Vec::new());
        }
        let after = match cursor {
            None => 0,
            Some(c) => match c.as_i64() {
                Some(seq) => seq,
                // Past every id a backend can assign
                None => return Ok(Vec::new()),
            },
        };
        let sql = search_statement(Dialect::Sqlite, &self.table, &probe);
        let rows = sqlx::query(&sql)
            .bind(after)
            .bind(key)
            .bind(value)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(decode_error)?;

        rows.iter()
            .map(|row| {
                let seq: i64 = row.try_get(0).map_err(decode_error)?;
                ConditionId::from_i64(seq)
                    .ok_or_else(|| ConditionError::internal(format!("negative id {}", seq)))
            })
            .collect()
    }

    async fn close(&self) -> ConditionResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
