//! PostgreSQL storage backend

use super::{decode_error, search_statement, validate_table_name, Dialect, Statements};
use crate::config::StorageConfig;
use crate::memory::to_chrono;
use crate::traits::ConditionStorage;
use async_trait::async_trait;
use chrono::Utc;
use condnum_core::condition::expiry_cutoff;
use condnum_core::{check_threshold, ConditionError, ConditionId, ConditionResult, Op, Probe};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// PostgreSQL condition store
///
/// Records live in a single table with a `UNIQUE (attr_key, op, val)`
/// constraint; `create` is a single `INSERT .. ON CONFLICT .. DO UPDATE ..
/// WHERE <unlocked> RETURNING id` statement, so concurrent creates of the same
/// triple converge on one row.
pub struct PostgresStorage {
    pool: PgPool,
    table: String,
    statements: Statements,
    create_lock_ttl: chrono::Duration,
}

impl PostgresStorage {
    /// Connect using `config`, then ensure the table and indices exist
    pub async fn connect(config: &StorageConfig) -> ConditionResult<Self> {
        let mut options = PgConnectOptions::from_str(config.connection_uri()).map_err(decode_error)?;
        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if config.tls.enabled {
            options = options.ssl_mode(if config.tls.insecure {
                PgSslMode::Require
            } else {
                PgSslMode::VerifyFull
            });
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.connection.max)
            .connect_with(options)
            .await
            .map_err(decode_error)?;

        if config.table.shard {
            tracing::warn!(
                "table sharding requested for '{}'; distribution is left to the database cluster",
                config.table.name
            );
        }

        let storage = Self::with_pool(pool, &config.table.name, config.create_lock_ttl())?;
        storage.ensure_schema().await?;
        tracing::info!("PostgreSQL condition storage ready, table '{}'", storage.table);
        Ok(storage)
    }

    /// Wrap an existing pool; the schema is not touched
    pub fn with_pool(pool: PgPool, table: &str, create_lock_ttl: Duration) -> ConditionResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            statements: Statements::new(Dialect::Postgres, table),
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

    /// Drop the table (test cleanup)
    pub async fn drop_table(&self) -> ConditionResult<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
            .execute(&self.pool)
            .await
            .map_err(decode_error)?;
        Ok(())
    }
}

#[async_trait]
impl ConditionStorage for PostgresStorage {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        check_threshold(value)?;
        let cutoff = expiry_cutoff(Utc::now(), self.create_lock_ttl);
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
            .bind(Utc::now())
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
        let sql = search_statement(Dialect::Postgres, &self.table, &probe);
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
