//! Relational backends sharing one schema and one set of statements
//!
//! The statements are produced per [`Dialect`] from the same templates so the
//! PostgreSQL and SQLite backends stay behaviorally identical. The search
//! predicate is rendered from `condnum_core::matching`, never spelled out by
//! hand.

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use condnum_core::{ConditionError, Probe};

pub(crate) const COL_ID: &str = "id";
pub(crate) const COL_KEY: &str = "attr_key";
pub(crate) const COL_OP: &str = "op";
pub(crate) const COL_VAL: &str = "val";
pub(crate) const COL_LOCK_TIME: &str = "create_lock_time";
pub(crate) const COL_LOCK_COUNT: &str = "create_lock_count";

/// SQL flavor a statement is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Positional bind parameter `n` (1-based)
    pub fn param(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => format!("?{}", n),
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    fn float_type(self) -> &'static str {
        // IEEE-754 binary64 on both sides; NUMERIC would round-trip through decimal
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::Sqlite => "REAL",
        }
    }

    fn timestamp_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "TIMESTAMPTZ",
            // Unix epoch milliseconds
            Dialect::Sqlite => "INTEGER",
        }
    }
}

/// Statements for one table in one dialect
#[derive(Debug, Clone)]
pub struct Statements {
    pub create_table: String,
    pub create_lookup_index: String,
    pub upsert: String,
    pub lock: String,
    pub unlock: String,
    pub delete: String,
}

impl Statements {
    pub fn new(dialect: Dialect, table: &str) -> Self {
        let p = |n| dialect.param(n);
        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    {COL_ID} {id},
                    {COL_KEY} TEXT NOT NULL,
                    {COL_OP} SMALLINT NOT NULL CHECK ({COL_OP} BETWEEN 1 AND 5),
                    {COL_VAL} {float} NOT NULL,
                    {COL_LOCK_TIME} {ts},
                    {COL_LOCK_COUNT} INTEGER NOT NULL DEFAULT 0,
                    UNIQUE ({COL_KEY}, {COL_OP}, {COL_VAL})
                )",
                id = dialect.id_column(),
                float = dialect.float_type(),
                ts = dialect.timestamp_type(),
            ),
            create_lookup_index: format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{COL_KEY}_{COL_ID} ON {table} ({COL_KEY}, {COL_ID})"
            ),
            // The DO UPDATE only fires when the existing row is not locked; a
            // locked duplicate yields no returned row, which maps to Conflict.
            upsert: format!(
                "INSERT INTO {table} ({COL_KEY}, {COL_OP}, {COL_VAL}) VALUES ({p1}, {p2}, {p3})
                 ON CONFLICT ({COL_KEY}, {COL_OP}, {COL_VAL})
                 DO UPDATE SET {COL_KEY} = excluded.{COL_KEY}
                 WHERE {table}.{COL_LOCK_COUNT} < 1
                    OR {table}.{COL_LOCK_TIME} IS NULL
                    OR {table}.{COL_LOCK_TIME} < {p4}
                 RETURNING {COL_ID}",
                p1 = p(1),
                p2 = p(2),
                p3 = p(3),
                p4 = p(4),
            ),
            lock: format!(
                "UPDATE {table}
                 SET {COL_LOCK_TIME} = {p1}, {COL_LOCK_COUNT} = {COL_LOCK_COUNT} + 1
                 WHERE {COL_ID} = {p2}",
                p1 = p(1),
                p2 = p(2),
            ),
            unlock: format!(
                "UPDATE {table}
                 SET {COL_LOCK_COUNT} = {COL_LOCK_COUNT} - 1
                 WHERE {COL_ID} = {p1} AND {COL_LOCK_COUNT} > 0",
                p1 = p(1),
            ),
            delete: format!("DELETE FROM {table} WHERE {COL_ID} = {p1}", p1 = p(1)),
        }
    }
}

/// Render the paged search for `probe`
///
/// Parameters: 1 = cursor id (0 for the first page), 2 = probe key,
/// 3 = probe value, 4 = limit.
pub fn search_statement(dialect: Dialect, table: &str, probe: &Probe<'_>) -> String {
    let value = dialect.param(3);
    let clauses = probe
        .clauses()
        .iter()
        .map(|clause| {
            format!(
                "({COL_OP} = {code} AND {COL_VAL} {cmp} {value})",
                code = clause.op.code(),
                cmp = clause.comparison.sql(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n                    OR ");

    format!(
        "SELECT {COL_ID} FROM {table}
         WHERE {COL_ID} > {p1}
           AND ({COL_KEY} = '' OR {COL_KEY} = {p2})
           AND (
                    {clauses}
           )
         ORDER BY {COL_ID}
         LIMIT {p4}",
        p1 = dialect.param(1),
        p2 = dialect.param(2),
        p4 = dialect.param(4),
    )
}

/// Reject table names that cannot be spliced into a statement verbatim
pub fn validate_table_name(name: &str) -> Result<(), ConditionError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConditionError::internal(format!(
            "invalid table name {:?}: use letters, digits and underscores",
            name
        )))
    }
}

/// Translate a driver error into the storage taxonomy
pub(crate) fn decode_error(err: sqlx::Error) -> ConditionError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ConditionError::conflict(db.message().to_string())
        }
        _ => ConditionError::internal(err.to_string()),
    }
}
