//! Postgres-backed numbering store.
//!
//! The counter lives in the `configurations` table (one row per key, JSONB
//! payload). Allocation runs in a single transaction:
//!
//! 1. `SET LOCAL lock_timeout` bounds the wait for the row lock
//! 2. `INSERT ... ON CONFLICT DO NOTHING` creates the row with defaults
//! 3. `SELECT ... FOR UPDATE` takes the exclusive row lock
//! 4. document tables are scanned for the highest sequence and exact collisions
//! 5. `UPDATE` writes the new payload, `COMMIT` releases the lock
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | NumberingError |
//! |------------|----------------------|----------------|
//! | Database (lock not available) | `55P03` | `LockTimeout` |
//! | Database (deadlock detected) | `40P01` | `LockTimeout` |
//! | Database (other) | Any other | `StorageUnavailable` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `StorageUnavailable` |
//! | Other | N/A | `StorageUnavailable` |

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use logistiga_numbering::{CounterData, DocumentFamily, DocumentNumber, Prefix};

use super::in_memory::DEFAULT_LOCK_TIMEOUT;
use super::r#trait::{CounterTransaction, NumberingError, NumberingStore};

/// Tables holding the numbered documents of each family (column `numero`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTables {
    devis: String,
    ordre: String,
    facture: String,
    avoir: String,
}

impl Default for DocumentTables {
    fn default() -> Self {
        Self {
            devis: "devis".to_string(),
            ordre: "ordres_travail".to_string(),
            facture: "factures".to_string(),
            avoir: "avoirs".to_string(),
        }
    }
}

impl DocumentTables {
    pub fn table(&self, family: DocumentFamily) -> &str {
        match family {
            DocumentFamily::Devis => &self.devis,
            DocumentFamily::Ordre => &self.ordre,
            DocumentFamily::Facture => &self.facture,
            DocumentFamily::Avoir => &self.avoir,
        }
    }

    /// Point `family` at another table. Table names are interpolated into SQL,
    /// so only `[a-z_][a-z0-9_]*` is accepted.
    pub fn with_table(
        mut self,
        family: DocumentFamily,
        table: impl Into<String>,
    ) -> Result<Self, NumberingError> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(NumberingError::Validation(format!(
                "invalid table name '{table}' for {family}"
            )));
        }
        let slot = match family {
            DocumentFamily::Devis => &mut self.devis,
            DocumentFamily::Ordre => &mut self.ordre,
            DocumentFamily::Facture => &mut self.facture,
            DocumentFamily::Avoir => &mut self.avoir,
        };
        *slot = table;
        Ok(self)
    }
}

/// Postgres-backed numbering store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool (Arc + Send + Sync). Concurrent allocators
/// for the same counter key queue on the row lock, not in this process.
#[derive(Debug, Clone)]
pub struct PostgresNumberingStore {
    pool: Arc<PgPool>,
    tables: DocumentTables,
    lock_timeout: Duration,
}

impl PostgresNumberingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            tables: DocumentTables::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_tables(mut self, tables: DocumentTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Create the counter table and any missing document tables.
    ///
    /// Document tables are normally owned by the document services; the
    /// minimal shape created here is what the numbering queries need.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), NumberingError> {
        let mut statements = vec![
            r#"
            CREATE TABLE IF NOT EXISTS configurations (
                key TEXT PRIMARY KEY,
                data JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
            .to_string(),
        ];
        for family in DocumentFamily::ALL {
            statements.push(format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    numero TEXT NOT NULL UNIQUE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    deleted_at TIMESTAMPTZ
                )
                "#,
                table = self.tables.table(family)
            ));
        }

        for sql in &statements {
            sqlx::query(sql)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NumberingStore for PostgresNumberingStore {
    #[instrument(skip(self), err)]
    async fn begin(&self, key: &str) -> Result<Box<dyn CounterTransaction>, NumberingError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not accept bind parameters; the value is a plain integer.
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO configurations (key, data)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(CounterData::default().to_json())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_counter", e))?
        .rows_affected();

        let row = sqlx::query(
            r#"
            SELECT data
            FROM configurations
            WHERE key = $1
            FOR UPDATE
            "#,
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_counter", e))?;

        let data: Option<JsonValue> = row
            .try_get("data")
            .map_err(|e| NumberingError::CorruptCounter(format!("failed to read data: {e}")))?;

        debug!(counter_key = key, "counter row locked");

        Ok(Box::new(PostgresCounterTransaction {
            tx,
            key: key.to_string(),
            data: data.unwrap_or(JsonValue::Null),
            created: inserted == 1,
            tables: self.tables.clone(),
        }))
    }
}

struct PostgresCounterTransaction {
    tx: Transaction<'static, Postgres>,
    key: String,
    data: JsonValue,
    created: bool,
    tables: DocumentTables,
}

#[async_trait::async_trait]
impl CounterTransaction for PostgresCounterTransaction {
    fn created(&self) -> bool {
        self.created
    }

    async fn counter(&mut self) -> Result<CounterData, NumberingError> {
        CounterData::from_json(&self.data)
            .map_err(|e| NumberingError::CorruptCounter(format!("{}: {}", self.key, e.detail())))
    }

    async fn max_sequence(
        &mut self,
        family: DocumentFamily,
        prefix: &Prefix,
        year: i32,
    ) -> Result<Option<u32>, NumberingError> {
        // Soft-deleted rows are included on purpose: their numbers stay taken.
        let sql = format!(
            r#"
            SELECT MAX(CAST(substring(numero FROM '([0-9]+)$') AS BIGINT)) AS max_sequence
            FROM {table}
            WHERE numero ~ $1
            "#,
            table = self.tables.table(family)
        );

        let row = sqlx::query(&sql)
            .bind(sequence_pattern(prefix, year))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("max_sequence", e))?;

        let max: Option<i64> = row
            .try_get("max_sequence")
            .map_err(|e| NumberingError::StorageUnavailable(format!("failed to read max_sequence: {e}")))?;

        match max {
            None => Ok(None),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| NumberingError::SequenceExhausted { family, year }),
        }
    }

    async fn number_exists(
        &mut self,
        family: DocumentFamily,
        number: &DocumentNumber,
    ) -> Result<bool, NumberingError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE numero = $1) AS taken",
            table = self.tables.table(family)
        );

        let row = sqlx::query(&sql)
            .bind(number.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("number_exists", e))?;

        row.try_get("taken")
            .map_err(|e| NumberingError::StorageUnavailable(format!("failed to read taken: {e}")))
    }

    async fn save_counter(&mut self, data: &CounterData) -> Result<(), NumberingError> {
        let payload = data.to_json();

        sqlx::query(
            r#"
            UPDATE configurations
            SET data = $2, updated_at = NOW()
            WHERE key = $1
            "#,
        )
        .bind(&self.key)
        .bind(&payload)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_counter", e))?;

        self.data = payload;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), NumberingError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

/// Regex matching every number of `prefix`/`year`, padded or not.
///
/// Prefixes are `[A-Z0-9]` only, so they need no escaping. Sequences are
/// capped at 10 digits so the `BIGINT` cast cannot overflow; anything longer
/// is above `u32` anyway and is caught by the exact-match re-check.
fn sequence_pattern(prefix: &Prefix, year: i32) -> String {
    format!("^{}-{}-[0-9]{{1,10}}$", prefix.as_str(), year)
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Map SQLx errors to NumberingError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> NumberingError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // lock_not_available: lock_timeout elapsed
                Some("55P03") => NumberingError::LockTimeout(msg),
                Some("40P01") => NumberingError::LockTimeout(msg),
                _ => NumberingError::StorageUnavailable(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            NumberingError::StorageUnavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            NumberingError::StorageUnavailable(format!("connection pool closed in {operation}"))
        }
        _ => NumberingError::StorageUnavailable(format!("sqlx error in {operation}: {err}")),
    }
}
