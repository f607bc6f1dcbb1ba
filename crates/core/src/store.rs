//! Contract store backed by SQLite.
//!
//! One `contracts` table keyed by a unique `address`. Admission writes go
//! through [`ContractStore::insert_if_absent`], which relies on the
//! uniqueness constraint instead of a read-then-write check, so concurrent
//! admissions of the same address leave exactly one row.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::stream::ContractRecord;

/// Connections kept by a file-backed pool.
const MAX_CONNECTIONS: u32 = 5;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    deposited_amount TEXT NOT NULL,
    withdrawn_amount TEXT NOT NULL,
    amount_per_period TEXT NOT NULL,
    cliff_amount TEXT NOT NULL,
    "start" INTEGER NOT NULL,
    "end" INTEGER NOT NULL,
    cliff INTEGER NOT NULL,
    period INTEGER NOT NULL,
    withdrawal_frequency INTEGER NOT NULL,
    last_withdrawn_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    cancelable_by_sender INTEGER NOT NULL,
    closed INTEGER NOT NULL,
    admitted_at INTEGER NOT NULL
)
"#;

const SELECT_COLUMNS: &str = r#"
    address, name, deposited_amount, withdrawn_amount, amount_per_period,
    cliff_amount, "start", "end", cliff, period, withdrawal_frequency,
    last_withdrawn_at, created_at, cancelable_by_sender, closed, admitted_at
"#;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no contract stored for {0}")]
    NotFound(String),
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same address already exists; nothing was written.
    Duplicate,
}

/// Boxed future returned by [`ContractStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

// =============================================================================
// Trait: ContractStore
// =============================================================================

pub trait ContractStore: Send + Sync + 'static {
    /// Insert `record` unless its address is already stored.
    ///
    /// The stored `admitted_at` is stamped by the store.
    fn insert_if_absent<'a>(
        &'a self,
        record: &'a ContractRecord,
    ) -> StoreFuture<'a, InsertOutcome>;

    /// Overwrite every mutable field of the record stored under `record.address`.
    ///
    /// `admitted_at` is left untouched. Fails with [`StoreError::NotFound`]
    /// when the address is not stored.
    fn update<'a>(&'a self, record: &'a ContractRecord) -> StoreFuture<'a, ()>;

    fn get<'a>(&'a self, address: &'a str) -> StoreFuture<'a, Option<ContractRecord>>;

    /// Every stored record, most recently admitted first.
    fn list_all(&self) -> StoreFuture<'_, Vec<ContractRecord>>;
}

// =============================================================================
// SqliteStore
// =============================================================================

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private in-memory database. Used by tests and dry runs.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // Every connection to `:memory:` is its own database, so pin the pool
        // to a single connection that never expires.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::debug!("Contract store schema ready");
        Ok(Self { pool })
    }

    async fn insert_record(&self, record: &ContractRecord) -> Result<InsertOutcome, StoreError> {
        let admitted_at = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO contracts (
                address, name, deposited_amount, withdrawn_amount, amount_per_period,
                cliff_amount, "start", "end", cliff, period, withdrawal_frequency,
                last_withdrawn_at, created_at, cancelable_by_sender, closed, admitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(address) DO NOTHING
            "#,
        )
        .bind(&record.address)
        .bind(&record.name)
        .bind(&record.deposited_amount)
        .bind(&record.withdrawn_amount)
        .bind(&record.amount_per_period)
        .bind(&record.cliff_amount)
        .bind(record.start)
        .bind(record.end)
        .bind(record.cliff)
        .bind(record.period)
        .bind(record.withdrawal_frequency)
        .bind(record.last_withdrawn_at)
        .bind(record.created_at)
        .bind(record.cancelable_by_sender)
        .bind(record.closed)
        .bind(admitted_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn update_record(&self, record: &ContractRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                name = ?1, deposited_amount = ?2, withdrawn_amount = ?3,
                amount_per_period = ?4, cliff_amount = ?5, "start" = ?6, "end" = ?7,
                cliff = ?8, period = ?9, withdrawal_frequency = ?10,
                last_withdrawn_at = ?11, created_at = ?12,
                cancelable_by_sender = ?13, closed = ?14
            WHERE address = ?15
            "#,
        )
        .bind(&record.name)
        .bind(&record.deposited_amount)
        .bind(&record.withdrawn_amount)
        .bind(&record.amount_per_period)
        .bind(&record.cliff_amount)
        .bind(record.start)
        .bind(record.end)
        .bind(record.cliff)
        .bind(record.period)
        .bind(record.withdrawal_frequency)
        .bind(record.last_withdrawn_at)
        .bind(record.created_at)
        .bind(record.cancelable_by_sender)
        .bind(record.closed)
        .bind(&record.address)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.address.clone()));
        }
        Ok(())
    }

    async fn fetch_one(&self, address: &str) -> Result<Option<ContractRecord>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM contracts WHERE address = ?1");
        let record = sqlx::query_as::<_, ContractRecord>(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn fetch_all(&self) -> Result<Vec<ContractRecord>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM contracts ORDER BY id DESC");
        let records = sqlx::query_as::<_, ContractRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

impl ContractStore for SqliteStore {
    fn insert_if_absent<'a>(
        &'a self,
        record: &'a ContractRecord,
    ) -> StoreFuture<'a, InsertOutcome> {
        Box::pin(self.insert_record(record))
    }

    fn update<'a>(&'a self, record: &'a ContractRecord) -> StoreFuture<'a, ()> {
        Box::pin(self.update_record(record))
    }

    fn get<'a>(&'a self, address: &'a str) -> StoreFuture<'a, Option<ContractRecord>> {
        Box::pin(self.fetch_one(address))
    }

    fn list_all(&self) -> StoreFuture<'_, Vec<ContractRecord>> {
        Box::pin(self.fetch_all())
    }
}

// =============================================================================
// Tests
// =============================================================================
