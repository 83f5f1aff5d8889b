//! SQLite persistence for trading history
//!
//! Rows are unique per `(user_id, signature)`. Sync inserts pending rows;
//! enrichment upserts the priced/valued columns onto the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::types::{EnrichedTransactionRecord, PendingRecord, TransactionType};

/// Persistence collaborator for the enrichment pipeline.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update the enriched row matched on `(user_id, signature)`.
    ///
    /// Normally the row already exists from sync and keeps its `amount` and
    /// `timestamp`. Without one, a fallback row is inserted with `amount = 0`
    /// and the enrichment time as its timestamp, since the enriched record
    /// carries neither.
    async fn upsert_enriched(&self, record: &EnrichedTransactionRecord) -> Result<()>;
}

/// SQLite-backed trading history
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Row type for pending records query
#[derive(FromRow)]
struct PendingRow {
    user_id: String,
    signature: String,
    token_address: String,
    amount: f64,
    timestamp: String,
    tx_type: String,
}

/// Row type for enriched records query
#[derive(FromRow)]
struct EnrichedRow {
    user_id: String,
    signature: String,
    token_address: String,
    token_symbol: Option<String>,
    token_logo_uri: Option<String>,
    price_sol: Option<f64>,
    price_usd: Option<f64>,
    value_sol: Option<f64>,
    value_usd: Option<f64>,
    profit_loss: Option<f64>,
    tx_type: String,
}

impl SqliteStore {
    /// Open or create the trading history database
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url).await?;

        // WAL + busy timeout: the web server and CLI may share the file
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "trading history store opened");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS trading_history (
                user_id TEXT NOT NULL,
                signature TEXT NOT NULL,
                token_address TEXT NOT NULL,
                amount REAL NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL,
                tx_type TEXT NOT NULL,
                token_symbol TEXT,
                token_logo_uri TEXT,
                price_sol REAL,
                price_usd REAL,
                value_sol REAL,
                value_usd REAL,
                profit_loss REAL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, signature)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trading_history_user ON trading_history (user_id, timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record transactions awaiting enrichment. Existing rows are left untouched.
    /// Returns the number of newly inserted rows.
    pub async fn insert_pending(&self, records: &[PendingRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for record in records {
            let result = sqlx::query(
                "INSERT INTO trading_history (user_id, signature, token_address, amount, timestamp, tx_type)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(user_id, signature) DO NOTHING",
            )
            .bind(&record.user_id)
            .bind(&record.signature)
            .bind(&record.asset_id)
            .bind(record.amount)
            .bind(record.timestamp.to_rfc3339())
            .bind(record.tx_type.as_str())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Rows not yet enriched, oldest first
    pub async fn pending_records(&self, user_id: Option<&str>, limit: u32) -> Result<Vec<PendingRecord>> {
        let rows: Vec<PendingRow> = sqlx::query_as(
            "SELECT user_id, signature, token_address, amount, timestamp, tx_type
             FROM trading_history
             WHERE token_symbol IS NULL AND (?1 IS NULL OR user_id = ?1)
             ORDER BY timestamp
             LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_pending).collect())
    }

    /// Enriched rows for a user, oldest first
    pub async fn enriched_records(&self, user_id: &str) -> Result<Vec<EnrichedTransactionRecord>> {
        let rows: Vec<EnrichedRow> = sqlx::query_as(
            "SELECT user_id, signature, token_address, token_symbol, token_logo_uri,
                    price_sol, price_usd, value_sol, value_usd, profit_loss, tx_type
             FROM trading_history
             WHERE user_id = ? AND token_symbol IS NOT NULL
             ORDER BY timestamp",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_enriched).collect())
    }

    /// Row counts
    pub async fn stats(&self) -> Result<StoreStats> {
        let (total, pending): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN token_symbol IS NULL THEN 1 ELSE 0 END), 0)
             FROM trading_history",
        )
        .fetch_one(&self.pool)
        .await?;

        let (users,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT user_id) FROM trading_history")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            records: total as u64,
            pending: pending as u64,
            enriched: (total - pending) as u64,
            users: users as u64,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_enriched(&self, record: &EnrichedTransactionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO trading_history
             (user_id, signature, token_address, timestamp, tx_type,
              token_symbol, token_logo_uri, price_sol, price_usd, value_sol, value_usd, profit_loss)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, signature) DO UPDATE SET
                token_address = excluded.token_address,
                tx_type = excluded.tx_type,
                token_symbol = excluded.token_symbol,
                token_logo_uri = excluded.token_logo_uri,
                price_sol = excluded.price_sol,
                price_usd = excluded.price_usd,
                value_sol = excluded.value_sol,
                value_usd = excluded.value_usd,
                profit_loss = excluded.profit_loss,
                updated_at = datetime('now')",
        )
        .bind(&record.user_id)
        .bind(&record.signature)
        .bind(&record.asset_id)
        .bind(Utc::now().to_rfc3339())
        .bind(record.tx_type.as_str())
        .bind(&record.symbol)
        .bind(&record.icon_uri)
        .bind(record.price_in_base)
        .bind(record.price_in_fiat)
        .bind(record.value_in_base)
        .bind(record.value_in_fiat)
        .bind(record.realized_pnl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Helper functions
// =============================================================================

fn row_to_pending(r: PendingRow) -> PendingRecord {
    let timestamp = DateTime::parse_from_rfc3339(&r.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default();

    PendingRecord {
        user_id: r.user_id,
        signature: r.signature,
        asset_id: r.token_address,
        amount: r.amount,
        timestamp,
        tx_type: TransactionType::from_str_lossy(&r.tx_type),
    }
}

fn row_to_enriched(r: EnrichedRow) -> EnrichedTransactionRecord {
    EnrichedTransactionRecord {
        user_id: r.user_id,
        signature: r.signature,
        asset_id: r.token_address,
        symbol: r.token_symbol.unwrap_or_default(),
        icon_uri: r.token_logo_uri.unwrap_or_default(),
        price_in_base: r.price_sol.unwrap_or(0.0),
        price_in_fiat: r.price_usd.unwrap_or(0.0),
        value_in_base: r.value_sol.unwrap_or(0.0),
        value_in_fiat: r.value_usd.unwrap_or(0.0),
        realized_pnl: r.profit_loss.unwrap_or(0.0),
        tx_type: TransactionType::from_str_lossy(&r.tx_type),
    }
}

/// Store statistics
#[derive(Debug)]
pub struct StoreStats {
    pub records: u64,
    pub pending: u64,
    pub enriched: u64,
    pub users: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records ({} enriched, {} pending) across {} users",
            self.records, self.enriched, self.pending, self.users
        )
    }
}
