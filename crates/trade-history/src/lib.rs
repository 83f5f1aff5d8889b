//! Solana wallet trade history
//!
//! Reconciles token balance changes per transaction, classifies each
//! transaction as a BUY or SELL from the fee payer's SOL movement, resolves
//! token metadata through a shared cache, and values trades at current prices
//! in batches before persisting them.

pub mod analyze;
pub mod batch;
pub mod classify;
pub mod config;
pub mod constants;
pub mod enrich;
pub mod error;
pub mod metadata;
pub mod prices;
pub mod reconcile;
pub mod rpc;
pub mod store;
pub mod types;

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use solana_sdk::pubkey::Pubkey;

pub use analyze::{Analyzer, pending_record, traded_asset};
pub use batch::{BatchPolicy, BatchReport, run_in_groups};
pub use classify::{classify, classify_transaction};
pub use config::{Config, FileConfig, Overrides};
pub use enrich::{Enricher, Valuation, valuation};
pub use error::{Error, Result};
pub use metadata::{MetadataCache, MetadataProvider, metadata_provider};
pub use prices::{JupiterPriceProvider, PriceProvider};
pub use reconcile::{reconcile, reconcile_transaction};
pub use rpc::{RpcTransactionSource, TransactionSource};
pub use store::{RecordStore, SqliteStore};
pub use types::*;

/// Validate a base58 wallet address.
pub fn validate_address(address: &str) -> Result<Pubkey> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("address is required".to_string()));
    }
    Pubkey::from_str(trimmed).map_err(|e| Error::InvalidInput(format!("invalid address {}: {}", trimmed, e)))
}

/// Parse a cutoff timestamp: epoch milliseconds, RFC 3339, or `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {}", millis)));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::InvalidInput(format!("invalid timestamp: {}", value)))
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
