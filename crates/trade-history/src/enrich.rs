//! Enrichment: metadata + current price + valuation, persisted per record.
//!
//! Metadata and price failures degrade (sentinel / zero price). Storage
//! failures propagate to the caller unchanged.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::Result;
use crate::metadata::MetadataCache;
use crate::prices::{PriceProvider, resolve_price_info};
use crate::store::RecordStore;
use crate::types::{EnrichedTransactionRecord, PendingRecord, TokenPriceInfo, TransactionType};

/// Value of a position change at a given price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    pub value_in_fiat: f64,
    pub value_in_base: f64,
    pub realized_pnl: f64,
}

/// Value `|amount|` at `price`. A BUY is a cash outflow (negative PnL),
/// anything else an inflow.
pub fn valuation(amount: f64, tx_type: TransactionType, price: &TokenPriceInfo) -> Valuation {
    let quantity = amount.abs();
    let value_in_fiat = quantity * price.price_in_fiat;
    let value_in_base = quantity * price.price_in_base;
    let realized_pnl = if tx_type == TransactionType::Buy {
        -value_in_fiat
    } else {
        value_in_fiat
    };

    Valuation {
        value_in_fiat,
        value_in_base,
        realized_pnl,
    }
}

/// Drives metadata, price and storage collaborators for pending records.
pub struct Enricher {
    cache: Arc<MetadataCache>,
    prices: Arc<dyn PriceProvider>,
    store: Arc<dyn RecordStore>,
}

impl Enricher {
    pub fn new(cache: Arc<MetadataCache>, prices: Arc<dyn PriceProvider>, store: Arc<dyn RecordStore>) -> Self {
        Self { cache, prices, store }
    }

    /// Enrich and persist one record.
    pub async fn enrich(&self, record: &PendingRecord) -> Result<EnrichedTransactionRecord> {
        let (metadata, price) = futures::join!(
            self.cache.get(&record.asset_id),
            resolve_price_info(self.prices.as_ref(), &record.asset_id),
        );

        let value = valuation(record.amount, record.tx_type, &price);

        let enriched = EnrichedTransactionRecord {
            user_id: record.user_id.clone(),
            signature: record.signature.clone(),
            asset_id: record.asset_id.clone(),
            symbol: metadata.symbol,
            icon_uri: metadata.icon_uri,
            price_in_base: price.price_in_base,
            price_in_fiat: price.price_in_fiat,
            value_in_base: value.value_in_base,
            value_in_fiat: value.value_in_fiat,
            realized_pnl: value.realized_pnl,
            tx_type: record.tx_type,
        };

        self.store.upsert_enriched(&enriched).await.map_err(|e| {
            error!(signature = %record.signature, error = %e, "failed to persist enriched record");
            e
        })?;

        debug!(
            signature = %enriched.signature,
            symbol = %enriched.symbol,
            value_in_fiat = enriched.value_in_fiat,
            realized_pnl = enriched.realized_pnl,
            "record enriched"
        );

        Ok(enriched)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::NATIVE_MINT;
    use crate::error::Error;
    use crate::metadata::tests::MockMetadataProvider;
    use crate::prices::tests::MockPriceProvider;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Store double that keeps upserts in memory and can fail chosen signatures.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub records: Mutex<Vec<EnrichedTransactionRecord>>,
        pub fail_signatures: HashSet<String>,
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn upsert_enriched(&self, record: &EnrichedTransactionRecord) -> Result<()> {
            if self.fail_signatures.contains(&record.signature) {
                return Err(Error::Storage(sqlx::Error::PoolTimedOut));
            }
            let mut records = self.records.lock().unwrap();
            records.retain(|r| !(r.user_id == record.user_id && r.signature == record.signature));
            records.push(record.clone());
            Ok(())
        }
    }

    pub(crate) fn pending(signature: &str, amount: f64, tx_type: TransactionType) -> PendingRecord {
        PendingRecord {
            user_id: "user-1".to_string(),
            signature: signature.to_string(),
            asset_id: "MintA".to_string(),
            amount,
            timestamp: Utc::now(),
            tx_type,
        }
    }

    pub(crate) fn enricher(store: Arc<MemoryStore>) -> Enricher {
        let cache = Arc::new(MetadataCache::new(Arc::new(MockMetadataProvider::with_symbols(&[(
            "MintA", "AAA",
        )]))));
        let prices = Arc::new(MockPriceProvider::new(&[(NATIVE_MINT, 200.0), ("MintA", 4.0)]));
        Enricher::new(cache, prices, store)
    }

    #[test]
    fn test_buy_valuation_is_cash_outflow() {
        let price = TokenPriceInfo {
            price_in_fiat: 4.0,
            price_in_base: 0.02,
        };
        let v = valuation(2.5, TransactionType::Buy, &price);
        assert_eq!(v.value_in_fiat, 10.0);
        assert_eq!(v.realized_pnl, -10.0);
        assert_eq!(v.value_in_base, 0.05);
    }

    #[test]
    fn test_sell_valuation_is_cash_inflow() {
        let price = TokenPriceInfo {
            price_in_fiat: 4.0,
            price_in_base: 0.0,
        };
        let v = valuation(-2.5, TransactionType::Sell, &price);
        assert_eq!(v.value_in_fiat, 10.0);
        assert_eq!(v.realized_pnl, 10.0);
    }

    #[tokio::test]
    async fn test_enrich_persists_valued_record() {
        let store = Arc::new(MemoryStore::default());
        let enricher = enricher(store.clone());

        let record = enricher.enrich(&pending("sig1", 2.5, TransactionType::Buy)).await.unwrap();

        assert_eq!(record.symbol, "AAA");
        assert_eq!(record.icon_uri, "https://img.example/AAA.png");
        assert_eq!(record.price_in_fiat, 4.0);
        assert_eq!(record.price_in_base, 0.02);
        assert_eq!(record.value_in_fiat, 10.0);
        assert_eq!(record.realized_pnl, -10.0);
        assert_eq!(store.records.lock().unwrap().as_slice(), &[record]);
    }

    #[tokio::test]
    async fn test_enrich_upserts_same_signature_once() {
        let store = Arc::new(MemoryStore::default());
        let enricher = enricher(store.clone());

        enricher.enrich(&pending("sig1", 1.0, TransactionType::Buy)).await.unwrap();
        enricher.enrich(&pending("sig1", 2.0, TransactionType::Sell)).await.unwrap();

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].realized_pnl, 8.0);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let store = Arc::new(MemoryStore {
            fail_signatures: HashSet::from(["sig1".to_string()]),
            ..Default::default()
        });
        let enricher = enricher(store);

        let result = enricher.enrich(&pending("sig1", 1.0, TransactionType::Buy)).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_provider_failures_degrade_without_error() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(MetadataCache::new(Arc::new(MockMetadataProvider::failing())));
        let prices = Arc::new(MockPriceProvider::new(&[]));
        let enricher = Enricher::new(cache, prices, store.clone());

        let record = enricher.enrich(&pending("sig1", 3.0, TransactionType::Sell)).await.unwrap();
        assert_eq!(record.symbol, "Unknown");
        assert_eq!(record.price_in_fiat, 0.0);
        assert_eq!(record.value_in_fiat, 0.0);
        assert_eq!(record.realized_pnl, 0.0);
    }
}
