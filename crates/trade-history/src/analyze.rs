//! Per-transaction analysis: reconcile, classify, and attach token metadata.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::classify::classify_transaction;
use crate::constants::{METADATA_FETCH_CONCURRENCY, NATIVE_MINT};
use crate::metadata::MetadataCache;
use crate::reconcile::reconcile_transaction;
use crate::types::{
    AnalyzedTransaction, AssetMetadata, BalanceDelta, PendingRecord, TokenChange, Transaction, TransactionType,
};

/// Turns raw ledger transactions into display-ready analyses.
pub struct Analyzer {
    cache: Arc<MetadataCache>,
}

impl Analyzer {
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self { cache }
    }

    /// Analyze one transaction.
    pub async fn analyze(&self, tx: &Transaction) -> AnalyzedTransaction {
        let deltas = reconcile_transaction(tx);
        let metadata = self.resolve_metadata(deltas.iter().map(|d| d.asset_id.as_str())).await;
        assemble(tx, deltas, &metadata)
    }

    /// Analyze a page of transactions, preserving order. Each distinct mint
    /// on the page is looked up once.
    pub async fn analyze_page(&self, transactions: &[Transaction]) -> Vec<AnalyzedTransaction> {
        let deltas: Vec<Vec<BalanceDelta>> = transactions.iter().map(reconcile_transaction).collect();
        let metadata = self
            .resolve_metadata(deltas.iter().flatten().map(|d| d.asset_id.as_str()))
            .await;

        transactions
            .iter()
            .zip(deltas)
            .map(|(tx, deltas)| assemble(tx, deltas, &metadata))
            .collect()
    }

    async fn resolve_metadata<'a>(&self, asset_ids: impl Iterator<Item = &'a str>) -> HashMap<String, AssetMetadata> {
        let unique: BTreeSet<&str> = asset_ids.collect();
        let fetch = |asset_id: &str| {
            let asset_id = asset_id.to_string();
            async move {
                let metadata = self.cache.get(&asset_id).await;
                (asset_id, metadata)
            }
        };
        stream::iter(unique)
            .map(fetch)
            .buffer_unordered(METADATA_FETCH_CONCURRENCY)
            .collect()
            .await
    }
}

/// Pair every delta with its metadata; each delta owns its output slot.
fn assemble(tx: &Transaction, deltas: Vec<BalanceDelta>, metadata: &HashMap<String, AssetMetadata>) -> AnalyzedTransaction {
    let tx_type = classify_transaction(tx);
    let token_changes: Vec<TokenChange> = deltas
        .into_iter()
        .map(|delta| {
            let (symbol, icon_uri) = match metadata.get(&delta.asset_id) {
                Some(m) => (m.symbol.clone(), m.icon_uri.clone()),
                None => {
                    let unknown = AssetMetadata::unknown(&delta.asset_id);
                    (unknown.symbol, unknown.icon_uri)
                }
            };
            TokenChange {
                delta,
                symbol,
                icon_uri,
            }
        })
        .collect();

    debug!(
        signature = %tx.signature,
        %tx_type,
        changes = token_changes.len(),
        "analyzed transaction"
    );

    let meta = tx.meta.as_ref();
    AnalyzedTransaction {
        signature: tx.signature.clone(),
        block_time: tx.block_time,
        slot: tx.slot,
        fee: meta.map(|m| m.fee).unwrap_or(0),
        failed: meta.is_some_and(|m| m.err.as_ref().is_some_and(|e| !e.is_null())),
        tx_type,
        token_changes,
    }
}

/// The token the wallet actually traded: the largest primary-account change
/// that is not wrapped SOL.
pub fn traded_asset(analyzed: &AnalyzedTransaction) -> Option<&TokenChange> {
    analyzed
        .token_changes
        .iter()
        .filter(|c| c.delta.is_primary_account && c.delta.asset_id != NATIVE_MINT)
        .max_by(|a, b| {
            a.delta
                .display_amount_delta
                .abs()
                .total_cmp(&b.delta.display_amount_delta.abs())
        })
}

/// Trading-history row for an analyzed transaction, if it is a trade.
///
/// Failed transactions, UNKNOWN classifications and transactions without a
/// traded asset are skipped.
pub fn pending_record(user_id: &str, analyzed: &AnalyzedTransaction) -> Option<PendingRecord> {
    if analyzed.failed || analyzed.tx_type == TransactionType::Unknown {
        return None;
    }
    let change = traded_asset(analyzed)?;
    let timestamp = analyzed
        .block_time
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .unwrap_or_else(Utc::now);

    Some(PendingRecord {
        user_id: user_id.to_string(),
        signature: analyzed.signature.clone(),
        asset_id: change.delta.asset_id.clone(),
        amount: change.delta.display_amount_delta.abs(),
        timestamp,
        tx_type: analyzed.tx_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::MockMetadataProvider;
    use crate::types::{RawTokenBalance, TransactionMeta, UiTokenAmount};
    use std::sync::atomic::Ordering;

    fn balance(index: u32, mint: &str, owner: &str, ui: f64) -> RawTokenBalance {
        RawTokenBalance {
            account_index: index,
            mint: mint.to_string(),
            owner: Some(owner.to_string()),
            program_id: None,
            ui_token_amount: UiTokenAmount {
                amount: ((ui * 1_000_000.0) as u64).to_string(),
                decimals: 6,
                ui_amount: Some(ui),
                ui_amount_string: None,
            },
        }
    }

    /// Wallet spends 0.5 SOL (via wSOL) for 250 BONK from a pool
    fn swap_tx() -> Transaction {
        Transaction {
            signature: "swap-sig".to_string(),
            block_time: Some(1_700_000_000),
            slot: 99,
            meta: Some(TransactionMeta {
                err: None,
                fee: 5000,
                pre_balances: vec![2_000_000_000, 0],
                post_balances: vec![1_499_995_000, 0],
                pre_token_balances: Some(vec![
                    balance(1, "MintBonk", "Wallet", 0.0),
                    balance(2, NATIVE_MINT, "Wallet", 0.5),
                    balance(5, "MintUsdc", "Wallet", 12.0),
                    balance(3, "MintBonk", "Pool", 1000.0),
                    balance(4, NATIVE_MINT, "Pool", 10.0),
                ]),
                post_token_balances: Some(vec![
                    balance(1, "MintBonk", "Wallet", 250.0),
                    balance(2, NATIVE_MINT, "Wallet", 0.0),
                    balance(3, "MintBonk", "Pool", 750.0),
                    balance(4, NATIVE_MINT, "Pool", 10.5),
                    balance(5, "MintUsdc", "Wallet", 12.0),
                ]),
                log_messages: None,
            }),
        }
    }

    fn analyzer() -> (Analyzer, Arc<MockMetadataProvider>) {
        let provider = Arc::new(MockMetadataProvider::with_symbols(&[("MintBonk", "BONK"), (NATIVE_MINT, "SOL")]));
        let cache = Arc::new(MetadataCache::new(provider.clone()));
        (Analyzer::new(cache), provider)
    }

    #[tokio::test]
    async fn test_analyze_swap() {
        let (analyzer, provider) = analyzer();
        let analyzed = analyzer.analyze(&swap_tx()).await;

        assert_eq!(analyzed.tx_type, TransactionType::Buy);
        assert_eq!(analyzed.fee, 5000);
        assert!(!analyzed.failed);
        assert_eq!(analyzed.token_changes.len(), 4);
        assert_eq!(analyzed.token_changes[0].symbol, "BONK");
        assert_eq!(analyzed.token_changes[0].delta.display_amount_delta, 250.0);
        assert!(analyzed.token_changes[0].delta.is_primary_account);
        assert!(!analyzed.token_changes[2].delta.is_primary_account);
        // BONK, wSOL and USDC: one lookup each even though two accounts hold BONK
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_repeated_mints_across_page_are_fetched_once() {
        let (analyzer, provider) = analyzer();
        let page: Vec<Transaction> = (0..8)
            .map(|i| {
                let mut tx = swap_tx();
                tx.signature = format!("swap-{}", i);
                tx
            })
            .collect();

        let analyzed = analyzer.analyze_page(&page).await;

        assert_eq!(analyzed.len(), 8);
        assert!(analyzed.iter().all(|tx| tx.token_changes[0].symbol == "BONK"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pending_record_picks_traded_asset() {
        let (analyzer, _) = analyzer();
        let analyzed = analyzer.analyze(&swap_tx()).await;

        let record = pending_record("user-1", &analyzed).unwrap();
        assert_eq!(record.asset_id, "MintBonk");
        assert_eq!(record.amount, 250.0);
        assert_eq!(record.tx_type, TransactionType::Buy);
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_failed_or_unknown_transactions_are_not_trades() {
        let (analyzer, _) = analyzer();

        let mut failed = swap_tx();
        if let Some(meta) = failed.meta.as_mut() {
            meta.err = Some(serde_json::json!({"InstructionError": [0, "Custom"]}));
        }
        let analyzed = analyzer.analyze(&failed).await;
        assert!(analyzed.failed);
        assert!(pending_record("user-1", &analyzed).is_none());

        let mut fee_only = swap_tx();
        if let Some(meta) = fee_only.meta.as_mut() {
            meta.post_balances = vec![1_999_995_000, 0];
        }
        let analyzed = analyzer.analyze(&fee_only).await;
        assert_eq!(analyzed.tx_type, TransactionType::Unknown);
        assert!(pending_record("user-1", &analyzed).is_none());
    }

    #[tokio::test]
    async fn test_analyze_page_preserves_order() {
        let (analyzer, _) = analyzer();
        let mut second = swap_tx();
        second.signature = "second".to_string();
        second.meta = None;

        let page = analyzer.analyze_page(&[swap_tx(), second]).await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].signature, "swap-sig");
        assert_eq!(page[1].signature, "second");
        assert_eq!(page[1].tx_type, TransactionType::Unknown);
        assert!(page[1].token_changes.is_empty());
    }
}
