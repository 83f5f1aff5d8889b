//! Transaction classification from native SOL movement of the first account.
//!
//! Independent of token deltas: only `preBalances[0]` / `postBalances[0]` matter.

use tracing::debug;

use crate::constants::{CLASSIFY_THRESHOLD_SOL, LAMPORTS_PER_SOL};
use crate::types::{Transaction, TransactionType};

/// Classify from native lamport balances.
///
/// Outgoing SOL beyond the threshold is a BUY, incoming is a SELL. Anything at
/// or under the threshold (fee-only, no-op) and missing data is UNKNOWN.
pub fn classify(pre_balances: &[u64], post_balances: &[u64]) -> TransactionType {
    let (Some(&pre), Some(&post)) = (pre_balances.first(), post_balances.first()) else {
        debug!("no native balance information, classifying as UNKNOWN");
        return TransactionType::Unknown;
    };

    // Subtract in lamports first; converting each side to SOL separately
    // rounds a 1_000_000 lamport move past the threshold.
    let lamport_change = post as i128 - pre as i128;
    let sol_change = lamport_change as f64 / LAMPORTS_PER_SOL;

    let tx_type = if sol_change.abs() <= CLASSIFY_THRESHOLD_SOL {
        TransactionType::Unknown
    } else if sol_change < 0.0 {
        TransactionType::Buy
    } else {
        TransactionType::Sell
    };

    debug!(pre, post, sol_change, %tx_type, "classified transaction");
    tx_type
}

/// Classify a whole transaction; no meta means UNKNOWN.
pub fn classify_transaction(tx: &Transaction) -> TransactionType {
    match &tx.meta {
        Some(meta) => classify(&meta.pre_balances, &meta.post_balances),
        None => TransactionType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SOL: u64 = 1_000_000_000;

    #[test]
    fn test_fee_sized_change_is_unknown() {
        // -0.0005 SOL
        assert_eq!(classify(&[ONE_SOL], &[ONE_SOL - 500_000]), TransactionType::Unknown);
    }

    #[test]
    fn test_outgoing_sol_is_buy() {
        // -0.01 SOL
        assert_eq!(classify(&[ONE_SOL], &[ONE_SOL - 10_000_000]), TransactionType::Buy);
    }

    #[test]
    fn test_incoming_sol_is_sell() {
        // +0.01 SOL
        assert_eq!(classify(&[ONE_SOL], &[ONE_SOL + 10_000_000]), TransactionType::Sell);
    }

    #[test]
    fn test_exact_threshold_is_unknown() {
        for pre in [ONE_SOL, 5 * ONE_SOL, 123_450_000_000] {
            assert_eq!(classify(&[pre], &[pre - 1_000_000]), TransactionType::Unknown);
            assert_eq!(classify(&[pre], &[pre + 1_000_000]), TransactionType::Unknown);
        }
    }

    #[test]
    fn test_one_lamport_past_threshold_is_classified() {
        for pre in [ONE_SOL, 5 * ONE_SOL, 123_450_000_000] {
            assert_eq!(classify(&[pre], &[pre - 1_000_001]), TransactionType::Buy);
            assert_eq!(classify(&[pre], &[pre + 1_000_001]), TransactionType::Sell);
        }
    }

    #[test]
    fn test_empty_balances_are_unknown() {
        assert_eq!(classify(&[], &[]), TransactionType::Unknown);
        assert_eq!(classify(&[ONE_SOL], &[]), TransactionType::Unknown);
    }

    #[test]
    fn test_only_first_account_counts() {
        assert_eq!(
            classify(&[ONE_SOL, 0, 5 * ONE_SOL], &[ONE_SOL, 3 * ONE_SOL, 0]),
            TransactionType::Unknown
        );
    }

    #[test]
    fn test_transaction_without_meta_is_unknown() {
        let tx = Transaction {
            signature: "sig".to_string(),
            block_time: None,
            slot: 0,
            meta: None,
        };
        assert_eq!(classify_transaction(&tx), TransactionType::Unknown);
    }
}
