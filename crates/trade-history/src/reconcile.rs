//! Token balance delta reconciliation
//!
//! Pairs each post-transaction token balance with its pre-transaction
//! counterpart by exact `(mint, account index)` and reports the net change.
//! Owner address alone is never used for matching: one wallet can hold the
//! same mint in several token accounts.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::constants::{DUST_THRESHOLD, PRIMARY_OWNER_WINDOW};
use crate::types::{BalanceDelta, TokenBalanceSnapshot, Transaction};

/// Compute per-account token deltas for one transaction's snapshots.
///
/// A post balance without a pre balance is an opening position (pre amount 0).
/// Deltas with `|display delta| < 1e-6` are dropped. Output follows `post` order.
pub fn reconcile(pre: &[TokenBalanceSnapshot], post: &[TokenBalanceSnapshot]) -> Vec<BalanceDelta> {
    let pre_by_key: HashMap<String, &TokenBalanceSnapshot> = pre.iter().map(|b| (b.key(), b)).collect();
    let primary_owners = primary_owners(pre);

    let mut deltas = Vec::new();

    for post_balance in post {
        let pre_balance = pre_by_key.get(&post_balance.key());

        let pre_display = pre_balance.map(|b| b.display_amount).unwrap_or(0.0);
        let pre_raw = pre_balance.map(|b| b.raw_amount).unwrap_or(0);
        let display_amount_delta = post_balance.display_amount - pre_display;

        if display_amount_delta.abs() < DUST_THRESHOLD {
            continue;
        }

        let is_primary_account = post_balance
            .owner_address
            .as_deref()
            .is_some_and(|owner| primary_owners.contains(owner));

        debug!(
            mint = %post_balance.asset_id,
            account_index = post_balance.account_index,
            pre = pre_display,
            post = post_balance.display_amount,
            change = display_amount_delta,
            is_primary_account,
            "token balance change"
        );

        deltas.push(BalanceDelta {
            asset_id: post_balance.asset_id.clone(),
            account_index: post_balance.account_index,
            owner_address: post_balance.owner_address.clone(),
            raw_amount_delta: post_balance.raw_amount as i128 - pre_raw as i128,
            display_amount_delta,
            decimals: post_balance.decimals,
            is_primary_account,
        });
    }

    deltas
}

/// Reconcile a whole transaction. Missing meta or a missing token-balance
/// list yields no deltas.
pub fn reconcile_transaction(tx: &Transaction) -> Vec<BalanceDelta> {
    let Some(meta) = &tx.meta else {
        return Vec::new();
    };
    let (Some(pre), Some(post)) = (&meta.pre_token_balances, &meta.post_token_balances) else {
        debug!(signature = %tx.signature, "no token balances in transaction");
        return Vec::new();
    };

    let pre: Vec<TokenBalanceSnapshot> = pre.iter().map(TokenBalanceSnapshot::from_raw).collect();
    let post: Vec<TokenBalanceSnapshot> = post.iter().map(TokenBalanceSnapshot::from_raw).collect();

    reconcile(&pre, &post)
}

/// Owners of the first few pre balances.
///
/// Approximate: the RPC data carries no authoritative "this is the signer's
/// token account" flag, and in swaps the wallet's own accounts usually come first.
fn primary_owners(pre: &[TokenBalanceSnapshot]) -> HashSet<&str> {
    pre.iter()
        .take(PRIMARY_OWNER_WINDOW)
        .filter_map(|b| b.owner_address.as_deref())
        .collect()
}
