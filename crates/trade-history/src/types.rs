//! Data model: upstream transaction shapes, snapshots, deltas and enriched records.
//!
//! Upstream JSON is camelCase and loosely typed; everything is parsed into
//! these structs at the boundary before any analysis runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Upstream ledger shapes ──────────────────────────────────────────────────

/// Token amount as reported by the ledger RPC.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    /// Raw integer amount as a decimal string
    pub amount: String,
    pub decimals: u8,
    #[serde(default)]
    pub ui_amount: Option<f64>,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
}

/// One entry of `preTokenBalances` / `postTokenBalances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenBalance {
    pub account_index: u32,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

/// Transaction status metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Option<Vec<RawTokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<RawTokenBalance>>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
}

/// A confirmed transaction as returned by the ledger source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub signature: String,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

/// One page of transactions plus the cursor for the next page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub last_signature: Option<String>,
}

// ── Snapshots and deltas ────────────────────────────────────────────────────

/// One (account index, mint) balance at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalanceSnapshot {
    pub asset_id: String,
    pub owner_address: Option<String>,
    pub account_index: u32,
    pub raw_amount: u64,
    pub decimals: u8,
    pub display_amount: f64,
}

impl TokenBalanceSnapshot {
    /// Parse an upstream balance. Unparseable raw amounts read as 0; the
    /// display amount prefers `uiAmount`, then `uiAmountString`, then 0.
    pub fn from_raw(raw: &RawTokenBalance) -> Self {
        let amount = &raw.ui_token_amount;
        let display_amount = amount
            .ui_amount
            .or_else(|| amount.ui_amount_string.as_deref().and_then(|s| s.parse::<f64>().ok()))
            .unwrap_or(0.0);

        Self {
            asset_id: raw.mint.clone(),
            owner_address: raw.owner.clone(),
            account_index: raw.account_index,
            raw_amount: amount.amount.parse::<u64>().unwrap_or(0),
            decimals: amount.decimals,
            display_amount,
        }
    }

    /// Composite matching key: `{asset_id}:{account_index}`
    pub fn key(&self) -> String {
        format!("{}:{}", self.asset_id, self.account_index)
    }
}

/// Net change of one asset in one token account across a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDelta {
    pub asset_id: String,
    pub account_index: u32,
    pub owner_address: Option<String>,
    pub raw_amount_delta: i128,
    pub display_amount_delta: f64,
    pub decimals: u8,
    /// Best-effort guess that this token account belongs to the analyzed wallet
    pub is_primary_account: bool,
}

// ── Classification ──────────────────────────────────────────────────────────

/// Coarse economic intent of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
    Unknown,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "BUY" => Self::Buy,
            "SELL" => Self::Sell,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Metadata and pricing ────────────────────────────────────────────────────

pub const UNKNOWN_SYMBOL: &str = "Unknown";
pub const UNKNOWN_NAME: &str = "Unknown Token";

/// Human-readable token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub asset_id: String,
    pub symbol: String,
    pub display_name: String,
    pub icon_uri: String,
}

impl AssetMetadata {
    /// Sentinel stored when a lookup fails or returns nothing.
    pub fn unknown(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            symbol: UNKNOWN_SYMBOL.to_string(),
            display_name: UNKNOWN_NAME.to_string(),
            icon_uri: String::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == UNKNOWN_SYMBOL && self.display_name == UNKNOWN_NAME && self.icon_uri.is_empty()
    }
}

/// Current price of a token in fiat (USD) and base (SOL) terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPriceInfo {
    pub price_in_fiat: f64,
    pub price_in_base: f64,
}

// ── Trading history records ─────────────────────────────────────────────────

/// Trading-history row awaiting enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub user_id: String,
    pub signature: String,
    pub asset_id: String,
    /// Token quantity moved (display units, sign ignored for valuation)
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub tx_type: TransactionType,
}

/// Persisted, fully enriched trading-history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTransactionRecord {
    pub user_id: String,
    pub signature: String,
    pub asset_id: String,
    pub symbol: String,
    pub icon_uri: String,
    pub price_in_base: f64,
    pub price_in_fiat: f64,
    pub value_in_base: f64,
    pub value_in_fiat: f64,
    #[serde(rename = "realizedPnL")]
    pub realized_pnl: f64,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
}

// ── Analysis output ─────────────────────────────────────────────────────────

/// A balance delta with its resolved display metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenChange {
    #[serde(flatten)]
    pub delta: BalanceDelta,
    pub symbol: String,
    pub icon_uri: String,
}

/// One transaction after reconciliation, classification and metadata lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedTransaction {
    pub signature: String,
    pub block_time: Option<i64>,
    pub slot: u64,
    pub fee: u64,
    /// The transaction executed but returned an error
    pub failed: bool,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub token_changes: Vec<TokenChange>,
}
