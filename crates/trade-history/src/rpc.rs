//! Ledger transaction source over Solana JSON-RPC
//!
//! `getSignaturesForAddress` pages through an address's history and
//! `getTransaction` loads each confirmed transaction with its balance metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::batch::run_bounded;
use crate::constants;
use crate::error::{Error, Result};
use crate::types::{Transaction, TransactionMeta, TransactionPage};

/// Source of an address's confirmed transactions.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Up to `limit` transactions, newest first, older than `before` (a
    /// signature) and no older than `after`.
    async fn get_transactions(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
        after: Option<DateTime<Utc>>,
    ) -> Result<TransactionPage>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    #[serde(default)]
    block_time: Option<i64>,
}

/// `getTransaction` result; the signature lives inside `transaction`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<TransactionMeta>,
}

/// JSON-RPC client for any Solana RPC endpoint (dRPC, Helius, public mainnet)
pub struct RpcTransactionSource {
    client: reqwest::Client,
    url: String,
}

impl RpcTransactionSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::REQUEST_TIMEOUT)
            .pool_max_idle_per_host(5)
            .build()?;
        Ok(Self { client, url: url.into() })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<Option<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rpc {
                status: Some(status.as_u16()),
                message: format!("{} returned HTTP {}", method, status),
            });
        }

        let body: RpcResponse<T> = response.json().await?;
        if let Some(err) = body.error {
            return Err(Error::Rpc {
                status: None,
                message: format!("{} failed ({}): {}", method, err.code, err.message),
            });
        }
        Ok(body.result)
    }

    async fn get_signatures(&self, address: &str, limit: usize, before: Option<&str>) -> Result<Vec<SignatureInfo>> {
        let mut config = json!({ "limit": limit, "commitment": "confirmed" });
        if let Some(before) = before {
            config["before"] = json!(before);
        }
        Ok(self
            .call::<Vec<SignatureInfo>>("getSignaturesForAddress", json!([address, config]))
            .await?
            .unwrap_or_default())
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<Transaction>> {
        let params = json!([
            signature,
            {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let tx = self.call::<RpcTransaction>("getTransaction", params).await?;
        Ok(tx.map(|tx| Transaction {
            signature: signature.to_string(),
            block_time: tx.block_time,
            slot: tx.slot,
            meta: tx.meta,
        }))
    }
}

#[async_trait]
impl TransactionSource for RpcTransactionSource {
    async fn get_transactions(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
        after: Option<DateTime<Utc>>,
    ) -> Result<TransactionPage> {
        let limit = limit.clamp(1, constants::MAX_TX_LIMIT);
        let signatures = self.get_signatures(address, limit, before).await?;
        let last_signature = signatures.last().map(|s| s.signature.clone());

        let wanted = filter_after(signatures, after);
        debug!(address, count = wanted.len(), "fetching transactions");

        let fetch = |s: &SignatureInfo| {
            let signature = s.signature.clone();
            async move { self.get_transaction(&signature).await }
        };
        let fetched = run_bounded(&wanted, constants::RPC_FETCH_CONCURRENCY, fetch).await;

        let mut transactions = Vec::with_capacity(fetched.len());
        for (info, result) in wanted.iter().zip(fetched) {
            match result? {
                Some(tx) => transactions.push(tx),
                None => warn!(signature = %info.signature, "transaction not found, skipping"),
            }
        }

        info!(address, count = transactions.len(), "fetched transactions");
        Ok(TransactionPage {
            transactions,
            last_signature,
        })
    }
}

/// Keep signatures at or after `after`; unknown block times are kept.
fn filter_after(signatures: Vec<SignatureInfo>, after: Option<DateTime<Utc>>) -> Vec<SignatureInfo> {
    let Some(after) = after else {
        return signatures;
    };
    let cutoff = after.timestamp();
    signatures
        .into_iter()
        .filter(|s| s.block_time.is_none_or(|t| t >= cutoff))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sig(name: &str, block_time: Option<i64>) -> SignatureInfo {
        SignatureInfo {
            signature: name.to_string(),
            block_time,
        }
    }

    #[test]
    fn test_filter_after_drops_older_signatures() {
        let after = Utc.timestamp_opt(1_000, 0).unwrap();
        let kept = filter_after(
            vec![sig("new", Some(2_000)), sig("edge", Some(1_000)), sig("old", Some(999)), sig("pending", None)],
            Some(after),
        );
        let names: Vec<&str> = kept.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(names, vec!["new", "edge", "pending"]);
    }

    #[test]
    fn test_filter_after_without_cutoff_keeps_all() {
        assert_eq!(filter_after(vec![sig("a", Some(1)), sig("b", None)], None).len(), 2);
    }

    #[test]
    fn test_rpc_error_object_parses() {
        let body: RpcResponse<Vec<SignatureInfo>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param: WrongSize"}}"#,
        )
        .unwrap();
        assert!(body.result.is_none());
        let err = body.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Invalid param: WrongSize");
    }

    #[test]
    fn test_get_transaction_result_parses() {
        let body: RpcResponse<RpcTransaction> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":{
                "slot": 250000000,
                "blockTime": 1700000000,
                "meta": {"err": null, "fee": 5000, "preBalances": [10], "postBalances": [5],
                         "preTokenBalances": [], "postTokenBalances": [], "logMessages": []},
                "transaction": {"signatures": ["abc"], "message": {}}
            }}"#,
        )
        .unwrap();
        let tx = body.result.unwrap();
        assert_eq!(tx.slot, 250_000_000);
        assert_eq!(tx.meta.unwrap().post_balances, vec![5]);
    }

    /// Address of a local port with nothing listening on it
    pub(crate) fn closed_local_addr() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let url = format!("{}/ogrpc?network=solana&dkey=SECRETDRPCKEY", closed_local_addr());
        let source = RpcTransactionSource::new(url).unwrap();

        let err = source
            .get_transactions("Wallet", 5, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("SECRETDRPCKEY"));
        assert!(!format!("{:?}", err).contains("SECRETDRPCKEY"));
    }
}
