//! Current token prices (Jupiter) and SOL-denominated price resolution.
//!
//! Only current prices exist upstream, so valuations of older transactions
//! are approximations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::constants;
use crate::error::{Error, Result};
use crate::types::TokenPriceInfo;

/// Current USD price lookup.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn usd_price(&self, asset_id: &str) -> Result<f64>;
}

/// Jupiter price v3 response: map keyed by mint
#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(rename = "usdPrice")]
    usd_price: Option<f64>,
}

type PriceResponse = HashMap<String, Option<PriceEntry>>;

/// Jupiter price API client
pub struct JupiterPriceProvider {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl JupiterPriceProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(constants::JUPITER_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            max_retries: constants::PRICE_MAX_RETRIES,
        })
    }
}

#[async_trait]
impl PriceProvider for JupiterPriceProvider {
    async fn usd_price(&self, asset_id: &str) -> Result<f64> {
        let url = format!("{}{}?ids={}", self.base_url, constants::JUPITER_PRICE, asset_id);

        let mut last_error = None;
        let mut data: Option<PriceResponse> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt));
                sleep(delay).await;
            }

            match self.client.get(&url).header("Accept", "application/json").send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        match response.json::<PriceResponse>().await {
                            Ok(d) => {
                                data = Some(d);
                                break;
                            }
                            Err(e) => {
                                last_error = Some(Error::Provider(format!("Parse error: {}", e)));
                            }
                        }
                    } else if response.status().as_u16() == 429 {
                        last_error = Some(Error::Provider("Rate limited (429)".to_string()));
                        continue;
                    } else {
                        // Other statuses are not going to change on retry
                        return Err(Error::Provider(format!(
                            "Jupiter price API returned status: {}",
                            response.status()
                        )));
                    }
                }
                Err(e) => {
                    last_error = Some(Error::from(e));
                }
            }
        }

        let data = data.ok_or_else(|| {
            last_error.unwrap_or_else(|| Error::Provider(format!("Failed after {} retries", self.max_retries)))
        })?;

        data.get(asset_id)
            .and_then(|entry| entry.as_ref())
            .and_then(|entry| entry.usd_price)
            .filter(|price| price.is_finite())
            .ok_or_else(|| Error::Provider(format!("No price for {}", asset_id)))
    }
}

/// Resolve fiat and SOL prices for `asset_id`.
///
/// Both lookups run concurrently. A failed lookup counts as price 0, and a
/// non-positive SOL price yields `price_in_base = 0`.
pub async fn resolve_price_info(provider: &dyn PriceProvider, asset_id: &str) -> TokenPriceInfo {
    let (native, token) = futures::join!(
        provider.usd_price(constants::NATIVE_MINT),
        provider.usd_price(asset_id),
    );

    let native_usd = native.unwrap_or_else(|e| {
        warn!(error = %e, "SOL price lookup failed, using 0");
        0.0
    });
    let price_in_fiat = token.unwrap_or_else(|e| {
        warn!(mint = asset_id, error = %e, "token price lookup failed, using 0");
        0.0
    });

    let price_in_base = if native_usd > 0.0 { price_in_fiat / native_usd } else { 0.0 };

    debug!(mint = asset_id, price_in_fiat, price_in_base, "price fetched");

    TokenPriceInfo {
        price_in_fiat,
        price_in_base,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Price double with fixed quotes; unknown mints fail.
    pub(crate) struct MockPriceProvider {
        pub prices: HashMap<String, f64>,
        pub calls: AtomicUsize,
    }

    impl MockPriceProvider {
        pub(crate) fn new(prices: &[(&str, f64)]) -> Self {
            Self {
                prices: prices.iter().map(|(m, p)| (m.to_string(), *p)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PriceProvider for MockPriceProvider {
        async fn usd_price(&self, asset_id: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .get(asset_id)
                .copied()
                .ok_or_else(|| Error::Provider(format!("No price for {}", asset_id)))
        }
    }

    #[tokio::test]
    async fn test_price_in_base_divides_by_sol_price() {
        let provider = MockPriceProvider::new(&[(constants::NATIVE_MINT, 200.0), ("MintA", 4.0)]);
        let info = resolve_price_info(&provider, "MintA").await;
        assert_eq!(info.price_in_fiat, 4.0);
        assert_eq!(info.price_in_base, 0.02);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_sol_price_yields_zero_base_price() {
        let provider = MockPriceProvider::new(&[("MintA", 4.0)]);
        let info = resolve_price_info(&provider, "MintA").await;
        assert_eq!(info.price_in_fiat, 4.0);
        assert_eq!(info.price_in_base, 0.0);
    }

    #[tokio::test]
    async fn test_zero_sol_price_yields_zero_base_price() {
        let provider = MockPriceProvider::new(&[(constants::NATIVE_MINT, 0.0), ("MintA", 4.0)]);
        let info = resolve_price_info(&provider, "MintA").await;
        assert_eq!(info.price_in_base, 0.0);
    }

    #[tokio::test]
    async fn test_missing_token_price_degrades_to_zero() {
        let provider = MockPriceProvider::new(&[(constants::NATIVE_MINT, 150.0)]);
        let info = resolve_price_info(&provider, "MintA").await;
        assert_eq!(info, TokenPriceInfo::default());
    }

    #[test]
    fn test_price_response_parses_v3_shape() {
        let json = r#"{
            "So11111111111111111111111111111111111111112": {"usdPrice": 147.48, "blockId": 1, "decimals": 9},
            "Unpriced111": null
        }"#;
        let data: PriceResponse = serde_json::from_str(json).unwrap();
        let sol = data.get(constants::NATIVE_MINT).unwrap().as_ref().unwrap();
        assert_eq!(sol.usd_price, Some(147.48));
        assert!(data.get("Unpriced111").unwrap().is_none());
    }
}
