//! Token metadata: Helius provider and the process-wide metadata cache.
//!
//! The cache is an explicit object shared through `Arc`. A miss asks the
//! provider once; whatever comes back (metadata or the `Unknown` sentinel) is
//! stored for the life of the cache, so failing mints are not retried.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::constants;
use crate::error::{Error, Result};
use crate::types::{AssetMetadata, UNKNOWN_NAME, UNKNOWN_SYMBOL};

// =============================================================================
// Provider response
// =============================================================================

/// One entry of the token-metadata response. Every level is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenMetadata {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub on_chain_metadata: Option<OnChainMetadata>,
    #[serde(default)]
    pub legacy_metadata: Option<LegacyMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnChainMetadata {
    #[serde(default)]
    pub metadata: Option<OnChainMetadataAccount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnChainMetadataAccount {
    #[serde(default)]
    pub data: Option<OnChainMetadataData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnChainMetadataData {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyMetadata {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "logoURI")]
    pub logo_uri: Option<String>,
}

impl RawTokenMetadata {
    fn on_chain(&self) -> Option<&OnChainMetadataData> {
        self.on_chain_metadata.as_ref()?.metadata.as_ref()?.data.as_ref()
    }

    /// Resolve display fields: on-chain metadata, then legacy token list, then
    /// the `Unknown` defaults. Empty strings count as missing.
    pub fn resolve(&self, asset_id: &str) -> AssetMetadata {
        let on_chain = self.on_chain();
        let legacy = self.legacy_metadata.as_ref();

        let symbol = first_non_empty([
            on_chain.and_then(|d| d.symbol.as_deref()),
            legacy.and_then(|l| l.symbol.as_deref()),
        ])
        .unwrap_or(UNKNOWN_SYMBOL);

        let display_name = first_non_empty([
            on_chain.and_then(|d| d.name.as_deref()),
            legacy.and_then(|l| l.name.as_deref()),
        ])
        .unwrap_or(UNKNOWN_NAME);

        let icon_uri = first_non_empty([legacy.and_then(|l| l.logo_uri.as_deref())]).unwrap_or("");

        AssetMetadata {
            asset_id: asset_id.to_string(),
            symbol: symbol.to_string(),
            display_name: display_name.to_string(),
            icon_uri: icon_uri.to_string(),
        }
    }
}

fn first_non_empty<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

// =============================================================================
// Provider
// =============================================================================

/// Batch token-metadata lookup.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_metadata(&self, asset_ids: &[String]) -> Result<Vec<RawTokenMetadata>>;
}

/// Helius `token-metadata` API
pub struct HeliusMetadataProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HeliusMetadataProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(constants::HELIUS_API_BASE, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl MetadataProvider for HeliusMetadataProvider {
    async fn fetch_metadata(&self, asset_ids: &[String]) -> Result<Vec<RawTokenMetadata>> {
        let url = format!(
            "{}{}?api-key={}",
            self.base_url,
            constants::HELIUS_TOKEN_METADATA,
            self.api_key
        );
        debug!(
            count = asset_ids.len(),
            api_key = %mask_key(&self.api_key),
            "requesting token metadata from Helius"
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({ "mintAccounts": asset_ids }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Helius token-metadata returned status: {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        let entries: Vec<RawTokenMetadata> = serde_json::from_str(&text)?;
        Ok(entries)
    }
}

/// Stand-in when no Helius key is configured; every lookup degrades.
pub struct UnconfiguredMetadataProvider;

#[async_trait]
impl MetadataProvider for UnconfiguredMetadataProvider {
    async fn fetch_metadata(&self, _asset_ids: &[String]) -> Result<Vec<RawTokenMetadata>> {
        Err(Error::Provider("no Helius API key configured".to_string()))
    }
}

/// Helius provider when a key is present, otherwise the unconfigured stand-in.
pub fn metadata_provider(api_key: Option<&str>) -> Result<Arc<dyn MetadataProvider>> {
    Ok(match api_key {
        Some(key) => Arc::new(HeliusMetadataProvider::new(key)?),
        None => Arc::new(UnconfiguredMetadataProvider),
    })
}

/// Mask an API key for logs: first 4 + `...` + last 4 characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// =============================================================================
// Cache
// =============================================================================

/// Unbounded, write-once-per-key metadata cache.
///
/// Concurrent misses on the same mint may each hit the provider; they all
/// resolve to the same value, so last-writer-wins is harmless.
pub struct MetadataCache {
    provider: Arc<dyn MetadataProvider>,
    entries: RwLock<HashMap<String, AssetMetadata>>,
}

impl MetadataCache {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Metadata for `asset_id`. Never fails; degrades to the sentinel.
    pub async fn get(&self, asset_id: &str) -> AssetMetadata {
        if let Some(cached) = self.peek(asset_id) {
            debug!(mint = asset_id, symbol = %cached.symbol, "using cached token info");
            return cached;
        }

        let resolved = match self.provider.fetch_metadata(&[asset_id.to_string()]).await {
            Ok(entries) => match entries.first() {
                Some(entry) => entry.resolve(asset_id),
                None => {
                    warn!(mint = asset_id, "no token info returned, using default");
                    AssetMetadata::unknown(asset_id)
                }
            },
            Err(e) => {
                warn!(mint = asset_id, error = %e, "token info lookup failed, using default");
                AssetMetadata::unknown(asset_id)
            }
        };

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset_id.to_string(), resolved.clone());

        resolved
    }

    /// Cached entry without any I/O
    pub fn peek(&self, asset_id: &str) -> Option<AssetMetadata> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(asset_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
