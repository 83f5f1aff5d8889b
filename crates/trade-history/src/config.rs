//! Configuration for trade-history

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::batch::BatchPolicy;
use crate::constants;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RpcConfig {
    /// Full RPC URL; overrides the dRPC / public endpoint choice
    #[serde(default)]
    pub url: Option<String>,
}

/// API keys section
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub drpc: Option<String>,
    #[serde(default)]
    pub helius: Option<String>,
}

/// Batch enrichment settings
#[derive(Debug, Deserialize)]
pub struct EnrichmentConfig {
    /// Records enriched concurrently per group (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between groups in milliseconds (default: 1000)
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<String>,
}

fn default_batch_size() -> usize {
    constants::BATCH_GROUP_SIZE
}

fn default_batch_pause_ms() -> u64 {
    constants::BATCH_PAUSE.as_millis() as u64
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Load if the file exists, otherwise defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Incorrect data types (strings vs numbers)\n\n\
             See config.toml.example for the expected format."
        })
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Default server bind address
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3000";

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Main configuration struct with resolved values
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger RPC URL
    pub rpc_url: String,
    /// Helius API key for token metadata (None = metadata lookups degrade to Unknown)
    pub helius_api_key: Option<String>,
    /// Batch scheduling
    pub batch: BatchPolicy,
    /// HTTP bind address
    pub server_addr: String,
    /// Directory holding the trading history database
    pub data_dir: PathBuf,
}

/// Values that take precedence over the file (CLI flags, environment)
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub drpc_api_key: Option<String>,
    pub helius_api_key: Option<String>,
    pub server_addr: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Overrides {
    /// Read the standard environment variables
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            rpc_url: var("RPC_URL"),
            drpc_api_key: var("DRPC_API_KEY"),
            helius_api_key: var("HELIUS_API_KEY"),
            server_addr: var("TH_WEB_ADDR"),
            data_dir: var("DATA_DIR").map(PathBuf::from),
        }
    }
}

impl Config {
    /// Resolve file config and overrides into runtime config
    pub fn from_file(file_config: &FileConfig, overrides: Overrides) -> Result<Self> {
        let enrichment = &file_config.enrichment;
        if enrichment.batch_size == 0 {
            anyhow::bail!("enrichment.batch_size must be at least 1");
        }

        let drpc_key = overrides.drpc_api_key.or_else(|| file_config.api_keys.drpc.clone());
        let rpc_url = match overrides.rpc_url.or_else(|| file_config.rpc.url.clone()) {
            Some(url) => url,
            None => match drpc_key {
                Some(key) => format!("{}{}", constants::DRPC_RPC_BASE, key),
                None => {
                    warn!(
                        "No DRPC API key configured (DRPC_API_KEY or api_keys.drpc); using public RPC {}",
                        constants::PUBLIC_RPC_URL
                    );
                    constants::PUBLIC_RPC_URL.to_string()
                }
            },
        };

        let helius_api_key = overrides.helius_api_key.or_else(|| file_config.api_keys.helius.clone());
        if helius_api_key.is_none() {
            warn!("No Helius API key configured (HELIUS_API_KEY or api_keys.helius); token symbols will show as Unknown");
        }

        Ok(Self {
            rpc_url,
            helius_api_key,
            batch: BatchPolicy {
                group_size: enrichment.batch_size,
                pause: Duration::from_millis(enrichment.batch_pause_ms),
            },
            server_addr: overrides
                .server_addr
                .or_else(|| file_config.server.addr.clone())
                .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
            data_dir: overrides
                .data_dir
                .or_else(|| file_config.storage.data_dir.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        })
    }

    /// Path of the trading history database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("trading_history.sqlite")
    }
}
