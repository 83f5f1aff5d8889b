//! Program constants, thresholds and provider endpoints

use std::time::Duration;

// =============================================================================
// Native asset
// =============================================================================

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Wrapped SOL mint, used as the native asset's price key
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

// =============================================================================
// Analysis thresholds
// =============================================================================

/// Native balance movement (in SOL) at or below which a transaction is UNKNOWN.
/// Must stay above the largest plausible fee so fee-only transactions never classify.
pub const CLASSIFY_THRESHOLD_SOL: f64 = 0.001;

/// Token balance changes smaller than this are rounding noise
pub const DUST_THRESHOLD: f64 = 0.000_001;

/// Number of leading pre-balance entries whose owners are treated as the wallet's own
pub const PRIMARY_OWNER_WINDOW: usize = 3;

// =============================================================================
// Batch scheduling
// =============================================================================

/// Records enriched concurrently per group
pub const BATCH_GROUP_SIZE: usize = 5;

/// Pause between groups (fixed-window rate limiting)
pub const BATCH_PAUSE: Duration = Duration::from_secs(1);

// =============================================================================
// Request surface
// =============================================================================

pub const DEFAULT_TX_LIMIT: usize = 10;

/// getSignaturesForAddress page cap
pub const MAX_TX_LIMIT: usize = 1000;

/// Concurrent getTransaction calls per page
pub const RPC_FETCH_CONCURRENCY: usize = 10;

/// Concurrent metadata lookups per analyzed page
pub const METADATA_FETCH_CONCURRENCY: usize = 5;

// =============================================================================
// Provider endpoints
// =============================================================================

pub const PUBLIC_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DRPC_RPC_BASE: &str = "https://lb.drpc.org/ogrpc?network=solana&dkey=";
pub const HELIUS_API_BASE: &str = "https://api.helius.xyz";
pub const HELIUS_TOKEN_METADATA: &str = "/v0/token-metadata";
pub const JUPITER_API_BASE: &str = "https://lite-api.jup.ag";
pub const JUPITER_PRICE: &str = "/price/v3";

/// Timeout for every outbound provider request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Price provider retry policy (exponential 2^attempt seconds between attempts)
pub const PRICE_MAX_RETRIES: u32 = 3;
