// Chain constants
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Wrapped native mint, the preferred quote asset for every pair.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Canonical stable mint (USDC), the secondary quote asset.
pub const STABLE_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// The native mint always reports 9 decimals; no round-trip needed.
pub const NATIVE_DECIMALS: u8 = 9;

/// Circulating-supply figure used for the native mint's market cap. The chain
/// only reports the wrapped portion, so a published snapshot value is used
/// instead.
pub const NATIVE_SUPPLY_UI: f64 = 467_000_000.0;

/// Last-resort native/USD price. Only reachable after the aggregator, the
/// pools API and the on-chain native/stable pool have all failed.
pub const NATIVE_USD_FALLBACK: f64 = 150.0;

// Token programs (both are acceptable mint owners)
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

// AMM v4 pool layout. The byte-slice filters in the chain adapter depend on
// these offsets; changing them requires re-checking every getProgramAccounts
// call site.
pub const AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const AMM_V4_DATA_SIZE: usize = 752;
pub const AMM_V4_BASE_VAULT_OFFSET: usize = 336;
pub const AMM_V4_QUOTE_VAULT_OFFSET: usize = 368;
pub const AMM_V4_BASE_MINT_OFFSET: usize = 400;
pub const AMM_V4_QUOTE_MINT_OFFSET: usize = 432;

// Upstream endpoints
pub const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com/latest/dex";
pub const RAYDIUM_API_BASE: &str = "https://api-v3.raydium.io";
pub const RUGCHECK_API_BASE: &str = "https://api.rugcheck.xyz/v1";

// Upstream timeouts (seconds)
pub const UPSTREAM_TIMEOUT_SECS: u64 = 10;
pub const UPSTREAM_BATCH_TIMEOUT_SECS: u64 = 15;

// Cache TTLs (seconds)
pub const VALIDATION_CACHE_TTL_SECS: u64 = 3_600;
pub const SUPPLY_CACHE_TTL_SECS: u64 = 3_600;
pub const NATIVE_PRICE_CACHE_TTL_SECS: u64 = 5;
pub const NATIVE_USD_CACHE_TTL_SECS: u64 = 30;
pub const RISK_REPORT_CACHE_TTL_SECS: u64 = 300;
pub const TOP_HOLDERS_CACHE_TTL_SECS: u64 = 300;
pub const POOL_CACHE_TTL_SECS: u64 = 300;
pub const TOKEN_INFO_CACHE_TTL_SECS: u64 = 3_600;

/// How long a banned mint stays out of the system.
pub const BAN_TTL_SECS: u64 = 86_400;

// Aggregator limits
pub const AGGREGATOR_BATCH_SIZE: usize = 30;
pub const AGGREGATOR_MIN_CALL_GAP_MS: u64 = 200;

/// Minimum pause after an upstream signals throttling.
pub const THROTTLE_FLOOR_SECS: u64 = 2;

// Pair selection thresholds (USD)
pub const LAUNCH_MIN_VOLUME_24H: f64 = 1_000.0;
pub const LAUNCH_MIN_LIQUIDITY: f64 = 5_000.0;
pub const PAIR_MIN_LIQUIDITY: f64 = 500.0;
pub const PAIR_MIN_VOLUME_24H: f64 = 100.0;

/// Venues whose liquidity reporting is trusted enough to waive the volume
/// requirement.
pub const ESTABLISHED_VENUES: [&str; 4] = ["raydium", "orca", "jupiter", "meteora"];

/// Venue ids that indicate a launch ramp rather than a real market.
pub const LAUNCH_VENUES: [&str; 4] = ["pumpfun", "pumpswap", "launchlab", "moonshot"];

/// Minimum USD-equivalent quote-side reserve for an on-chain pool to be
/// considered priceable.
pub const MIN_POOL_RESERVE_USD: f64 = 1_000.0;

// Scheduler
pub const DEFAULT_JOB_PERIOD_MS: u64 = 1_000;
pub const DEFAULT_WORKER_COUNT: usize = 10;
pub const BAN_SWEEP_INTERVAL_SECS: u64 = 600;

// Read API
pub const HISTORY_CAP: usize = 1_000;
pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;
pub const DEFAULT_HOLDERS_LIMIT: usize = 10;
pub const MAX_HOLDERS_LIMIT: usize = 100;

// Cache key prefixes. Every prefix has a single owning component; see the
// purge list in the validator before adding one.
pub const VALIDATION_KEY_PREFIX: &str = "validation:";
pub const BAN_KEY_PREFIX: &str = "invalid_token:";
pub const TOKEN_INFO_KEY_PREFIX: &str = "token_info:";
pub const TOKEN_SUPPLY_KEY_PREFIX: &str = "token_supply:";
pub const TOKEN_DECIMALS_KEY_PREFIX: &str = "token_decimals:";
pub const NATIVE_PRICE_KEY_PREFIX: &str = "token_price_native:";
pub const QUOTE_KEY_PREFIX: &str = "quote:";
pub const POOL_KEY_PREFIX: &str = "pool:";
pub const RISK_KEY_PREFIX: &str = "rugcheck:";
pub const TOP_HOLDERS_KEY_PREFIX: &str = "top_holders:";
pub const NATIVE_USD_KEY: &str = "native_usd_price";

/// Pub/sub channel carrying freshly committed snapshots to the hub.
pub const PRICE_UPDATE_CHANNEL: &str = "price_update";

/// Queue-internal keys live under this prefix; obliterate scans it.
pub const JOB_KEY_PREFIX: &str = "jobs:";
