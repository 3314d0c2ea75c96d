/// Service configuration
///
/// Built from environment variables once at startup, validated, then passed
/// explicitly to every component that needs it. No ambient config globals.
use crate::constants::DEFAULT_WORKER_COUNT;
use crate::errors::{TrackerError, TrackerResult};
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 3305;
const DEFAULT_DATABASE_URL: &str = "mintstream.db";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_POLL_MS: u64 = 2_000;
const DEFAULT_QUOTE_TTL_SECS: u64 = 30;

/// Aggregator positive-cache bounds. The upper bound is a hard ceiling; a
/// stale quote older than a minute is worse than a refetch.
const QUOTE_TTL_MIN_SECS: u64 = 5;
const QUOTE_TTL_MAX_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// SQLite database path.
    pub database_url: String,
    /// Cache store endpoint.
    pub redis_url: String,
    /// Credential for the chain RPC provider.
    pub chain_api_key: String,
    /// Repeating-job period in milliseconds.
    pub poll_ms: u64,
    /// Environment tag (development/production).
    pub env: String,
    /// Aggregator positive-cache TTL, clamped to [5, 60] seconds.
    pub quote_ttl_secs: u64,
    /// Scheduler worker pool size.
    pub workers: usize,
}

impl Config {
    /// Load from the environment, applying defaults and validation.
    pub fn from_env() -> TrackerResult<Self> {
        let chain_api_key = std::env::var("CHAIN_API_KEY")
            .map_err(|_| TrackerError::bad_request("CHAIN_API_KEY is required"))?;
        if chain_api_key.trim().is_empty() {
            return Err(TrackerError::bad_request("CHAIN_API_KEY must not be empty"));
        }

        let port = parse_env("PORT", DEFAULT_PORT)?;
        let poll_ms = parse_env("POLL_MS", DEFAULT_POLL_MS)?;
        if poll_ms == 0 {
            return Err(TrackerError::bad_request("POLL_MS must be positive"));
        }

        let quote_ttl_secs: u64 = parse_env("QUOTE_TTL_SECS", DEFAULT_QUOTE_TTL_SECS)?;
        let quote_ttl_secs = quote_ttl_secs.clamp(QUOTE_TTL_MIN_SECS, QUOTE_TTL_MAX_SECS);

        Ok(Self {
            port,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            chain_api_key,
            poll_ms,
            env: std::env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string()),
            quote_ttl_secs,
            workers: parse_env("WORKERS", DEFAULT_WORKER_COUNT)?,
        })
    }

    /// Chain RPC endpoint derived from the credential.
    pub fn chain_rpc_url(&self) -> String {
        format!(
            "https://mainnet.helius-rpc.com/?api-key={}",
            self.chain_api_key
        )
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}

fn parse_env<T>(name: &str, default: T) -> TrackerResult<T>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| TrackerError::bad_request(format!("{} is not a valid value", name))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ttl_is_clamped() {
        assert_eq!(120u64.clamp(QUOTE_TTL_MIN_SECS, QUOTE_TTL_MAX_SECS), 60);
        assert_eq!(1u64.clamp(QUOTE_TTL_MIN_SECS, QUOTE_TTL_MAX_SECS), 5);
        assert_eq!(30u64.clamp(QUOTE_TTL_MIN_SECS, QUOTE_TTL_MAX_SECS), 30);
    }
}
