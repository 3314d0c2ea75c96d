/// Error taxonomy for the tracker
///
/// One tagged enum so the scheduler can discriminate a fatally invalid mint
/// from a transient upstream failure without inspecting messages. Only
/// `InvalidMint` ever triggers state mutation (ban + purge); everything
/// transient is metered, logged and skipped.
use std::time::Duration;

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Clone)]
pub enum TrackerError {
    /// The mint is not a valid token on the chain. Fatal for that mint in the
    /// current attempt; the scheduler reacts with ban-and-remove.
    InvalidMint { reason: String },

    /// The chain RPC endpoint could not be reached or answered garbage.
    ChainUnavailable { message: String },

    /// A market-data or risk upstream failed. Callers fall back to the next
    /// source; never a reason to ban.
    UpstreamUnavailable {
        source: &'static str,
        message: String,
    },

    /// An upstream signalled throttling. Outbound calls to that source pause
    /// for at least the floor; per-token retries continue on the next tick.
    Throttled {
        source: &'static str,
        retry_after: Option<Duration>,
    },

    /// The risk provider has never indexed this mint. A normal outcome.
    NotIndexed,

    /// The persistent store rejected a write; the tick counts as failed and
    /// no write took effect.
    Persistence(String),

    /// The cache store is unreachable or returned an error.
    Cache(String),

    /// REST input validation failure; surfaces as HTTP 400.
    BadRequest(String),
}

impl TrackerError {
    pub fn invalid_mint(reason: impl Into<String>) -> Self {
        TrackerError::InvalidMint {
            reason: reason.into(),
        }
    }

    pub fn chain(message: impl Into<String>) -> Self {
        TrackerError::ChainUnavailable {
            message: message.into(),
        }
    }

    pub fn upstream(source: &'static str, message: impl Into<String>) -> Self {
        TrackerError::UpstreamUnavailable {
            source,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        TrackerError::BadRequest(message.into())
    }

    /// Transient errors are logged and skipped; they never mutate state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrackerError::ChainUnavailable { .. }
                | TrackerError::UpstreamUnavailable { .. }
                | TrackerError::Throttled { .. }
                | TrackerError::Cache(_)
        )
    }
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::InvalidMint { reason } => write!(f, "invalid mint: {}", reason),
            TrackerError::ChainUnavailable { message } => {
                write!(f, "chain unavailable: {}", message)
            }
            TrackerError::UpstreamUnavailable { source, message } => {
                write!(f, "upstream {} unavailable: {}", source, message)
            }
            TrackerError::Throttled {
                source,
                retry_after,
            } => match retry_after {
                Some(wait) => write!(f, "throttled by {} (retry after {:?})", source, wait),
                None => write!(f, "throttled by {}", source),
            },
            TrackerError::NotIndexed => write!(f, "mint not indexed"),
            TrackerError::Persistence(message) => write!(f, "persistence error: {}", message),
            TrackerError::Cache(message) => write!(f, "cache error: {}", message),
            TrackerError::BadRequest(message) => write!(f, "bad request: {}", message),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Persistence(err.to_string())
    }
}

impl From<redis::RedisError> for TrackerError {
    fn from(err: redis::RedisError) -> Self {
        TrackerError::Cache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TrackerError::chain("timeout").is_transient());
        assert!(TrackerError::upstream("dexscreener", "503").is_transient());
        assert!(TrackerError::Throttled {
            source: "rugcheck",
            retry_after: None
        }
        .is_transient());
        assert!(!TrackerError::invalid_mint("bad base58").is_transient());
        assert!(!TrackerError::Persistence("disk full".into()).is_transient());
        assert!(!TrackerError::BadRequest("limit too large".into()).is_transient());
    }
}
