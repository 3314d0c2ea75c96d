/// Raydium pools API provider
///
/// Lighter secondary source: asks the pools endpoint for the single deepest
/// pool of `(mint, native)`, falling back to `(mint, stable)` on a miss. The
/// pricing engine consults it only when the aggregator is unavailable or
/// returned nothing usable.
use crate::cache::CacheStore;
use crate::constants::*;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::marketdata::QuoteSource;
use crate::types::Quote;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SOURCE_ID: &str = "raydium-api";

#[derive(Debug, Deserialize)]
struct PoolsEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<PoolsPage>,
}

#[derive(Debug, Deserialize)]
struct PoolsPage {
    #[serde(default)]
    data: Vec<ApiPool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPool {
    id: String,
    /// Amount of mintB per one mintA.
    price: f64,
    #[serde(default)]
    tvl: f64,
    day: Option<PoolDay>,
    mint_a: ApiPoolMint,
    mint_b: ApiPoolMint,
}

#[derive(Debug, Deserialize)]
struct PoolDay {
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct ApiPoolMint {
    address: String,
}

pub struct RaydiumPoolsProvider {
    http: reqwest::Client,
    cache: Arc<CacheStore>,
    backoff_until: Mutex<Option<Instant>>,
}

impl RaydiumPoolsProvider {
    pub fn new(cache: Arc<CacheStore>) -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;
        Ok(Self {
            http,
            cache,
            backoff_until: Mutex::new(None),
        })
    }

    async fn check_backoff(&self) -> TrackerResult<()> {
        let backoff = self.backoff_until.lock().await;
        if let Some(until) = *backoff {
            let now = Instant::now();
            if now < until {
                return Err(TrackerError::Throttled {
                    source: SOURCE_ID,
                    retry_after: Some(until - now),
                });
            }
        }
        Ok(())
    }

    async fn fetch_pool(&self, mint: &str, quote: &str) -> TrackerResult<Option<ApiPool>> {
        self.check_backoff().await?;

        let url = format!(
            "{}/pools/info/mint?mint1={}&mint2={}&poolType=all&poolSortField=liquidity&sortType=desc&pageSize=1&page=1",
            RAYDIUM_API_BASE, mint, quote
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or_default()
                .max(Duration::from_secs(THROTTLE_FLOOR_SECS));
            *self.backoff_until.lock().await = Some(Instant::now() + retry_after);
            return Err(TrackerError::Throttled {
                source: SOURCE_ID,
                retry_after: Some(retry_after),
            });
        }
        if !response.status().is_success() {
            return Err(TrackerError::upstream(
                SOURCE_ID,
                format!("http {}", response.status()),
            ));
        }

        let envelope: PoolsEnvelope = response
            .json()
            .await
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;
        if !envelope.success {
            return Err(TrackerError::upstream(SOURCE_ID, "unsuccessful response"));
        }
        Ok(envelope.data.map(|page| page.data).and_then(|mut pools| {
            if pools.is_empty() {
                None
            } else {
                Some(pools.remove(0))
            }
        }))
    }

    async fn cached_native_usd(&self) -> f64 {
        self.cache
            .get(NATIVE_USD_KEY)
            .await
            .ok()
            .flatten()
            .and_then(|raw| raw.parse().ok())
            .filter(|value: &f64| *value > 0.0)
            .unwrap_or(NATIVE_USD_FALLBACK)
    }

    fn quote_from_pool(mint: &str, quote_mint: &str, pool: &ApiPool, native_usd: f64) -> Option<Quote> {
        // `price` is mintB per mintA; invert when the tracked mint sits on
        // the B side.
        let price_in_quote = if pool.mint_a.address == mint {
            pool.price
        } else if pool.mint_b.address == mint {
            if pool.price <= 0.0 {
                return None;
            }
            1.0 / pool.price
        } else {
            return None;
        };
        if !price_in_quote.is_finite() || price_in_quote <= 0.0 {
            return None;
        }

        let (price_native, price_usd) = if quote_mint == NATIVE_MINT {
            (price_in_quote, price_in_quote * native_usd)
        } else {
            (price_in_quote / native_usd, price_in_quote)
        };

        Some(Quote {
            mint: mint.to_string(),
            price_usd,
            price_native,
            market_cap: 0.0,
            liquidity_usd: pool.tvl,
            volume_24h: pool.day.as_ref().map(|day| day.volume).unwrap_or(0.0),
            venue_id: "raydium".to_string(),
            pair_id: pool.id.clone(),
            as_of: Utc::now(),
        })
    }
}

#[async_trait]
impl QuoteSource for RaydiumPoolsProvider {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn batch_quotes(&self, mints: &[String]) -> TrackerResult<HashMap<String, Quote>> {
        // Secondary source: no batch endpoint, so drain sequentially and stop
        // early when throttled.
        let mut quotes = HashMap::new();
        for mint in mints {
            match self.single_quote(mint).await {
                Ok(Some(quote)) => {
                    quotes.insert(mint.clone(), quote);
                }
                Ok(None) => {}
                Err(err @ TrackerError::Throttled { .. }) => return Err(err),
                Err(err) => {
                    logger::debug(
                        LogTag::Market,
                        &format!("pools api miss for {}: {}", short_mint(mint), err),
                    );
                }
            }
        }
        Ok(quotes)
    }

    async fn single_quote(&self, mint: &str) -> TrackerResult<Option<Quote>> {
        let native_usd = self.cached_native_usd().await;

        for quote_mint in [NATIVE_MINT, STABLE_MINT] {
            if mint == quote_mint {
                continue;
            }
            if let Some(pool) = self.fetch_pool(mint, quote_mint).await? {
                if let Some(quote) = Self::quote_from_pool(mint, quote_mint, &pool, native_usd) {
                    return Ok(Some(quote));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(mint_a: &str, mint_b: &str, price: f64) -> ApiPool {
        ApiPool {
            id: "pool-1".to_string(),
            price,
            tvl: 25_000.0,
            day: Some(PoolDay { volume: 4_000.0 }),
            mint_a: ApiPoolMint {
                address: mint_a.to_string(),
            },
            mint_b: ApiPoolMint {
                address: mint_b.to_string(),
            },
        }
    }

    #[test]
    fn price_inverts_when_mint_is_on_the_b_side() {
        let direct = pool("MintA", NATIVE_MINT, 0.02);
        let quote =
            RaydiumPoolsProvider::quote_from_pool("MintA", NATIVE_MINT, &direct, 150.0).unwrap();
        assert!((quote.price_native - 0.02).abs() < 1e-12);
        assert!((quote.price_usd - 3.0).abs() < 1e-12);

        let flipped = pool(NATIVE_MINT, "MintA", 50.0);
        let quote =
            RaydiumPoolsProvider::quote_from_pool("MintA", NATIVE_MINT, &flipped, 150.0).unwrap();
        assert!((quote.price_native - 0.02).abs() < 1e-12);
    }

    #[test]
    fn stable_quoted_pool_derives_native_price() {
        let stable_pool = pool("MintA", STABLE_MINT, 3.0);
        let quote =
            RaydiumPoolsProvider::quote_from_pool("MintA", STABLE_MINT, &stable_pool, 150.0)
                .unwrap();
        assert!((quote.price_usd - 3.0).abs() < 1e-12);
        assert!((quote.price_native - 0.02).abs() < 1e-12);
    }

    #[test]
    fn foreign_pool_yields_nothing() {
        let other = pool("MintX", NATIVE_MINT, 1.0);
        assert!(RaydiumPoolsProvider::quote_from_pool("MintA", NATIVE_MINT, &other, 150.0).is_none());
    }
}
