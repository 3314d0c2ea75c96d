/// DexScreener aggregator provider
///
/// Batches up to 30 mints per request with a 200 ms floor between outbound
/// calls. When the upstream returns several pairs for one mint, pair
/// selection runs in a fixed order: launch-venue gate, per-venue
/// liquidity/volume thresholds, quote-side preference (native, then stable),
/// and finally a weighted score to break ties.
use crate::cache::CacheStore;
use crate::constants::*;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::marketdata::{QuoteSource, TokenIdentity};
use crate::types::Quote;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SOURCE_ID: &str = "dexscreener";

// =============================================================================
// UPSTREAM RESPONSE SHAPE
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DexPair {
    pub dex_id: String,
    pub pair_address: String,
    pub labels: Vec<String>,
    pub base_token: PairToken,
    pub quote_token: PairToken,
    pub price_native: Option<String>,
    pub price_usd: Option<String>,
    pub liquidity: Option<PairLiquidity>,
    pub volume: Option<PairVolume>,
    pub txns: Option<PairTxns>,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairToken {
    #[serde(default)]
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairLiquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairVolume {
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairTxns {
    pub h24: Option<TxnCounts>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxnCounts {
    pub buys: Option<u64>,
    pub sells: Option<u64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn volume_24h(&self) -> f64 {
        self.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0)
    }

    fn txn_count_24h(&self) -> u64 {
        self.txns
            .as_ref()
            .and_then(|t| t.h24.as_ref())
            .map(|c| c.buys.unwrap_or(0) + c.sells.unwrap_or(0))
            .unwrap_or(0)
    }

    fn price_usd_value(&self) -> Option<f64> {
        parse_price(self.price_usd.as_deref())
    }

    fn price_native_value(&self) -> Option<f64> {
        parse_price(self.price_native.as_deref())
    }
}

fn parse_price(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.parse().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

// =============================================================================
// PAIR SELECTION
// =============================================================================

fn is_launch_like(pair: &DexPair) -> bool {
    let dex = pair.dex_id.to_ascii_lowercase();
    LAUNCH_VENUES.iter().any(|venue| dex.contains(venue))
        || pair
            .labels
            .iter()
            .any(|label| LAUNCH_VENUES.iter().any(|venue| label.eq_ignore_ascii_case(venue)))
}

fn is_established_venue(dex_id: &str) -> bool {
    let dex = dex_id.to_ascii_lowercase();
    ESTABLISHED_VENUES.iter().any(|venue| dex == *venue)
}

/// Venue-dependent admission thresholds, applied before any scoring.
fn passes_filters(pair: &DexPair) -> bool {
    let liquidity = pair.liquidity_usd();
    let volume = pair.volume_24h();

    if is_launch_like(pair) {
        return volume > LAUNCH_MIN_VOLUME_24H && liquidity > LAUNCH_MIN_LIQUIDITY;
    }
    if is_established_venue(&pair.dex_id) {
        return liquidity >= PAIR_MIN_LIQUIDITY;
    }
    liquidity >= PAIR_MIN_LIQUIDITY && volume >= PAIR_MIN_VOLUME_24H
}

/// Tie-break score. Weights favour traded volume slightly over book depth,
/// with flat bonuses for established venues and visible activity.
fn pair_score(pair: &DexPair) -> f64 {
    let liquidity = pair.liquidity_usd();
    let volume = pair.volume_24h();
    let txns = pair.txn_count_24h() as f64;

    let mut score = 0.3 * liquidity + 0.4 * volume + 0.3 * (200.0 * txns);

    if is_established_venue(&pair.dex_id) {
        score += 50_000.0;
    }

    if is_launch_like(pair) {
        score -= if volume > 100_000.0 { 10_000.0 } else { 100_000.0 };
    }

    if liquidity > 0.0 && volume / liquidity > 0.1 {
        score += 15_000.0;
    }
    if pair.txn_count_24h() > 50 {
        score += 5_000.0;
    }

    score
}

/// Choose the pair that prices `mint`: admission filters first, then
/// native-quoted pairs, then stable-quoted, then best score overall.
pub(crate) fn select_best_pair<'a>(mint: &str, pairs: &'a [DexPair]) -> Option<&'a DexPair> {
    let candidates: Vec<&DexPair> = pairs
        .iter()
        .filter(|pair| pair.base_token.address == mint)
        .filter(|pair| passes_filters(pair))
        .collect();

    let best_of = |subset: Vec<&'a DexPair>| -> Option<&'a DexPair> {
        subset
            .into_iter()
            .max_by(|a, b| pair_score(a).total_cmp(&pair_score(b)))
    };

    let native_quoted: Vec<&DexPair> = candidates
        .iter()
        .copied()
        .filter(|pair| pair.quote_token.address == NATIVE_MINT)
        .collect();
    if !native_quoted.is_empty() {
        return best_of(native_quoted);
    }

    let stable_quoted: Vec<&DexPair> = candidates
        .iter()
        .copied()
        .filter(|pair| pair.quote_token.address == STABLE_MINT)
        .collect();
    if !stable_quoted.is_empty() {
        return best_of(stable_quoted);
    }

    best_of(candidates)
}

/// Build the quote from the chosen pair. A missing `priceNative` is derived
/// as `priceUsd / nativeUsd` when the current native price is known.
fn quote_from_pair(mint: &str, pair: &DexPair, native_usd: Option<f64>) -> Option<Quote> {
    let price_usd = pair.price_usd_value()?;
    let price_native = match pair.price_native_value() {
        Some(value) => value,
        None => {
            let native_usd = native_usd.filter(|value| *value > 0.0)?;
            price_usd / native_usd
        }
    };

    Some(Quote {
        mint: mint.to_string(),
        price_usd,
        price_native,
        market_cap: pair.market_cap.unwrap_or(0.0).max(0.0),
        liquidity_usd: pair.liquidity_usd(),
        volume_24h: pair.volume_24h(),
        venue_id: pair.dex_id.clone(),
        pair_id: pair.pair_address.clone(),
        as_of: Utc::now(),
    })
}

// =============================================================================
// PROVIDER
// =============================================================================

pub struct DexScreenerProvider {
    http: reqwest::Client,
    cache: Arc<CacheStore>,
    quote_ttl_secs: u64,
    last_call: Mutex<Option<Instant>>,
    backoff_until: Mutex<Option<Instant>>,
}

impl DexScreenerProvider {
    pub fn new(cache: Arc<CacheStore>, quote_ttl_secs: u64) -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;
        Ok(Self {
            http,
            cache,
            quote_ttl_secs,
            last_call: Mutex::new(None),
            backoff_until: Mutex::new(None),
        })
    }

    /// Enforce the provider-wide backoff and the 200 ms call floor. The lock
    /// is held only to read/update timestamps, never across the request.
    async fn gate(&self) -> TrackerResult<()> {
        {
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
        }

        let wait = {
            let mut last = self.last_call.lock().await;
            let gap = Duration::from_millis(AGGREGATOR_MIN_CALL_GAP_MS);
            let wait = match *last {
                Some(prev) => gap.saturating_sub(prev.elapsed()),
                None => Duration::ZERO,
            };
            *last = Some(Instant::now() + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    async fn note_throttled(&self, retry_after: Option<Duration>) -> TrackerError {
        let pause = retry_after
            .unwrap_or_default()
            .max(Duration::from_secs(THROTTLE_FLOOR_SECS));
        let mut backoff = self.backoff_until.lock().await;
        *backoff = Some(Instant::now() + pause);
        logger::warning(
            LogTag::Market,
            &format!("dexscreener throttled, pausing {:?}", pause),
        );
        TrackerError::Throttled {
            source: SOURCE_ID,
            retry_after: Some(pause),
        }
    }

    async fn fetch_pairs(&self, mints: &[String]) -> TrackerResult<Vec<DexPair>> {
        self.gate().await?;

        let url = format!("{}/tokens/{}", DEXSCREENER_API_BASE, mints.join(","));
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(UPSTREAM_BATCH_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(self.note_throttled(retry_after).await);
        }
        if !response.status().is_success() {
            return Err(TrackerError::upstream(
                SOURCE_ID,
                format!("http {}", response.status()),
            ));
        }

        let payload: PairsResponse = response
            .json()
            .await
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;
        Ok(payload.pairs.unwrap_or_default())
    }

    async fn cached_native_usd(&self) -> Option<f64> {
        self.cache
            .get(NATIVE_USD_KEY)
            .await
            .ok()
            .flatten()
            .and_then(|raw| raw.parse().ok())
    }

    fn quote_cache_key(mint: &str) -> String {
        format!("{}{}:{}", QUOTE_KEY_PREFIX, SOURCE_ID, mint)
    }

    /// Current native/USD price from the aggregator itself: best
    /// stable-quoted pair for the native mint.
    pub async fn native_usd_price(&self) -> TrackerResult<Option<f64>> {
        let pairs = self.fetch_pairs(&[NATIVE_MINT.to_string()]).await?;
        let best = pairs
            .iter()
            .filter(|pair| {
                pair.base_token.address == NATIVE_MINT
                    && pair.quote_token.address == STABLE_MINT
                    && passes_filters(pair)
            })
            .max_by(|a, b| pair_score(a).total_cmp(&pair_score(b)));
        Ok(best.and_then(|pair| pair.price_usd_value()))
    }

    async fn remember(&self, mint: &str, quote: &Quote, pair: &DexPair) {
        let _ = self
            .cache
            .set_json_with_ttl(&Self::quote_cache_key(mint), quote, self.quote_ttl_secs)
            .await;

        // Capture display metadata while we have it.
        if pair.base_token.name.is_some() || pair.base_token.symbol.is_some() {
            let identity = TokenIdentity {
                name: pair.base_token.name.clone(),
                symbol: pair.base_token.symbol.clone(),
            };
            let _ = self
                .cache
                .set_json_with_ttl(
                    &format!("{}{}", TOKEN_INFO_KEY_PREFIX, mint),
                    &identity,
                    TOKEN_INFO_CACHE_TTL_SECS,
                )
                .await;
        }
    }
}

#[async_trait]
impl QuoteSource for DexScreenerProvider {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn batch_quotes(&self, mints: &[String]) -> TrackerResult<HashMap<String, Quote>> {
        let mut quotes = HashMap::new();
        let mut misses = Vec::new();

        for mint in mints {
            match self
                .cache
                .get_json::<Quote>(&Self::quote_cache_key(mint))
                .await
                .unwrap_or(None)
            {
                Some(quote) => {
                    quotes.insert(mint.clone(), quote);
                }
                None => misses.push(mint.clone()),
            }
        }
        if misses.is_empty() {
            return Ok(quotes);
        }

        let native_usd = self.cached_native_usd().await;
        for chunk in misses.chunks(AGGREGATOR_BATCH_SIZE) {
            let pairs = self.fetch_pairs(chunk).await?;

            // Group pairs by their base mint so selection sees the full set.
            let mut by_mint: HashMap<&str, Vec<&DexPair>> = HashMap::new();
            for pair in &pairs {
                by_mint
                    .entry(pair.base_token.address.as_str())
                    .or_default()
                    .push(pair);
            }

            for mint in chunk {
                let mint_pairs: Vec<DexPair> = by_mint
                    .get(mint.as_str())
                    .map(|pairs| pairs.iter().map(|p| (*p).clone()).collect())
                    .unwrap_or_default();
                if let Some(best) = select_best_pair(mint, &mint_pairs) {
                    if let Some(quote) = quote_from_pair(mint, best, native_usd) {
                        self.remember(mint, &quote, best).await;
                        quotes.insert(mint.clone(), quote);
                        continue;
                    }
                }
                logger::debug(
                    LogTag::Market,
                    &format!("no usable pair for {}", short_mint(mint)),
                );
            }
        }

        Ok(quotes)
    }

    async fn single_quote(&self, mint: &str) -> TrackerResult<Option<Quote>> {
        let mints = [mint.to_string()];
        let mut quotes = self.batch_quotes(&mints).await?;
        Ok(quotes.remove(mint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(
        dex_id: &str,
        quote: &str,
        liquidity: f64,
        volume: f64,
        txns: u64,
        price_usd: &str,
    ) -> DexPair {
        DexPair {
            dex_id: dex_id.to_string(),
            pair_address: format!("{}-pair", dex_id),
            base_token: PairToken {
                address: "MintA".to_string(),
                name: Some("Token A".to_string()),
                symbol: Some("TKA".to_string()),
            },
            quote_token: PairToken {
                address: quote.to_string(),
                ..Default::default()
            },
            price_native: Some("0.01".to_string()),
            price_usd: Some(price_usd.to_string()),
            liquidity: Some(PairLiquidity { usd: Some(liquidity) }),
            volume: Some(PairVolume { h24: Some(volume) }),
            txns: Some(PairTxns {
                h24: Some(TxnCounts {
                    buys: Some(txns / 2),
                    sells: Some(txns - txns / 2),
                }),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn launch_pairs_need_both_thresholds() {
        let weak = pair("pumpfun", NATIVE_MINT, 4_000.0, 2_000.0, 10, "1.5");
        assert!(!passes_filters(&weak));

        let thin = pair("pumpfun", NATIVE_MINT, 6_000.0, 500.0, 10, "1.5");
        assert!(!passes_filters(&thin));

        let strong = pair("pumpfun", NATIVE_MINT, 6_000.0, 2_000.0, 10, "1.5");
        assert!(passes_filters(&strong));
    }

    #[test]
    fn established_venues_waive_the_volume_requirement() {
        let quiet = pair("raydium", NATIVE_MINT, 600.0, 0.0, 0, "1.5");
        assert!(passes_filters(&quiet));

        let shallow = pair("raydium", NATIVE_MINT, 400.0, 50_000.0, 100, "1.5");
        assert!(!passes_filters(&shallow));
    }

    #[test]
    fn unknown_venues_need_liquidity_and_volume() {
        let quiet = pair("fluxbeam", NATIVE_MINT, 600.0, 50.0, 5, "1.5");
        assert!(!passes_filters(&quiet));

        let active = pair("fluxbeam", NATIVE_MINT, 600.0, 150.0, 5, "1.5");
        assert!(passes_filters(&active));
    }

    #[test]
    fn native_quote_beats_higher_scoring_stable_quote() {
        let native = pair("raydium", NATIVE_MINT, 1_000.0, 500.0, 10, "1.5");
        let stable = pair("orca", STABLE_MINT, 900_000.0, 900_000.0, 900, "1.6");
        let pairs = vec![stable, native];

        let best = select_best_pair("MintA", &pairs).unwrap();
        assert_eq!(best.quote_token.address, NATIVE_MINT);
    }

    #[test]
    fn stable_quote_preferred_when_no_native_pair() {
        let stable = pair("orca", STABLE_MINT, 1_000.0, 500.0, 10, "1.5");
        let other = pair("fluxbeam", "SomeOtherQuote", 900_000.0, 900_000.0, 900, "1.6");
        let pairs = vec![other, stable];

        let best = select_best_pair("MintA", &pairs).unwrap();
        assert_eq!(best.quote_token.address, STABLE_MINT);
    }

    #[test]
    fn score_breaks_ties_within_a_quote_group() {
        let small = pair("raydium", NATIVE_MINT, 1_000.0, 500.0, 10, "1.5");
        let large = pair("orca", NATIVE_MINT, 50_000.0, 80_000.0, 400, "1.5");
        let pairs = vec![small, large];

        let best = select_best_pair("MintA", &pairs).unwrap();
        assert_eq!(best.dex_id, "orca");
    }

    #[test]
    fn launch_penalty_shrinks_with_real_volume() {
        let hot = pair("pumpfun", NATIVE_MINT, 10_000.0, 200_000.0, 100, "1.5");
        let cold = pair("pumpfun", NATIVE_MINT, 10_000.0, 2_000.0, 100, "1.5");
        assert!(pair_score(&hot) > pair_score(&cold));
        // The cold launch pair eats the full penalty.
        assert!(pair_score(&cold) < pair_score(&pair("raydium", NATIVE_MINT, 10_000.0, 2_000.0, 100, "1.5")));
    }

    #[test]
    fn missing_price_native_derives_from_native_usd() {
        let mut p = pair("raydium", STABLE_MINT, 10_000.0, 5_000.0, 100, "3.0");
        p.price_native = None;

        let quote = quote_from_pair("MintA", &p, Some(150.0)).unwrap();
        assert!((quote.price_native - 0.02).abs() < 1e-12);
        assert_eq!(quote.price_usd, 3.0);

        // Without a native price there is nothing to derive from.
        assert!(quote_from_pair("MintA", &p, None).is_none());
    }

    #[test]
    fn pairs_for_other_mints_are_ignored() {
        let mut foreign = pair("raydium", NATIVE_MINT, 10_000.0, 5_000.0, 100, "1.5");
        foreign.base_token.address = "MintB".to_string();
        assert!(select_best_pair("MintA", &[foreign]).is_none());
    }
}
