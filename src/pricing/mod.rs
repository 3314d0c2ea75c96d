//! Pricing engine
//!
//! Composes the quote sources and the chain adapter into snapshots: supply,
//! the mint's native-coin price and the native/USD price are fetched in
//! parallel, then persisted and published in that order. The persistence pair
//! (latest + history) commits in one transaction before the publication goes
//! out, so every `price_update` on the wire has matching rows behind it.

use crate::cache::CacheStore;
use crate::chain::ChainClient;
use crate::constants::*;
use crate::database::Database;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::marketdata::{DexScreenerProvider, QuoteSource, RaydiumPoolsProvider};
use crate::services::Metrics;
use crate::types::{PriceSnapshot, PoolMarket};
use crate::validator::TokenValidator;
use chrono::Utc;
use std::sync::Arc;

pub struct PricingEngine {
    chain: Arc<ChainClient>,
    aggregator: Arc<DexScreenerProvider>,
    fallback: Arc<RaydiumPoolsProvider>,
    cache: Arc<CacheStore>,
    db: Arc<Database>,
    validator: Arc<TokenValidator>,
    metrics: Arc<Metrics>,
}

impl PricingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<ChainClient>,
        aggregator: Arc<DexScreenerProvider>,
        fallback: Arc<RaydiumPoolsProvider>,
        cache: Arc<CacheStore>,
        db: Arc<Database>,
        validator: Arc<TokenValidator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            chain,
            aggregator,
            fallback,
            cache,
            db,
            validator,
            metrics,
        }
    }

    // =========================================================================
    // SNAPSHOT COMPOSITION
    // =========================================================================

    /// Price a mint without touching persistence.
    pub async fn price_of(&self, mint: &str) -> TrackerResult<PriceSnapshot> {
        let (supply_ui, price_native, native_usd) = if mint == NATIVE_MINT {
            let native_usd = self.native_usd_price().await?;
            (NATIVE_SUPPLY_UI, 1.0, native_usd)
        } else {
            let (supply, price_native, native_usd) = tokio::try_join!(
                self.chain.read_supply(mint),
                self.native_price_for_mint(mint),
                self.native_usd_price(),
            )?;
            (supply.ui_amount(), price_native, native_usd)
        };

        let price_usd = price_native * native_usd;
        Ok(PriceSnapshot {
            mint: mint.to_string(),
            price_usd,
            price_native,
            market_cap: (price_usd * supply_ui).max(0.0),
            total_supply: supply_ui,
            as_of: Utc::now(),
        })
    }

    /// The mint's price in native-coin units, with a short positive cache.
    /// Source order: aggregator, pools API, on-chain reserves.
    async fn native_price_for_mint(&self, mint: &str) -> TrackerResult<f64> {
        if mint == NATIVE_MINT {
            return Ok(1.0);
        }

        let cache_key = format!("{}{}", NATIVE_PRICE_KEY_PREFIX, mint);
        if let Some(cached) = self.cache.get(&cache_key).await.unwrap_or(None) {
            if let Ok(price) = cached.parse::<f64>() {
                if price > 0.0 {
                    return Ok(price);
                }
            }
        }

        let price = self.native_price_uncached(mint).await?;
        let _ = self
            .cache
            .set_with_ttl(&cache_key, &price.to_string(), NATIVE_PRICE_CACHE_TTL_SECS)
            .await;
        Ok(price)
    }

    async fn native_price_uncached(&self, mint: &str) -> TrackerResult<f64> {
        match self.aggregator.single_quote(mint).await {
            Ok(Some(quote)) if quote.price_native > 0.0 => return Ok(quote.price_native),
            Ok(_) => {}
            Err(err) => logger::debug(
                LogTag::Pricing,
                &format!("aggregator miss for {}: {}", short_mint(mint), err),
            ),
        }

        match self.fallback.single_quote(mint).await {
            Ok(Some(quote)) if quote.price_native > 0.0 => return Ok(quote.price_native),
            Ok(_) => {}
            Err(err) => logger::debug(
                LogTag::Pricing,
                &format!("pools api miss for {}: {}", short_mint(mint), err),
            ),
        }

        self.pool_native_price(mint).await
    }

    /// Derive the price from on-chain reserves: deepest qualifying pool of
    /// (mint, native), measured by the USD value of its native-side vault.
    async fn pool_native_price(&self, mint: &str) -> TrackerResult<f64> {
        let pools = self.chain.find_pools_for_pair(mint, NATIVE_MINT).await?;
        if pools.is_empty() {
            return Err(TrackerError::upstream(
                "pricing",
                format!("no market found for {}", short_mint(mint)),
            ));
        }

        let native_usd = self.native_usd_price().await?;
        let mut best: Option<(f64, f64)> = None; // (reserve value USD, price)

        let reserve_reads = pools
            .iter()
            .map(|pool: &PoolMarket| self.chain.read_pool_reserves(&pool.pool_addr, mint));
        for result in futures::future::join_all(reserve_reads).await {
            let reserves = match result {
                Ok(reserves) => reserves,
                Err(err) => {
                    logger::debug(LogTag::Pricing, &format!("reserve read failed: {}", err));
                    continue;
                }
            };
            let reserve_value_usd = reserves.quote_ui() * native_usd;
            if reserve_value_usd < MIN_POOL_RESERVE_USD {
                continue;
            }
            if let Some(price) = reserves.spot_price() {
                if best.map(|(value, _)| reserve_value_usd > value).unwrap_or(true) {
                    best = Some((reserve_value_usd, price));
                }
            }
        }

        best.map(|(_, price)| price).ok_or_else(|| {
            TrackerError::upstream(
                "pricing",
                format!("no pool deep enough for {}", short_mint(mint)),
            )
        })
    }

    /// Native-coin USD price, cached for up to 30 s and shared (via the cache
    /// store) with the quote providers.
    pub async fn native_usd_price(&self) -> TrackerResult<f64> {
        if let Some(cached) = self.cache.get(NATIVE_USD_KEY).await.unwrap_or(None) {
            if let Ok(price) = cached.parse::<f64>() {
                if price > 0.0 {
                    return Ok(price);
                }
            }
        }

        let price = match self.aggregator.native_usd_price().await {
            Ok(Some(price)) if price > 0.0 => price,
            other => {
                if let Err(err) = other {
                    logger::debug(LogTag::Pricing, &format!("aggregator native/usd: {}", err));
                }
                match self.native_usd_from_chain().await {
                    Ok(price) => price,
                    Err(err) => {
                        logger::warning(
                            LogTag::Pricing,
                            &format!("native/usd fell back to constant: {}", err),
                        );
                        NATIVE_USD_FALLBACK
                    }
                }
            }
        };

        let _ = self
            .cache
            .set_with_ttl(NATIVE_USD_KEY, &price.to_string(), NATIVE_USD_CACHE_TTL_SECS)
            .await;
        Ok(price)
    }

    async fn native_usd_from_chain(&self) -> TrackerResult<f64> {
        let pools = self
            .chain
            .find_pools_for_pair(NATIVE_MINT, STABLE_MINT)
            .await?;

        let mut best: Option<(f64, f64)> = None;
        for pool in &pools {
            let reserves = match self
                .chain
                .read_pool_reserves(&pool.pool_addr, NATIVE_MINT)
                .await
            {
                Ok(reserves) => reserves,
                Err(_) => continue,
            };
            // Quote side is the stable, so its vault value is already USD.
            let reserve_value_usd = reserves.quote_ui();
            if reserve_value_usd < MIN_POOL_RESERVE_USD {
                continue;
            }
            if let Some(price) = reserves.spot_price() {
                if best.map(|(value, _)| reserve_value_usd > value).unwrap_or(true) {
                    best = Some((reserve_value_usd, price));
                }
            }
        }

        best.map(|(_, price)| price)
            .ok_or_else(|| TrackerError::upstream("pricing", "no native/stable pool deep enough"))
    }

    // =========================================================================
    // UPDATE OPERATIONS
    // =========================================================================

    /// Validate, price, persist (one transaction), publish. `InvalidMint`
    /// propagates upward after the purge so the scheduler can ban and cancel.
    pub async fn update_mint(&self, mint: &str) -> TrackerResult<PriceSnapshot> {
        if let Err(err) = self.validator.validate(mint).await {
            if let TrackerError::InvalidMint { .. } = err {
                if let Err(purge_err) = self.validator.purge_invalid(mint).await {
                    logger::warning(
                        LogTag::Pricing,
                        &format!("purge of {} incomplete: {}", short_mint(mint), purge_err),
                    );
                }
                self.metrics.invalid_mints.inc();
            }
            return Err(err);
        }
        self.commit_snapshot(mint).await
    }

    async fn commit_snapshot(&self, mint: &str) -> TrackerResult<PriceSnapshot> {
        let snapshot = self.price_of(mint).await?;

        self.db.record_snapshot(&snapshot)?;
        self.metrics.price_updates.inc();

        // Fire-and-forget: a pub/sub failure never unwinds a committed write.
        match serde_json::to_string(&snapshot) {
            Ok(payload) => {
                if let Err(err) = self.cache.publish(PRICE_UPDATE_CHANNEL, &payload).await {
                    logger::warning(
                        LogTag::Pricing,
                        &format!("publish for {} failed: {}", short_mint(mint), err),
                    );
                }
            }
            Err(err) => logger::error(
                LogTag::Pricing,
                &format!("snapshot for {} unserialisable: {}", short_mint(mint), err),
            ),
        }

        Ok(snapshot)
    }

    /// Update many mints at once: validate-and-purge the input, warm the
    /// per-mint native-price cache through one aggregator batch, then run the
    /// normal persist-then-publish path per mint (which falls back per-mint
    /// when the batch had no quote). Returns the number of committed updates.
    pub async fn batch_update(&self, mints: &[String]) -> usize {
        let outcome = self.validator.validate_batch(mints).await;
        if outcome.valid.is_empty() {
            return 0;
        }

        match self.aggregator.batch_quotes(&outcome.valid).await {
            Ok(quotes) => {
                for (mint, quote) in &quotes {
                    if quote.price_native > 0.0 {
                        let _ = self
                            .cache
                            .set_with_ttl(
                                &format!("{}{}", NATIVE_PRICE_KEY_PREFIX, mint),
                                &quote.price_native.to_string(),
                                NATIVE_PRICE_CACHE_TTL_SECS,
                            )
                            .await;
                    }
                }
            }
            Err(err) => logger::warning(
                LogTag::Pricing,
                &format!("batch quote failed, falling back per-mint: {}", err),
            ),
        }

        let mut committed = 0;
        for mint in &outcome.valid {
            match self.commit_snapshot(mint).await {
                Ok(_) => committed += 1,
                Err(err) => {
                    self.metrics.update_failures.inc();
                    logger::debug(
                        LogTag::Pricing,
                        &format!("batch update of {} failed: {}", short_mint(mint), err),
                    );
                }
            }
        }
        committed
    }

    /// Most recent committed snapshot, if any.
    pub async fn current_of(&self, mint: &str) -> TrackerResult<Option<PriceSnapshot>> {
        self.db.get_latest(mint)
    }
}
