//! Scheduler
//!
//! Per-token repeating price jobs with cluster-wide dedupe, ban propagation
//! and graceful removal. A dispatcher ticks at the configured period and
//! hands each registered job to a bounded worker pool; a per-mint in-flight
//! set keeps ticks for the same mint strictly sequential, which is what makes
//! per-mint `price_update` ordering equal commit ordering.

pub mod queue;

pub use queue::{job_id_for, JobPayload, JobQueue, JobState, RepeatingJob, JOB_ID_PREFIX};

use crate::cache::CacheStore;
use crate::constants::*;
use crate::database::Database;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::pricing::PricingEngine;
use crate::services::Metrics;
use crate::validator::TokenValidator;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Repeating-job period.
    pub period_ms: u64,
    /// Worker pool size.
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_JOB_PERIOD_MS,
            workers: DEFAULT_WORKER_COUNT,
        }
    }
}

/// Ban marker for a mint; owned by the scheduler.
pub fn banned_key(mint: &str) -> String {
    format!("{}{}", BAN_KEY_PREFIX, mint)
}

pub struct Scheduler {
    queue: JobQueue,
    engine: Arc<PricingEngine>,
    validator: Arc<TokenValidator>,
    cache: Arc<CacheStore>,
    db: Arc<Database>,
    metrics: Arc<Metrics>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
    in_flight: DashSet<String>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<PricingEngine>,
        validator: Arc<TokenValidator>,
        cache: Arc<CacheStore>,
        db: Arc<Database>,
        metrics: Arc<Metrics>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.workers));
        Arc::new(Self {
            queue: JobQueue::new(cache.clone()),
            engine,
            validator,
            cache,
            db,
            metrics,
            config,
            permits,
            in_flight: DashSet::new(),
        })
    }

    pub async fn is_banned(&self, mint: &str) -> bool {
        self.cache.exists(&banned_key(mint)).await.unwrap_or(false)
    }

    // =========================================================================
    // CONTROL OPERATIONS
    // =========================================================================

    /// Validate, clear any previous trace, then register exactly one
    /// repeating job. Idempotent: a second enrol finds the SET NX already
    /// taken and leaves the single existing job alone.
    pub async fn enrol(&self, mint: &str) -> TrackerResult<()> {
        if self.is_banned(mint).await {
            return Err(TrackerError::invalid_mint("mint is banned"));
        }
        self.validator.validate(mint).await?;

        let job_id = job_id_for(mint);
        // Always clear first so a half-removed job in a degraded queue can
        // never leave two timers behind.
        self.queue.obliterate(&job_id).await;

        let added = self
            .queue
            .add_repeating(
                &job_id,
                JobPayload {
                    mint: mint.to_string(),
                },
                self.config.period_ms,
            )
            .await?;

        if added {
            logger::info(
                LogTag::Scheduler,
                &format!("enrolled {} at {} ms", short_mint(mint), self.config.period_ms),
            );
        } else {
            logger::debug(
                LogTag::Scheduler,
                &format!("{} already enrolled elsewhere", short_mint(mint)),
            );
        }
        Ok(())
    }

    /// Remove every trace of a mint's job across queue states and internal
    /// storage. Never raises.
    pub async fn obliterate(&self, mint: &str) {
        self.queue.obliterate(&job_id_for(mint)).await;
    }

    /// Ban a mint for the TTL, remove its job and purge its persisted rows.
    /// After expiry the validator may readmit it.
    pub async fn ban_and_remove(&self, mint: &str, reason: &str) {
        if let Err(err) = self
            .cache
            .set_with_ttl(&banned_key(mint), reason, BAN_TTL_SECS)
            .await
        {
            logger::error(
                LogTag::Scheduler,
                &format!("ban key for {} failed: {}", short_mint(mint), err),
            );
        }
        self.obliterate(mint).await;
        if let Err(err) = self.db.purge_mint(mint) {
            logger::error(
                LogTag::Scheduler,
                &format!("purge of {} failed: {}", short_mint(mint), err),
            );
        }
        logger::warning(
            LogTag::Scheduler,
            &format!("banned {}: {}", short_mint(mint), reason),
        );
    }

    /// Reconcile on process start: re-enrol every persisted mint that is not
    /// banned; purge the ones that are.
    pub async fn bootstrap(&self) -> TrackerResult<()> {
        let mints = self.db.distinct_latest_mints()?;
        let mut enrolled = 0usize;

        for mint in mints {
            if self.is_banned(&mint).await {
                self.obliterate(&mint).await;
                if let Err(err) = self.db.purge_mint(&mint) {
                    logger::error(
                        LogTag::Scheduler,
                        &format!("bootstrap purge of {} failed: {}", short_mint(&mint), err),
                    );
                }
                continue;
            }
            match self.enrol(&mint).await {
                Ok(()) => enrolled += 1,
                Err(err) => logger::warning(
                    LogTag::Scheduler,
                    &format!("bootstrap enrol of {} failed: {}", short_mint(&mint), err),
                ),
            }
        }

        logger::info(
            LogTag::Scheduler,
            &format!("bootstrap complete, {} jobs enrolled", enrolled),
        );
        Ok(())
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Start the dispatcher and the periodic ban sweep.
    pub fn start(self: Arc<Self>) {
        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(scheduler.config.period_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                Arc::clone(&scheduler).dispatch_cycle().await;
            }
        });

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(BAN_SWEEP_INTERVAL_SECS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.ban_sweep().await;
            }
        });
    }

    async fn dispatch_cycle(self: Arc<Self>) {
        let jobs = match self.queue.list_repeating().await {
            Ok(jobs) => jobs,
            Err(err) => {
                logger::warning(LogTag::Scheduler, &format!("job listing failed: {}", err));
                return;
            }
        };
        self.metrics.active_jobs.set(jobs.len() as i64);

        for job in jobs {
            let mint = job.payload.mint;
            // A previous tick for this mint is still running; skip so per-mint
            // commits stay ordered.
            if self.in_flight.contains(&mint) {
                continue;
            }
            let permit = match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    logger::debug(LogTag::Scheduler, "worker pool saturated, deferring tick");
                    return;
                }
            };

            self.in_flight.insert(mint.clone());
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                scheduler.run_tick(&mint).await;
                scheduler.in_flight.remove(&mint);
                drop(permit);
            });
        }
    }

    /// One invocation of a `price-<mint>` job.
    async fn run_tick(&self, mint: &str) {
        let job_id = job_id_for(mint);

        if self.is_banned(mint).await {
            self.queue.obliterate(&job_id).await;
            return;
        }

        self.queue.mark_state(&job_id, JobState::Active).await;
        match self.engine.update_mint(mint).await {
            Ok(_) => {
                self.queue.mark_state(&job_id, JobState::Completed).await;
            }
            Err(TrackerError::InvalidMint { reason }) => {
                // Not a retryable failure: the tick succeeds, the mint goes.
                self.ban_and_remove(mint, &reason).await;
                self.queue.mark_state(&job_id, JobState::Completed).await;
            }
            Err(err) => {
                if let TrackerError::Throttled { source, .. } = &err {
                    self.metrics
                        .upstream_throttles
                        .with_label_values(&[source])
                        .inc();
                }
                self.metrics.update_failures.inc();
                self.queue.mark_state(&job_id, JobState::Failed).await;
                logger::debug(
                    LogTag::Scheduler,
                    &format!("tick for {} failed: {}", short_mint(mint), err),
                );
            }
        }
    }

    /// Run one tick for a mint right now, serialised against the repeating
    /// job through the same in-flight set. Used for the initial update at
    /// subscribe time.
    pub async fn run_once(&self, mint: &str) {
        if !self.in_flight.insert(mint.to_string()) {
            // A tick is already producing a snapshot for this mint.
            return;
        }
        self.run_tick(mint).await;
        self.in_flight.remove(mint);
    }

    /// Re-run ban-driven purges so a ban placed by another node eventually
    /// clears local persistence too.
    async fn ban_sweep(&self) {
        let mints = match self.db.distinct_latest_mints() {
            Ok(mints) => mints,
            Err(err) => {
                logger::warning(LogTag::Scheduler, &format!("sweep listing failed: {}", err));
                return;
            }
        };
        for mint in mints {
            if self.is_banned(&mint).await {
                self.obliterate(&mint).await;
                if let Err(err) = self.db.purge_mint(&mint) {
                    logger::error(
                        LogTag::Scheduler,
                        &format!("sweep purge of {} failed: {}", short_mint(&mint), err),
                    );
                }
            }
        }
    }

    /// Repeating jobs currently registered; exposed for observability.
    pub async fn list_repeating(&self) -> TrackerResult<Vec<RepeatingJob>> {
        self.queue.list_repeating().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_keys_live_under_the_invalid_token_prefix() {
        assert_eq!(banned_key("MintA"), "invalid_token:MintA");
        assert!(banned_key("MintA").starts_with(BAN_KEY_PREFIX));
    }

    #[test]
    fn default_config_matches_the_documented_pool() {
        let config = SchedulerConfig::default();
        assert_eq!(config.period_ms, 1_000);
        assert_eq!(config.workers, 10);
    }
}
