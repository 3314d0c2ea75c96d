use anyhow::Context;
use clap::Parser;
use mintstream::logger::{self, LogTag};
use mintstream::scheduler::SchedulerConfig;
use mintstream::webserver::ws::BroadcastHub;
use mintstream::webserver::{server, AppState};
use mintstream::{
    CacheStore, ChainClient, Config, Database, PricingEngine, RiskScorer, Scheduler,
    TokenValidator,
};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "mintstream", about = "Real-time SPL token price and risk analytics")]
struct Args {
    /// Override the HTTP listen port from the environment.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let mut config = Config::from_env().context("configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    logger::info(
        LogTag::System,
        &format!(
            "mintstream {} starting ({}, port {})",
            env!("CARGO_PKG_VERSION"),
            config.env,
            config.port
        ),
    );

    // Owned components, constructed once and passed explicitly.
    let config = Arc::new(config);
    let metrics = Arc::new(mintstream::services::Metrics::new());
    let cache = Arc::new(
        CacheStore::connect(&config.redis_url)
            .await
            .context("cache store")?,
    );
    let db = Arc::new(Database::open(&config.database_url).context("persistent store")?);
    let chain = Arc::new(
        ChainClient::new(config.chain_rpc_url(), cache.clone()).context("chain adapter")?,
    );
    let validator = Arc::new(TokenValidator::new(
        chain.clone(),
        cache.clone(),
        db.clone(),
    ));
    let aggregator = Arc::new(
        mintstream::marketdata::DexScreenerProvider::new(cache.clone(), config.quote_ttl_secs)
            .context("aggregator provider")?,
    );
    let fallback = Arc::new(
        mintstream::marketdata::RaydiumPoolsProvider::new(cache.clone())
            .context("pools api provider")?,
    );
    let engine = Arc::new(PricingEngine::new(
        chain.clone(),
        aggregator,
        fallback,
        cache.clone(),
        db.clone(),
        validator.clone(),
        metrics.clone(),
    ));
    let risk = Arc::new(RiskScorer::new(cache.clone()).context("risk scorer")?);
    let scheduler = Scheduler::new(
        engine.clone(),
        validator.clone(),
        cache.clone(),
        db.clone(),
        metrics.clone(),
        SchedulerConfig {
            period_ms: config.poll_ms,
            workers: config.workers,
        },
    );
    let hub = BroadcastHub::new(metrics.clone());

    // Reconcile persisted state, then start the polling machinery and the
    // cross-process fan-out.
    scheduler.bootstrap().await.context("scheduler bootstrap")?;
    scheduler.clone().start();
    hub.clone().start_fanout(cache.clone());

    let state = AppState {
        config,
        db,
        cache,
        chain,
        engine,
        scheduler,
        validator,
        risk,
        hub,
        metrics,
        startup_time: chrono::Utc::now(),
    };

    server::serve(state).await.context("webserver")?;
    logger::info(LogTag::System, "goodbye");
    Ok(())
}
