/// Shared application state
///
/// Every component is constructed once at startup and handed to the
/// webserver through this struct; handlers clone the Arcs they need.
use crate::cache::CacheStore;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::database::Database;
use crate::pricing::PricingEngine;
use crate::scheduler::Scheduler;
use crate::security::RiskScorer;
use crate::services::Metrics;
use crate::validator::TokenValidator;
use crate::webserver::ws::hub::BroadcastHub;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub cache: Arc<CacheStore>,
    pub chain: Arc<ChainClient>,
    pub engine: Arc<PricingEngine>,
    pub scheduler: Arc<Scheduler>,
    pub validator: Arc<TokenValidator>,
    pub risk: Arc<RiskScorer>,
    pub hub: Arc<BroadcastHub>,
    pub metrics: Arc<Metrics>,
    pub startup_time: DateTime<Utc>,
}
