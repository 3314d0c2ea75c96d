//! Quote sources
//!
//! Market-data providers behind one capability trait so the pricing engine
//! can order them without caring which upstream answered. Two
//! implementations: the DexScreener aggregator (primary) and the Raydium
//! pools API (lighter fallback).

pub mod dexscreener;
pub mod raydium;

pub use dexscreener::DexScreenerProvider;
pub use raydium::RaydiumPoolsProvider;

use crate::errors::TrackerResult;
use crate::types::Quote;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A provider of priced market observations for mints.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Best available quote for each of the given mints. Mints with no
    /// usable market are simply absent from the result.
    async fn batch_quotes(&self, mints: &[String]) -> TrackerResult<HashMap<String, Quote>>;

    /// Best available quote for a single mint; `None` when no market
    /// qualifies.
    async fn single_quote(&self, mint: &str) -> TrackerResult<Option<Quote>>;
}

/// Display metadata captured as a side effect of quoting; cached under
/// `token_info:<mint>` for the read API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub name: Option<String>,
    pub symbol: Option<String>,
}
