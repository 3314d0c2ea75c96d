/// Shared domain types
///
/// Everything that crosses a component boundary lives here: snapshots, quotes,
/// holder balances and risk reports. Wire names are camelCase to match the
/// event payloads the dashboard consumes.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// PRICE DATA
// =============================================================================

/// The unit of broadcast and history: one fully priced observation of a mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub mint: String,
    pub price_usd: f64,
    pub price_native: f64,
    pub market_cap: f64,
    pub total_supply: f64,
    pub as_of: DateTime<Utc>,
}

/// A priced market observation from one upstream source, before the pricing
/// engine composes it into a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub mint: String,
    pub price_usd: f64,
    pub price_native: f64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub venue_id: String,
    pub pair_id: String,
    pub as_of: DateTime<Utc>,
}

/// Static token facts. Name and symbol come from market metadata and may be
/// unavailable for unindexed mints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub mint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub decimals: u8,
    pub total_supply: f64,
}

/// Raw supply as reported by the chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenSupply {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenSupply {
    pub fn ui_amount(&self) -> f64 {
        (self.raw as f64) / 10f64.powi(self.decimals as i32)
    }
}

// =============================================================================
// POOLS & HOLDERS
// =============================================================================

/// A candidate AMM pool for a (base, quote) pair, as discovered on-chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMarket {
    pub pool_addr: String,
    pub base_mint: String,
    pub quote_mint: String,
}

/// Vault reserves of a pool, resolved so `token_*` is always the tracked mint
/// side regardless of base/quote orientation.
#[derive(Debug, Clone, Copy)]
pub struct PoolReserves {
    pub token_reserve_raw: u64,
    pub quote_reserve_raw: u64,
    pub token_decimals: u8,
    pub quote_decimals: u8,
}

impl PoolReserves {
    pub fn token_ui(&self) -> f64 {
        (self.token_reserve_raw as f64) / 10f64.powi(self.token_decimals as i32)
    }

    pub fn quote_ui(&self) -> f64 {
        (self.quote_reserve_raw as f64) / 10f64.powi(self.quote_decimals as i32)
    }

    /// Constant-product spot price of the token in quote units.
    pub fn spot_price(&self) -> Option<f64> {
        let token_ui = self.token_ui();
        if token_ui <= 0.0 {
            return None;
        }
        let price = self.quote_ui() / token_ui;
        if price.is_finite() && price > 0.0 {
            Some(price)
        } else {
            None
        }
    }
}

/// One entry of the top-holders table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderBalance {
    pub owner: String,
    pub balance: f64,
    pub share_pct: f64,
}

// =============================================================================
// RISK
// =============================================================================

/// Normalised severity of a single reported risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Info,
    Warn,
    Danger,
}

impl RiskLevel {
    /// Map an upstream level string onto the normalised taxonomy. Unknown
    /// labels degrade to `Info` rather than failing the whole report.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "danger" | "high" | "critical" => RiskLevel::Danger,
            "warn" | "warning" | "medium" => RiskLevel::Warn,
            _ => RiskLevel::Info,
        }
    }
}

/// Overall verdict derived from the normalised score and the rugged flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallRisk {
    Low,
    Medium,
    High,
    Critical,
}

impl OverallRisk {
    pub fn derive(rugged: bool, score_normalised: u32) -> Self {
        if rugged {
            OverallRisk::Critical
        } else if score_normalised <= 20 {
            OverallRisk::High
        } else if score_normalised <= 50 {
            OverallRisk::Medium
        } else {
            OverallRisk::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskItem {
    pub name: String,
    pub description: String,
    pub score: i64,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl RiskSummary {
    pub fn count(risks: &[RiskItem]) -> Self {
        let mut summary = RiskSummary {
            total: risks.len(),
            ..Default::default()
        };
        for risk in risks {
            match risk.level {
                RiskLevel::Danger => summary.high += 1,
                RiskLevel::Warn => summary.medium += 1,
                RiskLevel::Info => summary.low += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub mint: String,
    pub score_normalised: u32,
    pub rugged: bool,
    pub risks: Vec<RiskItem>,
    pub summary: RiskSummary,
    pub overall: OverallRisk,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_derivation_follows_score_bands() {
        assert_eq!(OverallRisk::derive(true, 95), OverallRisk::Critical);
        assert_eq!(OverallRisk::derive(false, 0), OverallRisk::High);
        assert_eq!(OverallRisk::derive(false, 20), OverallRisk::High);
        assert_eq!(OverallRisk::derive(false, 21), OverallRisk::Medium);
        assert_eq!(OverallRisk::derive(false, 50), OverallRisk::Medium);
        assert_eq!(OverallRisk::derive(false, 51), OverallRisk::Low);
        assert_eq!(OverallRisk::derive(false, 100), OverallRisk::Low);
    }

    #[test]
    fn summary_counts_levels() {
        let risks = vec![
            RiskItem {
                name: "Mint authority".into(),
                description: "still enabled".into(),
                score: 500,
                level: RiskLevel::Danger,
            },
            RiskItem {
                name: "Low liquidity".into(),
                description: "thin book".into(),
                score: 100,
                level: RiskLevel::Warn,
            },
            RiskItem {
                name: "New token".into(),
                description: "recently created".into(),
                score: 10,
                level: RiskLevel::Info,
            },
        ];
        let summary = RiskSummary::count(&risks);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.medium, 1);
        assert_eq!(summary.low, 1);
    }

    #[test]
    fn spot_price_rejects_empty_token_side() {
        let reserves = PoolReserves {
            token_reserve_raw: 0,
            quote_reserve_raw: 5_000_000_000,
            token_decimals: 6,
            quote_decimals: 9,
        };
        assert!(reserves.spot_price().is_none());

        let reserves = PoolReserves {
            token_reserve_raw: 1_000_000_000,
            quote_reserve_raw: 5_000_000_000,
            token_decimals: 6,
            quote_decimals: 9,
        };
        // 1000 tokens vs 5 native -> 0.005 native per token
        let price = reserves.spot_price().unwrap();
        assert!((price - 0.005).abs() < 1e-12);
    }
}
