//! Risk scorer
//!
//! Client for the external risk-report endpoint. A mint the provider has
//! never indexed is a normal outcome (`Ok(None)`), never an error; a
//! rate-limit response is a transient `Throttled`, never `None` — callers
//! must not mistake backpressure for "no data".

use crate::cache::CacheStore;
use crate::constants::*;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::types::{OverallRisk, RiskItem, RiskLevel, RiskReport, RiskSummary};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const SOURCE_ID: &str = "rugcheck";

// Field names follow the upstream wire format.
#[derive(Debug, Deserialize)]
struct UpstreamReport {
    #[serde(default)]
    score_normalised: Option<u32>,
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    rugged: bool,
    #[serde(default)]
    risks: Vec<UpstreamRisk>,
}

#[derive(Debug, Deserialize)]
struct UpstreamRisk {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    level: String,
}

pub struct RiskScorer {
    http: reqwest::Client,
    cache: Arc<CacheStore>,
}

impl RiskScorer {
    pub fn new(cache: Arc<CacheStore>) -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;
        Ok(Self { http, cache })
    }

    /// Fetch (or replay from cache) the risk report for a mint.
    pub async fn report(&self, mint: &str) -> TrackerResult<Option<RiskReport>> {
        let cache_key = format!("{}{}", RISK_KEY_PREFIX, mint);
        if let Some(report) = self.cache.get_json(&cache_key).await.unwrap_or(None) {
            return Ok(Some(report));
        }

        let url = format!("{}/tokens/{}/report", RUGCHECK_API_BASE, mint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => {
                logger::debug(
                    LogTag::Risk,
                    &format!("{} not indexed upstream", short_mint(mint)),
                );
                return Ok(None);
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(TrackerError::Throttled {
                    source: SOURCE_ID,
                    retry_after,
                });
            }
            status if !status.is_success() => {
                return Err(TrackerError::upstream(
                    SOURCE_ID,
                    format!("http {}", status),
                ));
            }
            _ => {}
        }

        let upstream: UpstreamReport = response
            .json()
            .await
            .map_err(|err| TrackerError::upstream(SOURCE_ID, err.to_string()))?;

        let report = normalise_report(mint, upstream);
        let _ = self
            .cache
            .set_json_with_ttl(&cache_key, &report, RISK_REPORT_CACHE_TTL_SECS)
            .await;
        Ok(Some(report))
    }
}

/// Collapse the upstream taxonomy into the three-level one and derive the
/// summary and overall verdict.
fn normalise_report(mint: &str, upstream: UpstreamReport) -> RiskReport {
    let score_normalised = upstream
        .score_normalised
        .or(upstream.score)
        .unwrap_or(0)
        .min(100);

    let risks: Vec<RiskItem> = upstream
        .risks
        .into_iter()
        .map(|risk| RiskItem {
            level: RiskLevel::from_upstream(&risk.level),
            name: risk.name,
            description: risk.description,
            score: risk.score,
        })
        .collect();

    RiskReport {
        mint: mint.to_string(),
        score_normalised,
        rugged: upstream.rugged,
        summary: RiskSummary::count(&risks),
        overall: OverallRisk::derive(upstream.rugged, score_normalised),
        risks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_prefers_the_normalised_score_and_caps_it() {
        let report = normalise_report(
            "MintA",
            UpstreamReport {
                score_normalised: Some(130),
                score: Some(4_000),
                rugged: false,
                risks: vec![],
            },
        );
        assert_eq!(report.score_normalised, 100);
        assert_eq!(report.overall, OverallRisk::Low);

        let report = normalise_report(
            "MintA",
            UpstreamReport {
                score_normalised: None,
                score: Some(15),
                rugged: false,
                risks: vec![],
            },
        );
        assert_eq!(report.score_normalised, 15);
        assert_eq!(report.overall, OverallRisk::High);
    }

    #[test]
    fn rugged_always_means_critical() {
        let report = normalise_report(
            "MintA",
            UpstreamReport {
                score_normalised: Some(99),
                score: None,
                rugged: true,
                risks: vec![],
            },
        );
        assert_eq!(report.overall, OverallRisk::Critical);
    }

    #[test]
    fn upstream_levels_collapse_into_three_and_feed_the_summary() {
        let report = normalise_report(
            "MintA",
            UpstreamReport {
                score_normalised: Some(60),
                score: None,
                rugged: false,
                risks: vec![
                    UpstreamRisk {
                        name: "Freeze authority".into(),
                        description: "can freeze holders".into(),
                        score: 900,
                        level: "danger".into(),
                    },
                    UpstreamRisk {
                        name: "Top holders".into(),
                        description: "concentrated".into(),
                        score: 300,
                        level: "warning".into(),
                    },
                    UpstreamRisk {
                        name: "Low LP".into(),
                        description: "".into(),
                        score: 50,
                        level: "something-new".into(),
                    },
                ],
            },
        );
        assert_eq!(report.risks[0].level, RiskLevel::Danger);
        assert_eq!(report.risks[1].level, RiskLevel::Warn);
        assert_eq!(report.risks[2].level, RiskLevel::Info);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.summary.medium, 1);
        assert_eq!(report.summary.low, 1);
    }
}
