/// Token read API
///
/// Paginated latest list, comprehensive per-token metrics, top holders and
/// windowed history. All input validation failures surface as 400.
use crate::constants::*;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::marketdata::TokenIdentity;
use crate::types::{HolderBalance, TokenInfo};
use crate::webserver::routes::ApiError;
use crate::webserver::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(list_tokens))
        .route("/tokens/:mint/metrics", get(comprehensive_metrics))
        .route("/tokens/:mint/holders/top", get(top_holders))
        .route("/tokens/:mint/history", get(history))
}

// =============================================================================
// WINDOW PARSING
// =============================================================================

/// Query windows accepted by the history and metrics endpoints. The window
/// moves the range start (`now − window`); entries stay as recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    OneMinute,
    FiveMinutes,
    OneHour,
}

impl Window {
    pub fn parse(raw: Option<&str>) -> TrackerResult<Self> {
        match raw.unwrap_or("1h") {
            "1m" => Ok(Window::OneMinute),
            "5m" => Ok(Window::FiveMinutes),
            "1h" => Ok(Window::OneHour),
            other => Err(TrackerError::bad_request(format!(
                "window must be one of 1m, 5m, 1h (got {:?})",
                other
            ))),
        }
    }

    pub fn duration(&self) -> ChronoDuration {
        match self {
            Window::OneMinute => ChronoDuration::minutes(1),
            Window::FiveMinutes => ChronoDuration::minutes(5),
            Window::OneHour => ChronoDuration::hours(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::OneMinute => "1m",
            Window::FiveMinutes => "5m",
            Window::OneHour => "1h",
        }
    }
}

// =============================================================================
// LIST
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

async fn list_tokens(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(TrackerError::bad_request("page must be >= 1").into());
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(
            TrackerError::bad_request(format!("limit must be in [1, {}]", MAX_PAGE_LIMIT)).into(),
        );
    }

    let (data, total) = state.db.list_latest((page - 1) * limit, limit)?;
    let total_pages = total.div_ceil(limit);

    Ok(Json(json!({
        "data": data,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": total_pages,
        },
    })))
}

// =============================================================================
// COMPREHENSIVE METRICS
// =============================================================================

#[derive(Debug, Deserialize)]
struct WindowQuery {
    window: Option<String>,
}

async fn comprehensive_metrics(
    State(state): State<AppState>,
    Path(mint): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, ApiError> {
    Window::parse(query.window.as_deref())?;
    state.validator.validate(&mint).await?;

    // A mint nobody asked for before has no latest row; enrol it and produce
    // the first snapshot now so the response is complete.
    if state.engine.current_of(&mint).await?.is_none() {
        state.scheduler.enrol(&mint).await?;
        state.scheduler.run_once(&mint).await;
    }

    let (info, latest, holders, risk) = tokio::join!(
        token_info(&state, &mint),
        state.engine.current_of(&mint),
        cached_top_holders(&state, &mint, DEFAULT_HOLDERS_LIMIT),
        state.risk.report(&mint),
    );

    let info = info?;
    let latest = latest?;
    let holders = holders.unwrap_or_else(|err| {
        logger::debug(
            LogTag::Webserver,
            &format!("holders unavailable for {}: {}", short_mint(&mint), err),
        );
        Vec::new()
    });
    let risk = risk.unwrap_or_else(|err| {
        logger::debug(
            LogTag::Webserver,
            &format!("risk unavailable for {}: {}", short_mint(&mint), err),
        );
        None
    });

    let concentration_ratio = concentration_ratio(&holders);

    Ok(Json(json!({
        "mint": info.mint,
        "name": info.name,
        "symbol": info.symbol,
        "totalSupply": info.total_supply,
        "priceUsd": latest.as_ref().map(|s| s.price_usd),
        "priceNative": latest.as_ref().map(|s| s.price_native),
        "marketCap": latest.as_ref().map(|s| s.market_cap),
        "concentrationRatio": concentration_ratio,
        "lastUpdated": latest.as_ref().map(|s| s.as_of),
        "risk": risk,
    })))
}

/// Static facts about a mint: supply and decimals from the chain, display
/// metadata from whatever the aggregator last saw.
async fn token_info(state: &AppState, mint: &str) -> TrackerResult<TokenInfo> {
    let supply = state.chain.read_supply(mint).await?;
    let identity: Option<TokenIdentity> = state
        .cache
        .get_json(&format!("{}{}", TOKEN_INFO_KEY_PREFIX, mint))
        .await
        .unwrap_or(None);

    Ok(TokenInfo {
        mint: mint.to_string(),
        name: identity.as_ref().and_then(|i| i.name.clone()),
        symbol: identity.as_ref().and_then(|i| i.symbol.clone()),
        decimals: supply.decimals,
        total_supply: supply.ui_amount(),
    })
}

/// Sum of the top-10 holder percentages, clamped to 100.
fn concentration_ratio(holders: &[HolderBalance]) -> f64 {
    holders
        .iter()
        .take(DEFAULT_HOLDERS_LIMIT)
        .map(|holder| holder.share_pct)
        .sum::<f64>()
        .clamp(0.0, 100.0)
}

// =============================================================================
// HOLDERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct HoldersQuery {
    limit: Option<usize>,
}

async fn top_holders(
    State(state): State<AppState>,
    Path(mint): Path<String>,
    Query(query): Query<HoldersQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HOLDERS_LIMIT);
    if !(1..=MAX_HOLDERS_LIMIT).contains(&limit) {
        return Err(TrackerError::bad_request(format!(
            "limit must be in [1, {}]",
            MAX_HOLDERS_LIMIT
        ))
        .into());
    }
    state.validator.validate(&mint).await?;

    let data = cached_top_holders(&state, &mint, limit).await?;
    let total = data.len();
    Ok(Json(json!({
        "data": data,
        "total": total,
        "limit": limit,
    })))
}

async fn cached_top_holders(
    state: &AppState,
    mint: &str,
    limit: usize,
) -> TrackerResult<Vec<HolderBalance>> {
    let cache_key = format!("{}{}:{}", TOP_HOLDERS_KEY_PREFIX, mint, limit);
    if let Some(holders) = state.cache.get_json(&cache_key).await.unwrap_or(None) {
        return Ok(holders);
    }

    let holders = state.chain.read_top_holders(mint, limit).await?;
    let _ = state
        .cache
        .set_json_with_ttl(&cache_key, &holders, TOP_HOLDERS_CACHE_TTL_SECS)
        .await;
    Ok(holders)
}

// =============================================================================
// HISTORY
// =============================================================================

async fn history(
    State(state): State<AppState>,
    Path(mint): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, ApiError> {
    let window = Window::parse(query.window.as_deref())?;

    let now = Utc::now();
    let data = state
        .db
        .history_in_range(&mint, now - window.duration(), now, HISTORY_CAP)?;

    let total = data.len();
    Ok(Json(json!({
        "data": data,
        "window": window.as_str(),
        "total": total,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_parse_and_default_to_one_hour() {
        assert_eq!(Window::parse(Some("1m")).unwrap(), Window::OneMinute);
        assert_eq!(Window::parse(Some("5m")).unwrap(), Window::FiveMinutes);
        assert_eq!(Window::parse(Some("1h")).unwrap(), Window::OneHour);
        assert_eq!(Window::parse(None).unwrap(), Window::OneHour);
        assert!(Window::parse(Some("2d")).is_err());
        assert!(Window::parse(Some("")).is_err());
    }

    #[test]
    fn window_durations_match_their_labels() {
        assert_eq!(Window::OneMinute.duration(), ChronoDuration::minutes(1));
        assert_eq!(Window::FiveMinutes.duration(), ChronoDuration::minutes(5));
        assert_eq!(Window::OneHour.duration(), ChronoDuration::hours(1));
    }

    #[test]
    fn concentration_sums_top_ten_and_clamps() {
        let holders: Vec<HolderBalance> = (0..12)
            .map(|i| HolderBalance {
                owner: format!("owner{}", i),
                balance: 100.0,
                share_pct: 5.0,
            })
            .collect();
        // Twelve holders at 5% each: only ten count.
        assert_eq!(concentration_ratio(&holders), 50.0);

        let whales: Vec<HolderBalance> = (0..10)
            .map(|i| HolderBalance {
                owner: format!("whale{}", i),
                balance: 1_000.0,
                share_pct: 15.0,
            })
            .collect();
        assert_eq!(concentration_ratio(&whales), 100.0);

        // Fewer holders than the cutoff is monotone: dropping entries can
        // only lower the ratio.
        assert!(concentration_ratio(&whales[..5]) <= concentration_ratio(&whales));
    }
}
