//! Chain adapter
//!
//! Raw JSON-RPC access to the chain: mint validation, supply reads, AMM pool
//! discovery and vault reserves, and the largest-accounts holder table. Pool
//! scans always carry a dataSlice so only the (base, quote) mint prefix is
//! streamed, never full pool bodies.
//!
//! Network failures surface as `ChainUnavailable`; logical problems with the
//! mint itself (missing account, wrong owner, unreadable supply) surface as
//! `InvalidMint`.

use crate::cache::CacheStore;
use crate::constants::*;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use crate::types::{HolderBalance, PoolMarket, PoolReserves, TokenSupply};
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct ChainClient {
    http: reqwest::Client,
    rpc_url: String,
    cache: Arc<CacheStore>,
}

/// Outcome of one JSON-RPC exchange that reached the endpoint.
enum RpcReply {
    Result(Value),
    Error(String),
}

impl ChainClient {
    pub fn new(rpc_url: String, cache: Arc<CacheStore>) -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .map_err(|err| TrackerError::chain(err.to_string()))?;
        Ok(Self {
            http,
            rpc_url,
            cache,
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> TrackerResult<RpcReply> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|err| TrackerError::chain(format!("{}: {}", method, err)))?;

        if !response.status().is_success() {
            return Err(TrackerError::chain(format!(
                "{}: http {}",
                method,
                response.status()
            )));
        }

        let mut payload: Value = response
            .json()
            .await
            .map_err(|err| TrackerError::chain(format!("{}: {}", method, err)))?;

        if let Some(err) = payload.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Ok(RpcReply::Error(message));
        }

        Ok(RpcReply::Result(payload["result"].take()))
    }

    /// Variant for call sites where an rpc-level error is still a chain
    /// problem, not a statement about the queried mint.
    async fn rpc_result(&self, method: &str, params: Value) -> TrackerResult<Value> {
        match self.rpc_call(method, params).await? {
            RpcReply::Result(result) => Ok(result),
            RpcReply::Error(message) => {
                Err(TrackerError::chain(format!("{}: {}", method, message)))
            }
        }
    }

    // =========================================================================
    // MINT VALIDATION & SUPPLY
    // =========================================================================

    /// Confirm the account exists, is owned by a recognised token program and
    /// carries a readable, positive supply with sane decimals.
    pub async fn validate_mint(&self, mint: &str) -> TrackerResult<()> {
        if mint == NATIVE_MINT {
            return Ok(());
        }

        let info = self
            .rpc_result(
                "getAccountInfo",
                json!([mint, { "encoding": "base64", "dataSlice": { "offset": 0, "length": 0 } }]),
            )
            .await?;

        let value = &info["value"];
        if value.is_null() {
            return Err(TrackerError::invalid_mint("account does not exist"));
        }
        let owner = value["owner"].as_str().unwrap_or_default();
        if owner != TOKEN_PROGRAM_ID && owner != TOKEN_2022_PROGRAM_ID {
            return Err(TrackerError::invalid_mint(format!(
                "owner {} is not a token program",
                owner
            )));
        }

        let supply = match self.rpc_call("getTokenSupply", json!([mint])).await? {
            RpcReply::Result(result) => result,
            // The account exists and is token-owned, so an error here means
            // the mint data itself is unreadable.
            RpcReply::Error(message) => {
                return Err(TrackerError::invalid_mint(format!(
                    "supply not readable: {}",
                    message
                )))
            }
        };

        let decimals = supply["value"]["decimals"].as_u64().unwrap_or(255);
        if decimals > 18 {
            return Err(TrackerError::invalid_mint(format!(
                "decimals {} out of range",
                decimals
            )));
        }
        let raw: u64 = supply["value"]["amount"]
            .as_str()
            .and_then(|amount| amount.parse().ok())
            .ok_or_else(|| TrackerError::invalid_mint("supply amount missing"))?;
        if raw == 0 {
            return Err(TrackerError::invalid_mint("zero supply"));
        }

        Ok(())
    }

    /// Raw supply and decimals. Decimals never change, so they cache
    /// permanently; raw supply caches for an hour.
    pub async fn read_supply(&self, mint: &str) -> TrackerResult<TokenSupply> {
        if mint == NATIVE_MINT {
            return Ok(TokenSupply {
                raw: (NATIVE_SUPPLY_UI * 10f64.powi(NATIVE_DECIMALS as i32)) as u64,
                decimals: NATIVE_DECIMALS,
            });
        }

        let supply_key = format!("{}{}", TOKEN_SUPPLY_KEY_PREFIX, mint);
        let decimals_key = format!("{}{}", TOKEN_DECIMALS_KEY_PREFIX, mint);

        let cached_raw = self.cache.get(&supply_key).await.unwrap_or(None);
        let cached_decimals = self.cache.get(&decimals_key).await.unwrap_or(None);
        if let (Some(raw), Some(decimals)) = (&cached_raw, &cached_decimals) {
            if let (Ok(raw), Ok(decimals)) = (raw.parse(), decimals.parse()) {
                return Ok(TokenSupply { raw, decimals });
            }
        }

        let result = self.rpc_result("getTokenSupply", json!([mint])).await?;
        let raw: u64 = result["value"]["amount"]
            .as_str()
            .and_then(|amount| amount.parse().ok())
            .ok_or_else(|| TrackerError::invalid_mint("supply amount missing"))?;
        let decimals = result["value"]["decimals"].as_u64().unwrap_or(0) as u8;

        // Best effort; a cache hiccup must not fail the read.
        let _ = self
            .cache
            .set_with_ttl(&supply_key, &raw.to_string(), SUPPLY_CACHE_TTL_SECS)
            .await;
        let _ = self
            .cache
            .set_permanent(&decimals_key, &decimals.to_string())
            .await;

        Ok(TokenSupply { raw, decimals })
    }

    // =========================================================================
    // POOL DISCOVERY & RESERVES
    // =========================================================================

    /// All AMM v4 pools whose (base, quote) set equals {a, b}. Two memcmp
    /// scans (each mint as base), fetching only the 64-byte mint prefix.
    pub async fn find_pools_for_pair(&self, a: &str, b: &str) -> TrackerResult<Vec<PoolMarket>> {
        let cache_key = format!("{}{}:{}", POOL_KEY_PREFIX, a, b);
        if let Some(pools) = self.cache.get_json(&cache_key).await.unwrap_or(None) {
            return Ok(pools);
        }

        let mut pools = Vec::new();
        for base in [a, b] {
            let other = if base == a { b } else { a };
            for pool in self.scan_pools_with_base(base).await? {
                if pool.quote_mint == other {
                    pools.push(pool);
                }
            }
        }

        let _ = self
            .cache
            .set_json_with_ttl(&cache_key, &pools, POOL_CACHE_TTL_SECS)
            .await;
        Ok(pools)
    }

    async fn scan_pools_with_base(&self, base: &str) -> TrackerResult<Vec<PoolMarket>> {
        let result = self
            .rpc_result(
                "getProgramAccounts",
                json!([
                    AMM_V4_PROGRAM_ID,
                    {
                        "encoding": "base64",
                        "filters": [
                            { "dataSize": AMM_V4_DATA_SIZE },
                            { "memcmp": { "offset": AMM_V4_BASE_MINT_OFFSET, "bytes": base } }
                        ],
                        "dataSlice": { "offset": AMM_V4_BASE_MINT_OFFSET, "length": 64 }
                    }
                ]),
            )
            .await?;

        let accounts = result.as_array().cloned().unwrap_or_default();
        let mut pools = Vec::new();
        for account in accounts {
            let pubkey = account["pubkey"].as_str().unwrap_or_default().to_string();
            let data_b64 = account["account"]["data"][0].as_str().unwrap_or_default();
            let bytes = match base64::engine::general_purpose::STANDARD.decode(data_b64) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            if let Some((base_mint, quote_mint)) = decode_mint_pair(&bytes) {
                pools.push(PoolMarket {
                    pool_addr: pubkey,
                    base_mint,
                    quote_mint,
                });
            }
        }
        logger::debug(
            LogTag::Chain,
            &format!("pool scan base={} found {}", short_mint(base), pools.len()),
        );
        Ok(pools)
    }

    /// Vault reserves of one pool, oriented so the tracked mint is the token
    /// side. Both vault balances are read in parallel.
    pub async fn read_pool_reserves(
        &self,
        pool_addr: &str,
        token_mint: &str,
    ) -> TrackerResult<PoolReserves> {
        let result = self
            .rpc_result(
                "getAccountInfo",
                json!([
                    pool_addr,
                    {
                        "encoding": "base64",
                        "dataSlice": { "offset": AMM_V4_BASE_VAULT_OFFSET, "length": 128 }
                    }
                ]),
            )
            .await?;

        let value = &result["value"];
        if value.is_null() {
            return Err(TrackerError::chain(format!(
                "pool {} does not exist",
                pool_addr
            )));
        }
        let data_b64 = value["data"][0].as_str().unwrap_or_default();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data_b64)
            .map_err(|err| TrackerError::chain(format!("pool data undecodable: {}", err)))?;

        let layout = parse_pool_slice(&bytes)
            .ok_or_else(|| TrackerError::chain("pool data truncated"))?;

        let (token_vault, quote_vault) = if layout.base_mint == token_mint {
            (layout.base_vault, layout.quote_vault)
        } else if layout.quote_mint == token_mint {
            (layout.quote_vault, layout.base_vault)
        } else {
            return Err(TrackerError::chain(format!(
                "pool {} does not hold {}",
                pool_addr,
                short_mint(token_mint)
            )));
        };

        let (token_balance, quote_balance) = futures::future::try_join(
            self.token_account_balance(&token_vault),
            self.token_account_balance(&quote_vault),
        )
        .await?;

        Ok(PoolReserves {
            token_reserve_raw: token_balance.0,
            quote_reserve_raw: quote_balance.0,
            token_decimals: token_balance.1,
            quote_decimals: quote_balance.1,
        })
    }

    async fn token_account_balance(&self, account: &str) -> TrackerResult<(u64, u8)> {
        let result = self
            .rpc_result("getTokenAccountBalance", json!([account]))
            .await?;
        let raw: u64 = result["value"]["amount"]
            .as_str()
            .and_then(|amount| amount.parse().ok())
            .ok_or_else(|| TrackerError::chain("vault balance missing"))?;
        let decimals = result["value"]["decimals"].as_u64().unwrap_or(0) as u8;
        Ok((raw, decimals))
    }

    // =========================================================================
    // HOLDERS
    // =========================================================================

    /// Largest token accounts joined against supply to express each balance
    /// as a percentage.
    pub async fn read_top_holders(
        &self,
        mint: &str,
        limit: usize,
    ) -> TrackerResult<Vec<HolderBalance>> {
        let (largest, supply) = futures::future::try_join(
            self.rpc_result("getTokenLargestAccounts", json!([mint])),
            self.read_supply(mint),
        )
        .await?;

        let supply_ui = supply.ui_amount();
        let accounts = largest["value"].as_array().cloned().unwrap_or_default();

        let mut holders = Vec::new();
        for account in accounts.iter().take(limit) {
            let owner = account["address"].as_str().unwrap_or_default().to_string();
            let balance = account["uiAmount"].as_f64().unwrap_or(0.0);
            holders.push(HolderBalance {
                owner,
                balance,
                share_pct: share_pct(balance, supply_ui),
            });
        }
        Ok(holders)
    }
}

/// The (base, quote) mint pair from a 64-byte pool prefix.
fn decode_mint_pair(bytes: &[u8]) -> Option<(String, String)> {
    if bytes.len() < 64 {
        return None;
    }
    Some((
        bs58::encode(&bytes[0..32]).into_string(),
        bs58::encode(&bytes[32..64]).into_string(),
    ))
}

struct PoolSlice {
    base_vault: String,
    quote_vault: String,
    base_mint: String,
    quote_mint: String,
}

/// The vault/mint block starting at the base-vault offset: two vault
/// pubkeys followed by two mint pubkeys.
fn parse_pool_slice(bytes: &[u8]) -> Option<PoolSlice> {
    if bytes.len() < 128 {
        return None;
    }
    Some(PoolSlice {
        base_vault: bs58::encode(&bytes[0..32]).into_string(),
        quote_vault: bs58::encode(&bytes[32..64]).into_string(),
        base_mint: bs58::encode(&bytes[64..96]).into_string(),
        quote_mint: bs58::encode(&bytes[96..128]).into_string(),
    })
}

fn share_pct(balance: f64, supply_ui: f64) -> f64 {
    if supply_ui <= 0.0 {
        return 0.0;
    }
    ((balance / supply_ui) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_bytes(seed: u8) -> [u8; 32] {
        [seed; 32]
    }

    #[test]
    fn decode_mint_pair_reads_both_keys() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&key_bytes(1));
        bytes.extend_from_slice(&key_bytes(2));

        let (base, quote) = decode_mint_pair(&bytes).unwrap();
        assert_eq!(base, bs58::encode(&key_bytes(1)).into_string());
        assert_eq!(quote, bs58::encode(&key_bytes(2)).into_string());

        assert!(decode_mint_pair(&bytes[..63]).is_none());
    }

    #[test]
    fn parse_pool_slice_orients_vaults_and_mints() {
        let mut bytes = Vec::new();
        for seed in 1..=4u8 {
            bytes.extend_from_slice(&key_bytes(seed));
        }

        let layout = parse_pool_slice(&bytes).unwrap();
        assert_eq!(layout.base_vault, bs58::encode(&key_bytes(1)).into_string());
        assert_eq!(layout.quote_vault, bs58::encode(&key_bytes(2)).into_string());
        assert_eq!(layout.base_mint, bs58::encode(&key_bytes(3)).into_string());
        assert_eq!(layout.quote_mint, bs58::encode(&key_bytes(4)).into_string());
    }

    #[test]
    fn share_pct_clamps_and_guards_zero_supply() {
        assert_eq!(share_pct(50.0, 0.0), 0.0);
        assert_eq!(share_pct(25.0, 100.0), 25.0);
        // A vault can transiently report more than supply; clamp.
        assert_eq!(share_pct(200.0, 100.0), 100.0);
    }
}
