//! Token validator
//!
//! Syntactic and on-chain mint validation with a cache-through verdict store.
//! A verdict cached as `valid` is honoured without re-contacting the chain
//! for the TTL; one cached as `invalid` never triggers a second purge.

use crate::cache::CacheStore;
use crate::chain::ChainClient;
use crate::constants::*;
use crate::database::Database;
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, short_mint, LogTag};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;

const VALID_MARKER: &str = "valid";
const INVALID_MARKER_PREFIX: &str = "invalid:";

/// Result of draining a batch through the validator.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

enum Verdict {
    Valid,
    /// `fresh` distinguishes a verdict computed on this call from a cached
    /// one; only fresh invalids are purged.
    Invalid { reason: String, fresh: bool },
}

pub struct TokenValidator {
    chain: Arc<ChainClient>,
    cache: Arc<CacheStore>,
    db: Arc<Database>,
}

impl TokenValidator {
    pub fn new(chain: Arc<ChainClient>, cache: Arc<CacheStore>, db: Arc<Database>) -> Self {
        Self { chain, cache, db }
    }

    /// Validate a mint. `Ok(())` means valid; `Err(InvalidMint)` carries the
    /// reason; `Err(ChainUnavailable)` means the chain could not answer.
    pub async fn validate(&self, mint: &str) -> TrackerResult<()> {
        match self.verdict(mint).await? {
            Verdict::Valid => Ok(()),
            Verdict::Invalid { reason, .. } => Err(TrackerError::InvalidMint { reason }),
        }
    }

    async fn verdict(&self, mint: &str) -> TrackerResult<Verdict> {
        if mint == NATIVE_MINT {
            return Ok(Verdict::Valid);
        }

        if let Err(reason) = syntactic_check(mint) {
            return Ok(Verdict::Invalid {
                reason,
                fresh: true,
            });
        }

        let cache_key = format!("{}{}", VALIDATION_KEY_PREFIX, mint);
        if let Some(cached) = self.cache.get(&cache_key).await.unwrap_or(None) {
            if cached == VALID_MARKER {
                return Ok(Verdict::Valid);
            }
            if let Some(reason) = cached.strip_prefix(INVALID_MARKER_PREFIX) {
                return Ok(Verdict::Invalid {
                    reason: reason.to_string(),
                    fresh: false,
                });
            }
        }

        match self.chain.validate_mint(mint).await {
            Ok(()) => {
                let _ = self
                    .cache
                    .set_with_ttl(&cache_key, VALID_MARKER, VALIDATION_CACHE_TTL_SECS)
                    .await;
                Ok(Verdict::Valid)
            }
            Err(TrackerError::InvalidMint { reason }) => {
                let _ = self
                    .cache
                    .set_with_ttl(
                        &cache_key,
                        &format!("{}{}", INVALID_MARKER_PREFIX, reason),
                        VALIDATION_CACHE_TTL_SECS,
                    )
                    .await;
                Ok(Verdict::Invalid {
                    reason,
                    fresh: true,
                })
            }
            // Transient: no verdict, no cache write.
            Err(err) => Err(err),
        }
    }

    /// Remove all state for an invalid mint: persistent rows plus every cache
    /// key under the known data prefixes. The validation verdict itself is
    /// left in place so a cached `invalid` never re-purges.
    pub async fn purge_invalid(&self, mint: &str) -> TrackerResult<()> {
        if let Err(err) = self.db.purge_mint(mint) {
            logger::error(
                LogTag::Validator,
                &format!("purge of {} failed in store: {}", short_mint(mint), err),
            );
        }

        let mut keys: Vec<String> = [
            TOKEN_INFO_KEY_PREFIX,
            TOKEN_SUPPLY_KEY_PREFIX,
            TOKEN_DECIMALS_KEY_PREFIX,
            NATIVE_PRICE_KEY_PREFIX,
            RISK_KEY_PREFIX,
        ]
        .iter()
        .map(|prefix| format!("{}{}", prefix, mint))
        .collect();
        keys.push(format!("{}dexscreener:{}", QUOTE_KEY_PREFIX, mint));

        // top_holders keys carry a limit suffix; scan them out.
        if let Ok(holder_keys) = self
            .cache
            .scan_by_prefix(&format!("{}{}:", TOP_HOLDERS_KEY_PREFIX, mint))
            .await
        {
            keys.extend(holder_keys);
        }

        self.cache.delete(&keys).await?;
        logger::info(LogTag::Validator, &format!("purged {}", short_mint(mint)));
        Ok(())
    }

    /// Drain a batch through the pipeline. Invalid mints are purged as a side
    /// effect (fresh verdicts only); mints the chain could not answer for are
    /// skipped entirely and appear in neither list.
    pub async fn validate_batch(&self, mints: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for mint in mints {
            match self.verdict(mint).await {
                Ok(Verdict::Valid) => outcome.valid.push(mint.clone()),
                Ok(Verdict::Invalid { reason, fresh }) => {
                    if fresh {
                        if let Err(err) = self.purge_invalid(mint).await {
                            logger::warning(
                                LogTag::Validator,
                                &format!("purge of {} incomplete: {}", short_mint(mint), err),
                            );
                        }
                    }
                    logger::debug(
                        LogTag::Validator,
                        &format!("{} invalid: {}", short_mint(mint), reason),
                    );
                    outcome.invalid.push(mint.clone());
                }
                Err(err) => {
                    logger::warning(
                        LogTag::Validator,
                        &format!("skipping {}: {}", short_mint(mint), err),
                    );
                }
            }
        }
        outcome
    }
}

/// Length, alphabet and key-decoding checks; no network.
pub fn syntactic_check(mint: &str) -> Result<(), String> {
    if mint.len() < 32 || mint.len() > 44 {
        return Err(format!("length {} outside [32, 44]", mint.len()));
    }
    if Pubkey::from_str(mint).is_err() {
        return Err("not a legal base58 public key".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_and_stable_mints_pass_syntax() {
        assert!(syntactic_check(NATIVE_MINT).is_ok());
        assert!(syntactic_check(STABLE_MINT).is_ok());
    }

    #[test]
    fn length_bounds_are_enforced() {
        assert!(syntactic_check("short").is_err());
        let too_long = "1".repeat(45);
        assert!(syntactic_check(&too_long).is_err());
    }

    #[test]
    fn illegal_alphabet_is_rejected() {
        // '0', 'O', 'I' and 'l' are outside the base58 alphabet.
        assert!(syntactic_check("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0").is_err());
        // Right length, but not a decodable 32-byte key.
        assert!(syntactic_check("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!").is_err());
    }
}
