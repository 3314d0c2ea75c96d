/// Durable repeating-job queue
///
/// The registry lives in the cache store under the `jobs:` prefix so every
/// node in the cluster sees the same set. `add_repeating` is a SET NX, which
/// is the cluster-wide mutual exclusion behind the at-most-one-job-per-mint
/// invariant. Per-state instance markers exist for observability and for
/// obliterate to clean up.
use crate::cache::CacheStore;
use crate::constants::JOB_KEY_PREFIX;
use crate::errors::TrackerResult;
use crate::logger::{self, LogTag};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Repeating price jobs are keyed `price-<mint>`.
pub const JOB_ID_PREFIX: &str = "price-";

/// State markers expire on their own if a node dies mid-tick.
const STATE_MARKER_TTL_SECS: u64 = 600;

pub fn job_id_for(mint: &str) -> String {
    format!("{}{}", JOB_ID_PREFIX, mint)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub mint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatingJob {
    pub job_id: String,
    pub payload: JobPayload,
    pub period_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
    Paused,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
        }
    }

    pub fn all() -> [JobState; 6] {
        [
            JobState::Waiting,
            JobState::Active,
            JobState::Delayed,
            JobState::Completed,
            JobState::Failed,
            JobState::Paused,
        ]
    }
}

pub struct JobQueue {
    cache: Arc<CacheStore>,
}

impl JobQueue {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }

    fn repeat_key(job_id: &str) -> String {
        format!("{}repeat:{}", JOB_KEY_PREFIX, job_id)
    }

    fn state_key(state: JobState, job_id: &str) -> String {
        format!("{}state:{}:{}", JOB_KEY_PREFIX, state.as_str(), job_id)
    }

    /// Register a repeating job. Returns false when the job already exists
    /// somewhere in the cluster; the caller must not start a second timer.
    pub async fn add_repeating(
        &self,
        job_id: &str,
        payload: JobPayload,
        period_ms: u64,
    ) -> TrackerResult<bool> {
        let job = RepeatingJob {
            job_id: job_id.to_string(),
            payload,
            period_ms,
        };
        let raw = serde_json::to_string(&job)
            .map_err(|err| crate::errors::TrackerError::Cache(err.to_string()))?;
        self.cache.set_nx(&Self::repeat_key(job_id), &raw).await
    }

    pub async fn remove_repeating(&self, job_id: &str) -> TrackerResult<()> {
        self.cache
            .delete(&[Self::repeat_key(job_id)])
            .await
    }

    pub async fn list_repeating(&self) -> TrackerResult<Vec<RepeatingJob>> {
        let prefix = format!("{}repeat:", JOB_KEY_PREFIX);
        let keys = self.cache.scan_by_prefix(&prefix).await?;

        let mut jobs = Vec::new();
        for key in keys {
            if let Some(job) = self.cache.get_json::<RepeatingJob>(&key).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Job ids currently carrying a marker for the given state.
    pub async fn instances(&self, state: JobState) -> TrackerResult<Vec<String>> {
        let prefix = format!("{}state:{}:", JOB_KEY_PREFIX, state.as_str());
        let keys = self.cache.scan_by_prefix(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Move a job to a state: one marker at a time, the rest cleared.
    pub async fn mark_state(&self, job_id: &str, state: JobState) {
        let stale: Vec<String> = JobState::all()
            .iter()
            .filter(|other| **other != state)
            .map(|other| Self::state_key(*other, job_id))
            .collect();
        if let Err(err) = self.cache.delete(&stale).await {
            logger::debug(LogTag::Scheduler, &format!("state clear failed: {}", err));
        }
        if let Err(err) = self
            .cache
            .set_with_ttl(&Self::state_key(state, job_id), "1", STATE_MARKER_TTL_SECS)
            .await
        {
            logger::debug(LogTag::Scheduler, &format!("state mark failed: {}", err));
        }
    }

    /// Remove every trace of a job: the repeatable entry, all per-state
    /// markers and any queue-internal key that references it. Partial
    /// failures are logged and swallowed; obliterate always completes.
    pub async fn obliterate(&self, job_id: &str) {
        if let Err(err) = self.remove_repeating(job_id).await {
            logger::warning(
                LogTag::Scheduler,
                &format!("obliterate {}: repeat entry removal failed: {}", job_id, err),
            );
        }

        match self.cache.scan_by_prefix(JOB_KEY_PREFIX).await {
            Ok(keys) => {
                let matching: Vec<String> = keys
                    .into_iter()
                    .filter(|key| key.ends_with(&format!(":{}", job_id)))
                    .collect();
                if !matching.is_empty() {
                    if let Err(err) = self.cache.delete(&matching).await {
                        logger::warning(
                            LogTag::Scheduler,
                            &format!("obliterate {}: key sweep failed: {}", job_id, err),
                        );
                    }
                }
            }
            Err(err) => logger::warning(
                LogTag::Scheduler,
                &format!("obliterate {}: scan failed: {}", job_id, err),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_carry_the_price_prefix() {
        assert_eq!(job_id_for("MintA"), "price-MintA");
        assert!(job_id_for("MintA").starts_with(JOB_ID_PREFIX));
    }

    #[test]
    fn queue_keys_stay_under_the_jobs_prefix() {
        assert_eq!(JobQueue::repeat_key("price-MintA"), "jobs:repeat:price-MintA");
        assert_eq!(
            JobQueue::state_key(JobState::Active, "price-MintA"),
            "jobs:state:active:price-MintA"
        );
        assert!(JobQueue::repeat_key("x").starts_with(JOB_KEY_PREFIX));
    }

    #[test]
    fn every_state_has_a_distinct_marker() {
        let labels: std::collections::HashSet<&str> =
            JobState::all().iter().map(|s| s.as_str()).collect();
        assert_eq!(labels.len(), 6);
    }
}
