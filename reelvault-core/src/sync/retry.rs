//! Retry policy: bounded attempts with exponential backoff. Jitter is
//! deterministic (hashed from job id + attempt) so re-runs of the same job
//! land on the same schedule and tests stay stable.

use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::Duration;

use super::job::JobId;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; a job is tried at most
    /// `max_retries + 1` times.
    pub max_retries: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Fraction of the anchor delay used as the jitter span.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 5 * 60 * 1_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Whether a job that just failed its `attempt`-th try (0-based) gets
    /// another one.
    pub fn should_retry(&self, attempt: u16) -> bool {
        attempt < self.max_retries
    }

    /// Delay before the attempt numbered `next_attempt` (1-based over
    /// retries): `base × 2^(next_attempt - 1)`, capped, jittered.
    pub fn delay_for(&self, job_id: JobId, next_attempt: u16) -> Duration {
        let anchor = self.anchor_ms(next_attempt);
        Duration::milliseconds(self.jittered_ms(anchor, job_id, next_attempt) as i64)
    }

    fn anchor_ms(&self, next_attempt: u16) -> u64 {
        if next_attempt == 0 {
            return 0;
        }
        let exp = i32::from(next_attempt.saturating_sub(1));
        let scaled = (self.backoff_base_ms as f64) * 2f64.powi(exp);
        scaled.min(self.backoff_max_ms as f64).max(0.0) as u64
    }

    fn jittered_ms(&self, anchor_ms: u64, job_id: JobId, attempt: u16) -> u64 {
        if anchor_ms == 0 || self.jitter_ratio <= 0.0 {
            return anchor_ms;
        }

        let span = (anchor_ms as f64) * self.jitter_ratio;
        let lower = (anchor_ms as f64 - span).max(0.0);
        let upper = (anchor_ms as f64 + span).min(self.backoff_max_ms as f64);
        if upper <= lower {
            return lower.round() as u64;
        }

        let unit = Self::deterministic_unit(job_id, attempt);
        (lower + (upper - lower) * unit).round() as u64
    }

    fn deterministic_unit(job_id: JobId, attempt: u16) -> f64 {
        let mut hasher = DefaultHasher::default();
        job_id.hash(&mut hasher);
        attempt.hash(&mut hasher);
        (hasher.finish() as f64) / (u64::MAX as f64)
    }
}
