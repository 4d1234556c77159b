//! Engine configuration.
//!
//! Provides [`EngineConfig`] with pacing, retry and shadow-track settings.
//! Every field has a default so partial configuration files deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use questline_core::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_JITTER_MS, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_CALL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_USER_DELAY_MS,
};

/// How the shadow track is scored before it is revealed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowPolicy {
    /// No shadow result and no fetch until the shadow track is revealed.
    #[default]
    RevealedOnly,
    /// Compute and store the shadow tier before reveal, reported as hidden.
    ScoreHidden,
}

/// Bounded exponential backoff for transient data source failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per call, first try included.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            jitter_ms: DEFAULT_BACKOFF_JITTER_MS,
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration of the recomputation driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing between two data source calls.
    pub call_delay_ms: u64,
    /// Pause between two users in a batch run.
    pub user_delay_ms: u64,
    pub retry: RetryPolicy,
    pub shadow_policy: ShadowPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_delay_ms: DEFAULT_CALL_DELAY_MS,
            user_delay_ms: DEFAULT_USER_DELAY_MS,
            retry: RetryPolicy::default(),
            shadow_policy: ShadowPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn user_delay(&self) -> Duration {
        Duration::from_millis(self.user_delay_ms)
    }
}
