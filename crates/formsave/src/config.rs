//! Auto-save configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for auto-save behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Whether automatic (debounce-driven) saves fire at all.
    ///
    /// Manual [`save_now`](crate::AutoSaveSession::save_now) calls are
    /// unaffected.
    pub enabled: bool,

    /// Debounce delay in milliseconds.
    ///
    /// After an edit, the session waits this long before saving.
    /// Additional edits reset the timer.
    pub debounce_ms: u64,

    /// Maximum delay before forcing a save, in milliseconds.
    ///
    /// A continuous edit stream keeps resetting the debounce timer; when
    /// set, a save fires no later than this long after the first unsaved
    /// edit. `None` keeps pure trailing-debounce semantics.
    pub max_delay_ms: Option<u64>,

    /// How long the status stays `Saved` before decaying to `Pristine`,
    /// in milliseconds.
    pub saved_indicator_ms: u64,

    /// Retry policy for failed save attempts.
    pub retry: RetryConfig,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1500,
            max_delay_ms: None,
            saved_indicator_ms: 3000,
            retry: RetryConfig::default(),
        }
    }
}

impl AutoSaveConfig {
    /// Create a config with automatic saves turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enable or disable automatic saves.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the debounce delay.
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set the forced-save cap (`None` disables it).
    #[must_use]
    pub fn with_max_delay_ms(mut self, ms: Option<u64>) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set how long the saved indicator is shown.
    #[must_use]
    pub fn with_saved_indicator_ms(mut self, ms: u64) -> Self {
        self.saved_indicator_ms = ms;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub(crate) fn saved_indicator(&self) -> Duration {
        Duration::from_millis(self.saved_indicator_ms)
    }
}

/// Retry policy for failed saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether failed saves are retried at all.
    pub enabled: bool,

    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,

    /// Base for the exponential backoff between attempts, in milliseconds.
    ///
    /// The wait before retry `k` (1-based) is `backoff_base_ms * 2^k`.
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Create a policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }

    /// Backoff delay before the given retry (1-based). Saturates instead
    /// of overflowing for absurd retry counts.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}
