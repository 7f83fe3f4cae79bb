use std::time::Duration;

/// Exponential backoff schedule.
///
/// The delay doubles with every attempt and saturates at `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Initial delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap (backoff won't exceed this)
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay for a given attempt using exponential backoff
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}
