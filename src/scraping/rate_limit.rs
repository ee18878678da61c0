//! Adaptive per-project rate limiter. The delay between requests grows on
//! 429s and repeated errors, and decays back toward the base after sustained
//! success.

use crate::core::settings::RateLimitSettings;
use crate::core::types::RateLimitState;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
struct LimiterInner {
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_successes: u32,
    consecutive_errors: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings, fixed_delay_ms: u64) -> Self {
        let base = if settings.enabled {
            Duration::from_millis(settings.base_delay_ms)
        } else {
            Duration::from_millis(fixed_delay_ms)
        };
        Self {
            enabled: settings.enabled,
            base_delay: base,
            max_delay: Duration::from_millis(settings.max_delay_ms.max(settings.base_delay_ms)),
            multiplier: if settings.backoff_multiplier > 1.0 {
                settings.backoff_multiplier
            } else {
                2.0
            },
            inner: Mutex::new(LimiterInner {
                current_delay: base,
                last_request: None,
                consecutive_successes: 0,
                consecutive_errors: 0,
            }),
        }
    }

    /// Wait out the remainder of the current delay since the last request,
    /// then claim the request slot.
    pub async fn acquire(&self) {
        let wait = {
            let mut inner = self.inner.lock().await;
            let wait = match inner.last_request {
                Some(last) => inner.current_delay.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            };
            inner.last_request = Some(Instant::now() + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// A 2xx response. After 3 in a row the delay decays by the multiplier,
    /// floored at the base.
    pub async fn record_success(&self) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.consecutive_errors = 0;
        inner.consecutive_successes += 1;
        if inner.consecutive_successes >= 3 {
            let decayed = inner.current_delay.as_millis() as f64 / self.multiplier;
            inner.current_delay =
                Duration::from_millis(decayed as u64).max(self.base_delay);
            inner.consecutive_successes = 0;
        }
    }

    /// An HTTP 429. Returns the `Retry-After` sleep the caller must honor,
    /// when the server sent one.
    pub async fn record_rate_limited(&self, retry_after_secs: Option<u64>) -> Option<Duration> {
        if self.enabled {
            let mut inner = self.inner.lock().await;
            inner.consecutive_successes = 0;
            inner.consecutive_errors = 0;
            let grown = inner.current_delay.as_millis() as f64 * self.multiplier;
            inner.current_delay = Duration::from_millis(grown as u64).min(self.max_delay);
            tracing::warn!(
                "rate limited — delay now {} ms",
                inner.current_delay.as_millis()
            );
        }
        retry_after_secs.map(Duration::from_secs)
    }

    /// A non-429 failure. Two in a row grow the delay by 1.5×.
    pub async fn record_error(&self) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.consecutive_successes = 0;
        inner.consecutive_errors += 1;
        if inner.consecutive_errors >= 2 {
            let grown = inner.current_delay.as_millis() as f64 * 1.5;
            inner.current_delay = Duration::from_millis(grown as u64).min(self.max_delay);
        }
    }

    pub async fn snapshot(&self) -> RateLimitState {
        let inner = self.inner.lock().await;
        RateLimitState {
            current_delay_ms: inner.current_delay.as_millis() as u64,
            consecutive_successes: inner.consecutive_successes,
            consecutive_errors: inner.consecutive_errors,
        }
    }

    #[cfg(test)]
    pub async fn current_delay_ms(&self) -> u64 {
        self.inner.lock().await.current_delay.as_millis() as u64
    }
}
