use std::thread;
use std::time::Duration;

use rand::Rng;

/// Jittered exponential backoff between optimistic-concurrency retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        let clamped_jitter = jitter_pct.clamp(0.0, 1.0);
        Self {
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: clamped_jitter,
        }
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let exp = 2_u64.saturating_pow(attempt);
        let mut delay = self.base_delay_ms.saturating_mul(exp);
        if delay > self.max_delay_ms {
            delay = self.max_delay_ms;
        }
        let jitter = if self.jitter_pct > 0.0 {
            let mut rng = rand::thread_rng();
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rng.gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jitter)
    }

    /// Sleeps for the delay assigned to the given (zero-based) attempt.
    pub fn pause(&self, attempt: u32) {
        thread::sleep(self.next_delay(attempt));
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, 1_000, 0.2)
    }
}
