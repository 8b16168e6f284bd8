//! Exponential backoff with jitter between candidate passes.

use std::time::Duration;

use rand::Rng;

/// Delay schedule applied before each repeated pass over the topology.
///
/// A zero base disables the delay entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassBackoff {
    base_ms: u64,
    max_ms: u64,
}

impl PassBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.base_ms > 0
    }

    /// Delay before pass number `pass` (the first pass is 0 and never waits).
    pub fn delay(&self, pass: u32) -> Duration {
        if pass == 0 || !self.is_enabled() {
            return Duration::ZERO;
        }

        let factor = 2u64.saturating_pow(pass - 1);
        let capped = self.base_ms.saturating_mul(factor).min(self.max_ms.max(self.base_ms));

        // Jitter: 0 to 10% of the delay.
        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }

    /// Sleep for [`delay`](Self::delay), returning what was slept.
    pub fn wait(&self, pass: u32) -> Duration {
        let delay = self.delay(pass);
        if !delay.is_zero() {
            tracing::debug!(pass = pass, delay_ms = delay.as_millis() as u64, "Backing off before next pass");
            std::thread::sleep(delay);
        }
        delay
    }
}
