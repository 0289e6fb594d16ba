//! Deterministic multiplier clock.
//!
//! The displayed multiplier is a pure function of elapsed flight time:
//! `m(t) = e^(rate * t_ms)`, floored to basis points. Every observer derives
//! the same value from the same elapsed duration, and the curve is
//! invertible so the crash event can be scheduled exactly instead of being
//! discovered by polling.

use std::time::Duration;
use updraft_types::multiplier::SCALE;
use updraft_types::Multiplier;

/// The multiplier curve for one table.
#[derive(Clone, Copy, Debug)]
pub struct RoundClock {
    rate_per_ms: f64,
}

impl RoundClock {
    pub fn new(rate_per_ms: f64) -> Self {
        Self { rate_per_ms }
    }

    /// Multiplier after `elapsed` flight time. Monotone, `1.00x` at zero.
    pub fn multiplier_at(&self, elapsed: Duration) -> Multiplier {
        let ms = elapsed.as_millis() as f64;
        Multiplier::from_f64((self.rate_per_ms * ms).exp())
    }

    /// Smallest elapsed duration at which the multiplier reaches `target`.
    ///
    /// Inverse of [`multiplier_at`](Self::multiplier_at); used to schedule
    /// the crash transition precisely.
    pub fn time_to_reach(&self, target: Multiplier) -> Duration {
        if target <= Multiplier::ONE {
            return Duration::ZERO;
        }
        let target_ratio = target.bps() as f64 / SCALE as f64;
        let mut ms = (target_ratio.ln() / self.rate_per_ms).ceil() as u64;
        // ceil() on the float inverse can land one millisecond short of the
        // floored forward curve; walk to the exact boundary.
        while self.multiplier_at(Duration::from_millis(ms)) < target {
            ms += 1;
        }
        while ms > 0 && self.multiplier_at(Duration::from_millis(ms - 1)) >= target {
            ms -= 1;
        }
        Duration::from_millis(ms)
    }
}
