use serde::{Deserialize, Serialize};
use std::fmt;

/// Scaling factor for fixed-point multiplier arithmetic (4 decimal places).
pub const SCALE: u64 = 10_000;

/// A round multiplier in basis points (10_000 = 1.00x).
///
/// All payout math is integer arithmetic on the scaled value; floats only
/// appear transiently inside the clock's curve evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u64);

impl Multiplier {
    /// 1.00x, the floor of every round.
    pub const ONE: Multiplier = Multiplier(SCALE);

    /// Create from a raw basis-points value.
    pub const fn from_bps(bps: u64) -> Self {
        Multiplier(bps)
    }

    /// The raw basis-points value.
    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Create from a float, flooring to basis points. Negative inputs clamp to zero.
    pub fn from_f64(value: f64) -> Self {
        if value <= 0.0 || !value.is_finite() {
            return Multiplier(0);
        }
        Multiplier((value * SCALE as f64).floor() as u64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// Payout for a stake at this multiplier, `None` on overflow.
    pub fn payout(self, amount: u64) -> Option<u64> {
        amount.checked_mul(self.0).map(|v| v / SCALE)
    }

    /// Whether this crash point lands in the instant-crash band [1.00, 1.01).
    pub fn is_instant_crash(self) -> bool {
        self.0 < SCALE + SCALE / 100
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Two decimal places, truncated: 23_456 bps -> "2.34x"
        write!(f, "{}.{:02}x", self.0 / SCALE, (self.0 % SCALE) / 100)
    }
}
