use crate::multiplier::Multiplier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic round identifier, starting at 1 per table.
pub type RoundId = u64;

/// Maximum accepted length for a player-supplied client seed.
pub const MAX_CLIENT_SEED_LENGTH: usize = 64;

/// Lifecycle phase of a round.
///
/// Transitions are strictly `Waiting -> Running -> Crashed -> Settled`,
/// driven only by the lifecycle actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Betting window open; seed hash published.
    Waiting,
    /// Multiplier climbing; cash-outs accepted.
    Running,
    /// Crash flag set; seed revealed; losses settled.
    Crashed,
    /// History written; cooldown before the next round.
    Settled,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Waiting => write!(f, "waiting"),
            RoundStatus::Running => write!(f, "running"),
            RoundStatus::Crashed => write!(f, "crashed"),
            RoundStatus::Settled => write!(f, "settled"),
        }
    }
}

/// Immutable record of a settled round, written exactly once.
///
/// `server_seed` is the hex-encoded reveal; together with `client_seed` and
/// `round_id` any third party can recompute `crash_point` and check it
/// against the pre-published `server_seed_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundHistoryEntry {
    pub round_id: RoundId,
    pub crash_point: Multiplier,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Milliseconds since the unix epoch.
    pub started_at: u64,
    pub crashed_at: u64,
    pub total_bets: u32,
    pub total_wagered: u64,
    pub total_payout: u64,
}
