use crate::settlement::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;
use updraft_types::Multiplier;

/// Configuration for a table's engine.
///
/// Growth rate and house edge are deployment tunables, not design
/// constraints; everything here has a sensible default.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Exponent of the multiplier curve, per millisecond of flight time.
    /// The default reaches 2.00x after roughly 11.5 seconds.
    pub growth_rate_per_ms: f64,

    /// Cadence of multiplier broadcasts while a round is running.
    pub tick_interval: Duration,

    /// Total length of the waiting phase.
    pub waiting_duration: Duration,

    /// Window at the end of the waiting phase during which bets are no
    /// longer accepted.
    pub betting_cutoff: Duration,

    /// Pause between settlement and the next round opening.
    pub cooldown: Duration,

    /// Minimum stake per bet.
    pub min_bet: u64,

    /// Maximum stake per bet.
    pub max_bet: u64,

    /// House edge in basis points of probability (100 = 1%). Also the
    /// approximate probability of an instant crash.
    pub house_edge_bps: u64,

    /// Ceiling on the crash point.
    pub max_crash_point: Multiplier,

    /// Number of settled rounds retained in memory.
    pub history_depth: usize,

    /// Optional JSONL file appended to at every settlement.
    pub history_path: Option<PathBuf>,

    /// Number of commands to hold in the actor's backlog before callers block.
    pub mailbox_size: usize,

    /// Broadcast buffer per feed subscriber; slow subscribers beyond this lag.
    pub feed_capacity: usize,

    /// Retry policy for settlement credits.
    pub credit_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            growth_rate_per_ms: 0.000_06,
            tick_interval: Duration::from_millis(100),
            waiting_duration: Duration::from_secs(5),
            betting_cutoff: Duration::from_millis(500),
            cooldown: Duration::from_secs(3),
            min_bet: 10,
            max_bet: 1_000_000,
            house_edge_bps: 100,
            max_crash_point: Multiplier::from_bps(100_000_000),
            history_depth: 256,
            history_path: None,
            mailbox_size: 256,
            feed_capacity: 1024,
            credit_retry: RetryPolicy::default(),
        }
    }
}
