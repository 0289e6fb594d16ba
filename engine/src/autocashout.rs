//! Auto cash-out evaluation.
//!
//! On every clock tick the lifecycle actor sweeps the ledger for active
//! bets whose configured threshold the multiplier has reached. Each hit is
//! cashed out at the bet's own threshold, not the tick value, so a player
//! receives exactly what they configured even when the cadence overshoots.

use crate::ledger::BetLedger;
use updraft_types::{BetId, BetStatus, Multiplier};

/// Bets due for auto cash-out at `current`, paired with their own
/// thresholds, in placement order.
///
/// The sweep is computed in full before any mutation, so every bet eligible
/// at this tick is processed even though cashing one out mutates the ledger.
pub fn due_bets(ledger: &BetLedger, current: Multiplier) -> Vec<(BetId, Multiplier)> {
    ledger
        .bets_in_order()
        .filter(|bet| bet.status == BetStatus::Active)
        .filter_map(|bet| {
            let threshold = bet.auto_cash_out_at?;
            (threshold <= current).then_some((bet.id, threshold))
        })
        .collect()
}
