//! Request, response, and live-feed types for the HTTP/WebSocket surface.

use crate::bet::{AccountId, Bet, BetId, SlotIndex};
use crate::multiplier::Multiplier;
use crate::round::{RoundId, RoundStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a bet placement or cash-out was refused.
///
/// Every user-visible failure is one of these; the server maps them to a
/// 409 with the serialized reason code. `StaleCashOut` is the expected
/// outcome of the cash-out/crash race, not an anomaly.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Rejection {
    /// Bad amount, bad slot, or an operation outside its window. No side effects.
    #[error("invalid request: {reason}")]
    Validation { reason: String },
    /// Wallet refused the debit. No debit was performed.
    #[error("insufficient funds")]
    InsufficientFunds,
    /// Round already crashed, or the bet is no longer active.
    #[error("cash-out no longer possible")]
    StaleCashOut,
    /// Wallet collaborator unreachable during placement; bets fail closed.
    #[error("wallet unavailable")]
    WalletUnavailable,
    /// The table halted after an internal invariant violation.
    #[error("table halted")]
    TableHalted,
}

/// JSON body accompanying a 409 rejection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectionBody {
    #[serde(flatten)]
    pub error: Rejection,
    pub message: String,
}

impl From<Rejection> for RejectionBody {
    fn from(error: Rejection) -> Self {
        let message = error.to_string();
        Self { error, message }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub account_id: AccountId,
    pub slot_index: SlotIndex,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_cash_out_at: Option<Multiplier>,
    /// Optional fairness nonce; the first non-empty seed supplied during
    /// the waiting window is mixed into the round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_seed: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceBetResponse {
    pub bet_id: BetId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CashOutResponse {
    pub payout: u64,
    pub multiplier: Multiplier,
}

/// Consistent point-in-time view for late-joining or reconnecting clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub server_seed_hash: String,
    /// Milliseconds since the round started; absent before Running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub multiplier: Multiplier,
    /// Milliseconds until betting closes; absent outside Waiting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub betting_closes_in_ms: Option<u64>,
    /// The requesting account's bets in this round (empty if none given).
    pub bets: Vec<Bet>,
}

/// Post-hoc fairness check for a settled round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyReport {
    pub round_id: RoundId,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Whether hashing the revealed seed reproduces the published commitment.
    pub commitment_valid: bool,
    pub recorded_crash_point: Multiplier,
    pub recomputed_crash_point: Multiplier,
    /// Whether the recomputation matches the recorded crash point.
    pub crash_point_valid: bool,
}

impl VerifyReport {
    pub fn is_fair(&self) -> bool {
        self.commitment_valid && self.crash_point_valid
    }
}

/// Events pushed to every feed subscriber.
///
/// Tick cadence and transport buffering are delivery details; the event
/// payloads themselves are authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// A new round opened for betting; the commitment is published here.
    #[serde(rename = "round.waiting")]
    RoundWaiting {
        round_id: RoundId,
        server_seed_hash: String,
        betting_closes_in_ms: u64,
    },
    /// Live multiplier while the round is running.
    #[serde(rename = "round.tick")]
    RoundTick {
        round_id: RoundId,
        multiplier: Multiplier,
    },
    /// Terminal crash event; fires exactly once per round and reveals the seed.
    #[serde(rename = "round.crashed")]
    RoundCrashed {
        round_id: RoundId,
        crash_point: Multiplier,
        server_seed: String,
        client_seed: String,
    },
    /// Settlement complete; history entry written.
    #[serde(rename = "round.settled")]
    RoundSettled { round_id: RoundId },
}
