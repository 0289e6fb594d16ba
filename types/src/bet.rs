use crate::multiplier::Multiplier;
use crate::round::RoundId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque account identifier owned by the wallet subsystem.
pub type AccountId = String;

/// Unique bet identifier.
pub type BetId = Uuid;

/// Bet slot within a round; a player may hold several independent bets.
pub type SlotIndex = u8;

/// Number of bet slots available to each account per round.
pub const MAX_BET_SLOTS: SlotIndex = 4;

/// Terminal-or-active state of a bet.
///
/// `Active` is the only non-terminal state; `CashedOut` and `Lost` are
/// terminal and mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Active,
    CashedOut,
    Lost,
}

/// A single bet slot in a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub round_id: RoundId,
    pub account_id: AccountId,
    pub slot_index: SlotIndex,
    /// Stake, debited from the account before the bet became visible.
    pub amount: u64,
    pub status: BetStatus,
    pub auto_cash_out_at: Option<Multiplier>,
    /// Set only when `status == CashedOut`.
    pub cash_out_multiplier: Option<Multiplier>,
    /// Set only when `status == CashedOut`.
    pub payout: Option<u64>,
}

impl Bet {
    pub fn new(
        id: BetId,
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
    ) -> Self {
        Self {
            id,
            round_id,
            account_id,
            slot_index,
            amount,
            status: BetStatus::Active,
            auto_cash_out_at,
            cash_out_multiplier: None,
            payout: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BetStatus::Active
    }
}
