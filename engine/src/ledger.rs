//! Per-round bet ledger.
//!
//! The ledger owns every bet in the current round and enforces the one-way
//! transitions: `Active -> CashedOut` and `Active -> Lost` are terminal and
//! mutually exclusive. Placement is two-phase (reserve, then commit after
//! the wallet debit confirms) so a debit always happens-before its bet is
//! visible, while the reservation still blocks duplicate
//! `(account, slot)` bets during the debit round-trip.
//!
//! The crash flag is set exactly once and wins every tie: a cash-out
//! arriving after it is rejected regardless of what any client-side clock
//! believed.

use std::collections::{HashMap, HashSet};
use tracing::debug;
use updraft_types::bet::MAX_BET_SLOTS;
use updraft_types::{AccountId, Bet, BetId, BetStatus, Multiplier, Rejection, RoundId, SlotIndex};

pub struct BetLedger {
    round_id: RoundId,
    min_bet: u64,
    max_bet: u64,
    bets: HashMap<BetId, Bet>,
    /// Placement order, for deterministic sweeps.
    order: Vec<BetId>,
    /// Slots with a debit in flight.
    reserved: HashSet<(AccountId, SlotIndex)>,
    crashed: bool,
    losses_settled: bool,
    total_payout: u64,
}

impl BetLedger {
    pub fn new(round_id: RoundId, min_bet: u64, max_bet: u64) -> Self {
        Self {
            round_id,
            min_bet,
            max_bet,
            bets: HashMap::new(),
            order: Vec::new(),
            reserved: HashSet::new(),
            crashed: false,
            losses_settled: false,
            total_payout: 0,
        }
    }

    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    fn slot_occupied(&self, account_id: &AccountId, slot_index: SlotIndex) -> bool {
        if self
            .reserved
            .contains(&(account_id.clone(), slot_index))
        {
            return true;
        }
        self.bets
            .values()
            .any(|bet| bet.account_id == *account_id && bet.slot_index == slot_index)
    }

    /// Reserve a slot ahead of the wallet debit.
    ///
    /// Validations here have no side effects on failure.
    pub fn reserve(
        &mut self,
        account_id: &AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
    ) -> Result<(), Rejection> {
        if slot_index >= MAX_BET_SLOTS {
            return Err(Rejection::Validation {
                reason: format!("slot index {slot_index} exceeds maximum {MAX_BET_SLOTS}"),
            });
        }
        if amount == 0 || amount < self.min_bet {
            return Err(Rejection::Validation {
                reason: format!("amount {amount} below minimum {}", self.min_bet),
            });
        }
        if amount > self.max_bet {
            return Err(Rejection::Validation {
                reason: format!("amount {amount} above maximum {}", self.max_bet),
            });
        }
        if let Some(auto) = auto_cash_out_at {
            if auto <= Multiplier::ONE {
                return Err(Rejection::Validation {
                    reason: format!("auto cash-out {auto} must exceed 1.00x"),
                });
            }
        }
        if self.slot_occupied(account_id, slot_index) {
            return Err(Rejection::Validation {
                reason: format!("slot {slot_index} already has a bet for this account"),
            });
        }
        self.reserved.insert((account_id.clone(), slot_index));
        Ok(())
    }

    /// Make a debited bet visible, consuming its reservation.
    pub fn commit(&mut self, bet: Bet) -> Result<(), Rejection> {
        if !self
            .reserved
            .remove(&(bet.account_id.clone(), bet.slot_index))
        {
            return Err(Rejection::Validation {
                reason: "no reservation for this slot".to_string(),
            });
        }
        debug!(
            round = self.round_id,
            bet = %bet.id,
            account = %bet.account_id,
            slot = bet.slot_index,
            amount = bet.amount,
            "bet committed"
        );
        self.order.push(bet.id);
        self.bets.insert(bet.id, bet);
        Ok(())
    }

    /// Release a reservation whose debit failed or was refused.
    pub fn abort(&mut self, account_id: &AccountId, slot_index: SlotIndex) {
        self.reserved.remove(&(account_id.clone(), slot_index));
    }

    /// Cash a bet out at `at`. The caller has already established that the
    /// round is running and `at` is below the true crash point; the ledger
    /// enforces the crash flag and the bet's own state.
    pub fn cash_out(&mut self, bet_id: &BetId, at: Multiplier) -> Result<u64, Rejection> {
        if self.crashed {
            return Err(Rejection::StaleCashOut);
        }
        let bet = self.bets.get_mut(bet_id).ok_or_else(|| Rejection::Validation {
            reason: "unknown bet".to_string(),
        })?;
        if bet.status != BetStatus::Active {
            return Err(Rejection::StaleCashOut);
        }
        let payout = at.payout(bet.amount).ok_or_else(|| Rejection::Validation {
            reason: "payout overflow".to_string(),
        })?;
        bet.status = BetStatus::CashedOut;
        bet.cash_out_multiplier = Some(at);
        bet.payout = Some(payout);
        self.total_payout += payout;
        Ok(payout)
    }

    /// Set the crash flag. Returns false if it was already set — reaching
    /// Crashed twice is an invariant violation the caller must handle.
    pub fn mark_crashed(&mut self) -> bool {
        if self.crashed {
            return false;
        }
        self.crashed = true;
        true
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    /// Transition every still-active bet to Lost. Idempotent: a second call
    /// finds nothing active and changes nothing.
    pub fn settle_losses(&mut self) -> Vec<BetId> {
        if self.losses_settled {
            return Vec::new();
        }
        self.losses_settled = true;
        let mut lost = Vec::new();
        for id in &self.order {
            if let Some(bet) = self.bets.get_mut(id) {
                if bet.status == BetStatus::Active {
                    bet.status = BetStatus::Lost;
                    lost.push(*id);
                }
            }
        }
        lost
    }

    pub fn bet(&self, bet_id: &BetId) -> Option<&Bet> {
        self.bets.get(bet_id)
    }

    /// Bets in placement order.
    pub fn bets_in_order(&self) -> impl Iterator<Item = &Bet> {
        self.order.iter().filter_map(|id| self.bets.get(id))
    }

    pub fn bets_for_account(&self, account_id: &AccountId) -> Vec<Bet> {
        self.bets_in_order()
            .filter(|bet| bet.account_id == *account_id)
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.bets
            .values()
            .filter(|bet| bet.status == BetStatus::Active)
            .count()
    }

    pub fn total_bets(&self) -> u32 {
        self.bets.len() as u32
    }

    pub fn total_wagered(&self) -> u64 {
        self.bets.values().map(|bet| bet.amount).sum()
    }

    pub fn total_payout(&self) -> u64 {
        self.total_payout
    }
}
