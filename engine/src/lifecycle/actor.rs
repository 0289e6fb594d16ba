use super::ingress::Command;
use crate::autocashout;
use crate::clock::RoundClock;
use crate::config::EngineConfig;
use crate::fairness::{self, SeedCommit, SeedSource};
use crate::history::HistoryStore;
use crate::ledger::BetLedger;
use crate::settlement::CreditJob;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use updraft_types::{
    AccountId, Bet, BetId, CashOutResponse, FeedEvent, Multiplier, Rejection, RoundHistoryEntry,
    RoundId, RoundSnapshot, RoundStatus, SlotIndex,
};

/// Milliseconds since the unix epoch, for history timestamps.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The round currently owned by the actor.
struct CurrentRound {
    id: RoundId,
    status: RoundStatus,
    commit: SeedCommit,
    client_seed: Option<String>,
    crash_point: Option<Multiplier>,
    started_instant: Option<Instant>,
    started_at_ms: Option<u64>,
    crashed_at_ms: Option<u64>,
    bets_close_at: Instant,
    ledger: BetLedger,
}

impl CurrentRound {
    fn new(id: RoundId, commit: SeedCommit, config: &EngineConfig) -> Self {
        Self {
            id,
            status: RoundStatus::Waiting,
            commit,
            client_seed: None,
            crash_point: None,
            started_instant: None,
            started_at_ms: None,
            crashed_at_ms: None,
            bets_close_at: Instant::now(),
            ledger: BetLedger::new(id, config.min_bet, config.max_bet),
        }
    }
}

/// Lifecycle actor: the single mutation path for one table.
///
/// Everything that can change round or bet state flows through this task's
/// mailbox, so "crash-flag set" and "cash-out accepted" are serialized by
/// construction. The crash transition is scheduled from the precomputed
/// crash time and takes priority over every other event.
pub(crate) struct Actor {
    config: EngineConfig,
    clock: RoundClock,
    mailbox: mpsc::Receiver<Command>,
    feed: broadcast::Sender<FeedEvent>,
    history: Arc<RwLock<HistoryStore>>,
    credits: mpsc::UnboundedSender<CreditJob>,
    seeds: Box<dyn SeedSource>,
    round: CurrentRound,
    next_round_id: RoundId,
    halted: bool,
    closed: bool,
}

impl Actor {
    pub(crate) fn new(
        config: EngineConfig,
        mailbox: mpsc::Receiver<Command>,
        feed: broadcast::Sender<FeedEvent>,
        history: Arc<RwLock<HistoryStore>>,
        credits: mpsc::UnboundedSender<CreditJob>,
        mut seeds: Box<dyn SeedSource>,
    ) -> Self {
        let clock = RoundClock::new(config.growth_rate_per_ms);
        let round = CurrentRound::new(1, seeds.next_commit(), &config);
        Self {
            config,
            clock,
            mailbox,
            feed,
            history,
            credits,
            seeds,
            round,
            next_round_id: 2,
            halted: false,
            closed: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if self.closed {
                debug!("mailbox closed, lifecycle actor exiting");
                return;
            }
            if self.halted {
                // The table stays up for queries but accepts no mutations.
                match self.mailbox.recv().await {
                    Some(command) => self.handle_command(command),
                    None => self.closed = true,
                }
                continue;
            }

            self.run_waiting().await;
            if self.closed || self.halted {
                continue;
            }
            self.start_running();
            if self.halted {
                continue;
            }
            self.run_running().await;
            if self.closed || self.halted {
                continue;
            }
            self.crash_round();
            if self.halted {
                continue;
            }
            self.settle_round();
            self.run_cooldown().await;
            if self.closed || self.halted {
                continue;
            }
            self.open_round();
        }
    }

    /// Betting window: accept bets until the cutoff, then transition.
    async fn run_waiting(&mut self) {
        let deadline = Instant::now() + self.config.waiting_duration;
        self.round.bets_close_at = deadline - self.config.betting_cutoff;
        info!(
            round = self.round.id,
            server_seed_hash = self.round.commit.server_seed_hash(),
            "round waiting"
        );
        self.broadcast(FeedEvent::RoundWaiting {
            round_id: self.round.id,
            server_seed_hash: self.round.commit.server_seed_hash().to_string(),
            betting_closes_in_ms: (self.round.bets_close_at - Instant::now()).as_millis() as u64,
        });

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return,
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.closed = true;
                        return;
                    }
                }
            }
        }
    }

    /// Freeze the client seed, fix the crash point, start the clock.
    fn start_running(&mut self) {
        let client_seed = self.round.client_seed.clone().unwrap_or_default();
        let crash_point = fairness::compute_crash_point(
            self.round.commit.server_seed(),
            &client_seed,
            self.round.id,
            self.config.house_edge_bps,
            self.config.max_crash_point,
        );
        self.round.crash_point = Some(crash_point);
        self.round.status = RoundStatus::Running;
        self.round.started_instant = Some(Instant::now());
        self.round.started_at_ms = Some(now_ms());
        info!(
            round = self.round.id,
            bets = self.round.ledger.total_bets(),
            "round running"
        );
    }

    /// Flight: broadcast ticks and serve cash-outs until the scheduled crash.
    async fn run_running(&mut self) {
        let (Some(started), Some(crash_point)) =
            (self.round.started_instant, self.round.crash_point)
        else {
            self.halt("entered running without a start instant and crash point");
            return;
        };
        let crash_deadline = started + self.clock.time_to_reach(crash_point);
        let mut ticker =
            tokio::time::interval_at(started + self.config.tick_interval, self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // The crash wins every tie: it is checked before ticks and
                // before any queued command.
                biased;
                _ = sleep_until(crash_deadline) => return,
                _ = ticker.tick() => {
                    let now = Instant::now();
                    if now >= crash_deadline {
                        return;
                    }
                    let multiplier = self.clock.multiplier_at(now - started);
                    self.auto_cash_outs(multiplier);
                    self.broadcast(FeedEvent::RoundTick {
                        round_id: self.round.id,
                        multiplier,
                    });
                }
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.closed = true;
                        return;
                    }
                }
            }
        }
    }

    /// Cash out every bet whose threshold this tick reached, each at its
    /// own threshold.
    fn auto_cash_outs(&mut self, current: Multiplier) {
        for (bet_id, threshold) in autocashout::due_bets(&self.round.ledger, current) {
            match self.execute_cash_out(&bet_id, threshold) {
                Ok(response) => debug!(
                    bet = %bet_id,
                    multiplier = %response.multiplier,
                    payout = response.payout,
                    "auto cash-out"
                ),
                Err(rejection) => warn!(bet = %bet_id, %rejection, "auto cash-out rejected"),
            }
        }
    }

    /// Set the crash flag, settle losses, reveal the seed.
    fn crash_round(&mut self) {
        if !self.round.ledger.mark_crashed() {
            self.halt("round reached crashed twice");
            return;
        }
        let Some(crash_point) = self.round.crash_point else {
            self.halt("crashed without a crash point");
            return;
        };
        self.round.status = RoundStatus::Crashed;
        self.round.crashed_at_ms = Some(now_ms());
        let lost = self.round.ledger.settle_losses();
        info!(
            round = self.round.id,
            crash_point = %crash_point,
            lost = lost.len(),
            paid_out = self.round.ledger.total_payout(),
            "round crashed"
        );
        self.broadcast(FeedEvent::RoundCrashed {
            round_id: self.round.id,
            crash_point,
            server_seed: self.round.commit.reveal(),
            client_seed: self.round.client_seed.clone().unwrap_or_default(),
        });
    }

    /// Archive the round and announce settlement.
    fn settle_round(&mut self) {
        let Some(crash_point) = self.round.crash_point else {
            self.halt("settled without a crash point");
            return;
        };
        let entry = RoundHistoryEntry {
            round_id: self.round.id,
            crash_point,
            server_seed: self.round.commit.reveal(),
            server_seed_hash: self.round.commit.server_seed_hash().to_string(),
            client_seed: self.round.client_seed.clone().unwrap_or_default(),
            started_at: self.round.started_at_ms.unwrap_or(0),
            crashed_at: self.round.crashed_at_ms.unwrap_or(0),
            total_bets: self.round.ledger.total_bets(),
            total_wagered: self.round.ledger.total_wagered(),
            total_payout: self.round.ledger.total_payout(),
        };
        match self.history.write() {
            Ok(mut history) => history.append(entry),
            Err(e) => error!("failed to acquire history write lock: {}", e),
        }
        self.round.status = RoundStatus::Settled;
        self.broadcast(FeedEvent::RoundSettled {
            round_id: self.round.id,
        });
    }

    /// Pause between rounds, still serving queries.
    async fn run_cooldown(&mut self) {
        let deadline = Instant::now() + self.config.cooldown;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return,
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.closed = true;
                        return;
                    }
                }
            }
        }
    }

    fn open_round(&mut self) {
        let id = self.next_round_id;
        self.next_round_id += 1;
        self.round = CurrentRound::new(id, self.seeds.next_commit(), &self.config);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ReserveBet {
                round_id,
                account_id,
                slot_index,
                amount,
                auto_cash_out_at,
                response,
            } => {
                let result =
                    self.handle_reserve(round_id, &account_id, slot_index, amount, auto_cash_out_at);
                let _ = response.send(result);
            }
            Command::CommitBet {
                bet_id,
                round_id,
                account_id,
                slot_index,
                amount,
                auto_cash_out_at,
                client_seed,
                response,
            } => {
                let result = self.handle_commit(
                    bet_id,
                    round_id,
                    account_id,
                    slot_index,
                    amount,
                    auto_cash_out_at,
                    client_seed,
                );
                let _ = response.send(result);
            }
            Command::AbortBet {
                round_id,
                account_id,
                slot_index,
            } => {
                if round_id == self.round.id {
                    self.round.ledger.abort(&account_id, slot_index);
                }
            }
            Command::CashOut { bet_id, response } => {
                let result = self.handle_cash_out(&bet_id);
                let _ = response.send(result);
            }
            Command::Snapshot {
                account_id,
                response,
            } => {
                let _ = response.send(self.handle_snapshot(account_id));
            }
        }
    }

    fn handle_reserve(
        &mut self,
        round_id: RoundId,
        account_id: &AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
    ) -> Result<(), Rejection> {
        if self.halted {
            return Err(Rejection::TableHalted);
        }
        if round_id != self.round.id || self.round.status != RoundStatus::Waiting {
            return Err(Rejection::Validation {
                reason: format!("round {round_id} is not accepting bets"),
            });
        }
        if Instant::now() >= self.round.bets_close_at {
            return Err(Rejection::Validation {
                reason: "betting window closed".to_string(),
            });
        }
        self.round
            .ledger
            .reserve(account_id, slot_index, amount, auto_cash_out_at)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_commit(
        &mut self,
        bet_id: BetId,
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
        client_seed: Option<String>,
    ) -> Result<(), Rejection> {
        if self.halted {
            // Debit already happened; send it back before refusing.
            self.enqueue_refund(bet_id, &account_id, amount);
            return Err(Rejection::TableHalted);
        }
        if round_id != self.round.id || self.round.status != RoundStatus::Waiting {
            // The window closed while the debit was in flight: fail closed
            // and return the stake.
            self.enqueue_refund(bet_id, &account_id, amount);
            return Err(Rejection::Validation {
                reason: "betting closed during placement".to_string(),
            });
        }
        let bet = Bet::new(
            bet_id,
            round_id,
            account_id.clone(),
            slot_index,
            amount,
            auto_cash_out_at,
        );
        if let Err(rejection) = self.round.ledger.commit(bet) {
            self.enqueue_refund(bet_id, &account_id, amount);
            return Err(rejection);
        }
        // First non-empty client seed wins; later contributions are ignored.
        if let Some(seed) = client_seed.filter(|s| !s.is_empty()) {
            if self.round.client_seed.is_none() {
                debug!(round = self.round.id, "client seed adopted");
                self.round.client_seed = Some(seed);
            } else {
                debug!(round = self.round.id, "client seed already set, ignoring");
            }
        }
        Ok(())
    }

    fn handle_cash_out(&mut self, bet_id: &BetId) -> Result<CashOutResponse, Rejection> {
        if self.halted {
            return Err(Rejection::TableHalted);
        }
        if self.round.status != RoundStatus::Running {
            return Err(Rejection::StaleCashOut);
        }
        let Some(started) = self.round.started_instant else {
            return Err(Rejection::StaleCashOut);
        };
        // The server's own clock is the authority; whatever multiplier the
        // client believed it saw is irrelevant.
        let current = self.clock.multiplier_at(Instant::now() - started);
        self.execute_cash_out(bet_id, current)
    }

    /// Shared cash-out path for manual requests and the auto evaluator.
    fn execute_cash_out(
        &mut self,
        bet_id: &BetId,
        at: Multiplier,
    ) -> Result<CashOutResponse, Rejection> {
        if self.round.ledger.is_crashed() {
            return Err(Rejection::StaleCashOut);
        }
        let Some(crash_point) = self.round.crash_point else {
            return Err(Rejection::StaleCashOut);
        };
        if at >= crash_point {
            // The flight is already over at this multiplier even if the
            // crash event has not been processed yet.
            return Err(Rejection::StaleCashOut);
        }
        let payout = self.round.ledger.cash_out(bet_id, at)?;
        let Some(bet) = self.round.ledger.bet(bet_id) else {
            self.halt("cashed-out bet vanished from ledger");
            return Err(Rejection::TableHalted);
        };
        let account_id = bet.account_id.clone();
        if self
            .credits
            .send(CreditJob {
                account_id,
                amount: payout,
                key: bet_id.to_string(),
            })
            .is_err()
        {
            self.halt("credit worker unreachable with payout owed");
        }
        Ok(CashOutResponse {
            payout,
            multiplier: at,
        })
    }

    fn handle_snapshot(&self, account_id: Option<AccountId>) -> RoundSnapshot {
        let now = Instant::now();
        let (elapsed_ms, multiplier) = match (self.round.status, self.round.started_instant) {
            (RoundStatus::Running, Some(started)) => {
                let elapsed = now - started;
                (
                    Some(elapsed.as_millis() as u64),
                    self.clock.multiplier_at(elapsed),
                )
            }
            (RoundStatus::Crashed | RoundStatus::Settled, _) => {
                let elapsed = self
                    .round
                    .crashed_at_ms
                    .zip(self.round.started_at_ms)
                    .map(|(crashed, started)| crashed.saturating_sub(started));
                (elapsed, self.round.crash_point.unwrap_or(Multiplier::ONE))
            }
            _ => (None, Multiplier::ONE),
        };
        let betting_closes_in_ms = (self.round.status == RoundStatus::Waiting)
            .then(|| self.round.bets_close_at.saturating_duration_since(now))
            .map(|remaining| remaining.as_millis() as u64);
        let bets = account_id
            .map(|account| self.round.ledger.bets_for_account(&account))
            .unwrap_or_default();
        RoundSnapshot {
            round_id: self.round.id,
            status: self.round.status,
            server_seed_hash: self.round.commit.server_seed_hash().to_string(),
            elapsed_ms,
            multiplier,
            betting_closes_in_ms,
            bets,
        }
    }

    fn enqueue_refund(&mut self, bet_id: BetId, account_id: &AccountId, amount: u64) {
        if self
            .credits
            .send(CreditJob {
                account_id: account_id.clone(),
                amount,
                key: format!("refund-{bet_id}"),
            })
            .is_err()
        {
            self.halt("credit worker unreachable with refund owed");
        }
    }

    /// An invariant violation is a correctness bug, not a user condition:
    /// stop accepting mutations and page an operator.
    fn halt(&mut self, reason: &str) {
        error!(
            round = self.round.id,
            reason, "invariant violation, halting table"
        );
        self.halted = true;
    }

    fn broadcast(&self, event: FeedEvent) {
        // Send fails only when no subscriber is connected.
        let _ = self.feed.send(event);
    }
}
