//! Round lifecycle management.
//!
//! One [`Engine`] per table. The engine spawns the lifecycle actor (the
//! single authoritative owner of round state), the settlement credit
//! worker, and hands out the broadcast feed. Bet placement runs two-phase
//! through the handle: reserve the slot, debit the wallet, then commit —
//! so a bet is never visible without its debit and the round clock never
//! waits on wallet latency.

mod actor;
mod ingress;

use crate::config::EngineConfig;
use crate::fairness::{self, OsSeedSource, SeedSource};
use crate::history::HistoryStore;
use crate::settlement;
use crate::wallet::{Wallet, WalletError};
use actor::Actor;
use ingress::Mailbox;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::error;
use updraft_types::round::MAX_CLIENT_SEED_LENGTH;
use updraft_types::{
    AccountId, BetId, CashOutResponse, FeedEvent, PlaceBetRequest, PlaceBetResponse, Rejection,
    RoundHistoryEntry, RoundId, RoundSnapshot, VerifyReport,
};
use uuid::Uuid;

/// Handle to one table's crash-round engine.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    mailbox: Mailbox,
    feed: broadcast::Sender<FeedEvent>,
    history: Arc<RwLock<HistoryStore>>,
    wallet: Arc<dyn Wallet>,
}

impl Engine {
    /// Spawn a table with OS-entropy seeds.
    pub fn spawn(config: EngineConfig, wallet: Arc<dyn Wallet>) -> Self {
        Self::spawn_with_seed_source(config, wallet, Box::new(OsSeedSource))
    }

    /// Spawn a table with an explicit seed source (replay, tests).
    pub fn spawn_with_seed_source(
        config: EngineConfig,
        wallet: Arc<dyn Wallet>,
        seeds: Box<dyn SeedSource>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.mailbox_size);
        let (feed, _) = broadcast::channel(config.feed_capacity);
        let history = Arc::new(RwLock::new(HistoryStore::new(
            config.history_depth,
            config.history_path.clone(),
        )));
        let credits = settlement::spawn_worker(wallet.clone(), config.credit_retry);
        let actor = Actor::new(
            config.clone(),
            receiver,
            feed.clone(),
            history.clone(),
            credits,
            seeds,
        );
        tokio::spawn(actor.run());
        Self {
            config,
            mailbox: Mailbox::new(sender),
            feed,
            history,
            wallet,
        }
    }

    /// Subscribe to the live feed of round events.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    /// Place a bet in the named round.
    ///
    /// The debit happens-before the bet becomes visible; a debit that
    /// cannot be confirmed means no bet (fail closed). If the betting
    /// window closes while the debit is in flight, the stake is refunded
    /// through the settlement path and the placement is rejected.
    pub async fn place_bet(
        &self,
        round_id: RoundId,
        request: PlaceBetRequest,
    ) -> Result<PlaceBetResponse, Rejection> {
        if let Some(seed) = &request.client_seed {
            if seed.len() > MAX_CLIENT_SEED_LENGTH {
                return Err(Rejection::Validation {
                    reason: format!("client seed exceeds {MAX_CLIENT_SEED_LENGTH} bytes"),
                });
            }
        }

        self.mailbox
            .reserve_bet(
                round_id,
                request.account_id.clone(),
                request.slot_index,
                request.amount,
                request.auto_cash_out_at,
            )
            .await?;

        if let Err(e) = self
            .wallet
            .debit(&request.account_id, request.amount)
            .await
        {
            self.mailbox
                .abort_bet(round_id, request.account_id.clone(), request.slot_index)
                .await;
            return Err(match e {
                WalletError::InsufficientFunds => Rejection::InsufficientFunds,
                WalletError::Unavailable(_) => Rejection::WalletUnavailable,
            });
        }

        let bet_id = Uuid::new_v4();
        self.mailbox
            .commit_bet(
                bet_id,
                round_id,
                request.account_id,
                request.slot_index,
                request.amount,
                request.auto_cash_out_at,
                request.client_seed,
            )
            .await?;
        Ok(PlaceBetResponse { bet_id })
    }

    /// Cash a bet out at the server's current multiplier.
    pub async fn cash_out(&self, bet_id: BetId) -> Result<CashOutResponse, Rejection> {
        self.mailbox.cash_out(bet_id).await
    }

    /// Consistent snapshot for late joiners; includes the given account's
    /// bets in the current round.
    pub async fn snapshot(
        &self,
        account_id: Option<AccountId>,
    ) -> Result<RoundSnapshot, Rejection> {
        self.mailbox.snapshot(account_id).await
    }

    /// Most recent settled rounds, newest first.
    pub fn recent_rounds(&self, limit: usize) -> Vec<RoundHistoryEntry> {
        match self.history.read() {
            Ok(history) => history.recent(limit),
            Err(e) => {
                error!("failed to acquire history read lock: {}", e);
                Vec::new()
            }
        }
    }

    /// Recompute a settled round's fairness from its revealed seed.
    pub fn verify_round(&self, round_id: RoundId) -> Option<VerifyReport> {
        let entry = match self.history.read() {
            Ok(history) => history.get(round_id).cloned(),
            Err(e) => {
                error!("failed to acquire history read lock: {}", e);
                None
            }
        }?;
        Some(fairness::verify_round(
            &entry,
            self.config.house_edge_bps,
            self.config.max_crash_point,
        ))
    }
}
