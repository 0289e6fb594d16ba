use tokio::sync::{mpsc, oneshot};
use updraft_types::{
    AccountId, BetId, CashOutResponse, Multiplier, Rejection, RoundId, RoundSnapshot, SlotIndex,
};

/// Commands processed by the lifecycle actor.
///
/// Placement is split into reserve/commit/abort so the wallet debit runs
/// outside the actor while the reservation holds the slot.
pub(crate) enum Command {
    ReserveBet {
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
        response: oneshot::Sender<Result<(), Rejection>>,
    },
    CommitBet {
        bet_id: BetId,
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
        client_seed: Option<String>,
        response: oneshot::Sender<Result<(), Rejection>>,
    },
    AbortBet {
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
    },
    CashOut {
        bet_id: BetId,
        response: oneshot::Sender<Result<CashOutResponse, Rejection>>,
    },
    Snapshot {
        account_id: Option<AccountId>,
        response: oneshot::Sender<RoundSnapshot>,
    },
}

/// Mailbox for the lifecycle actor.
///
/// A dead actor (channel closed) surfaces as `TableHalted`: the table is no
/// longer accepting anything.
#[derive(Clone)]
pub(crate) struct Mailbox {
    sender: mpsc::Sender<Command>,
}

impl Mailbox {
    pub(crate) fn new(sender: mpsc::Sender<Command>) -> Self {
        Self { sender }
    }

    async fn send(&self, command: Command) -> Result<(), Rejection> {
        self.sender
            .send(command)
            .await
            .map_err(|_| Rejection::TableHalted)
    }

    pub(crate) async fn reserve_bet(
        &self,
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
    ) -> Result<(), Rejection> {
        let (response, receiver) = oneshot::channel();
        self.send(Command::ReserveBet {
            round_id,
            account_id,
            slot_index,
            amount,
            auto_cash_out_at,
            response,
        })
        .await?;
        receiver.await.map_err(|_| Rejection::TableHalted)?
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn commit_bet(
        &self,
        bet_id: BetId,
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
        amount: u64,
        auto_cash_out_at: Option<Multiplier>,
        client_seed: Option<String>,
    ) -> Result<(), Rejection> {
        let (response, receiver) = oneshot::channel();
        self.send(Command::CommitBet {
            bet_id,
            round_id,
            account_id,
            slot_index,
            amount,
            auto_cash_out_at,
            client_seed,
            response,
        })
        .await?;
        receiver.await.map_err(|_| Rejection::TableHalted)?
    }

    pub(crate) async fn abort_bet(
        &self,
        round_id: RoundId,
        account_id: AccountId,
        slot_index: SlotIndex,
    ) {
        // Best effort: if the actor is gone the reservation died with it.
        let _ = self
            .sender
            .send(Command::AbortBet {
                round_id,
                account_id,
                slot_index,
            })
            .await;
    }

    pub(crate) async fn cash_out(&self, bet_id: BetId) -> Result<CashOutResponse, Rejection> {
        let (response, receiver) = oneshot::channel();
        self.send(Command::CashOut { bet_id, response }).await?;
        receiver.await.map_err(|_| Rejection::TableHalted)?
    }

    pub(crate) async fn snapshot(
        &self,
        account_id: Option<AccountId>,
    ) -> Result<RoundSnapshot, Rejection> {
        let (response, receiver) = oneshot::channel();
        self.send(Command::Snapshot {
            account_id,
            response,
        })
        .await?;
        receiver.await.map_err(|_| Rejection::TableHalted)
    }
}
