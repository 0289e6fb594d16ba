//! The external Wallet Account collaborator.
//!
//! The engine never holds balances. It calls `debit` before a bet becomes
//! visible (fail closed: no confirmed debit, no bet) and `credit` at most
//! once per settled bet, keyed so retries stay idempotent.

use futures::future::BoxFuture;
use thiserror::Error;
use updraft_types::AccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The account cannot cover the requested debit. No funds moved.
    #[error("insufficient funds")]
    InsufficientFunds,
    /// The wallet service could not be reached or errored.
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// Balance operations consumed by the engine.
///
/// `credit` must be idempotent per `idempotency_key`: replaying a key the
/// wallet has already applied is a no-op success. The engine uses the bet id
/// (or `refund-<bet id>` for placement refunds) as the key.
pub trait Wallet: Send + Sync {
    fn debit<'a>(
        &'a self,
        account_id: &'a AccountId,
        amount: u64,
    ) -> BoxFuture<'a, Result<(), WalletError>>;

    fn credit<'a>(
        &'a self,
        account_id: &'a AccountId,
        amount: u64,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<(), WalletError>>;
}
