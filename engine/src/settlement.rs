//! Asynchronous settlement credits.
//!
//! Round progression never waits on the wallet: cash-outs and placement
//! refunds are queued here and a worker task pushes them to the wallet with
//! bounded retries. Every job carries an idempotency key (the bet id, or
//! `refund-<bet id>`), so a retry after an ambiguous failure cannot credit
//! twice. Exhausted retries are an operator alert, never a silent drop.

use crate::wallet::Wallet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use updraft_types::AccountId;

/// Retry policy for settlement credits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per credit (including the first attempt).
    pub max_attempts: usize,
    /// Initial backoff delay after the first failure.
    pub initial_backoff: Duration,
    /// Maximum backoff delay between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// A credit owed to an account.
#[derive(Clone, Debug)]
pub struct CreditJob {
    pub account_id: AccountId,
    pub amount: u64,
    /// Idempotency key: the wallet applies each key at most once.
    pub key: String,
}

/// Spawn the credit worker. The returned sender is unbounded so the
/// lifecycle actor can enqueue without ever blocking on wallet latency.
pub(crate) fn spawn_worker(
    wallet: Arc<dyn Wallet>,
    policy: RetryPolicy,
) -> mpsc::UnboundedSender<CreditJob> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(wallet, policy, rx));
    tx
}

async fn run(
    wallet: Arc<dyn Wallet>,
    policy: RetryPolicy,
    mut jobs: mpsc::UnboundedReceiver<CreditJob>,
) {
    while let Some(job) = jobs.recv().await {
        credit_with_retry(wallet.as_ref(), &policy, &job).await;
    }
    debug!("credit worker exiting");
}

async fn credit_with_retry(wallet: &dyn Wallet, policy: &RetryPolicy, job: &CreditJob) {
    let mut backoff = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts {
        match wallet.credit(&job.account_id, job.amount, &job.key).await {
            Ok(()) => {
                debug!(
                    account = %job.account_id,
                    amount = job.amount,
                    key = %job.key,
                    "credit applied"
                );
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    account = %job.account_id,
                    key = %job.key,
                    attempt,
                    error = %e,
                    "credit failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(e) => {
                // Operator alert: a player is owed funds the wallet will not take.
                error!(
                    account = %job.account_id,
                    amount = job.amount,
                    key = %job.key,
                    error = %e,
                    "settlement credit exhausted retries; manual reconciliation required"
                );
            }
        }
    }
}
