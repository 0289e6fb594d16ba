//! Test doubles for the engine's collaborators.
//!
//! Used by this crate's tests and, behind the `mocks` feature, by dev-mode
//! binaries that run without a real wallet service.

use crate::fairness::{compute_crash_point, SeedCommit, SeedSource, SERVER_SEED_LENGTH};
use crate::settlement::RetryPolicy;
use crate::wallet::{Wallet, WalletError};
use crate::EngineConfig;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use updraft_types::{AccountId, Multiplier};

/// In-memory wallet with idempotent credits and failure injection.
pub struct MockWallet {
    inner: Mutex<MockWalletState>,
}

struct MockWalletState {
    balances: HashMap<AccountId, u64>,
    applied_keys: HashSet<String>,
    unavailable: bool,
    credit_failures: usize,
    starting_balance: u64,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::with_starting_balance(0)
    }

    /// Wallet that funds every account at first touch (dev mode).
    pub fn with_starting_balance(starting_balance: u64) -> Self {
        Self {
            inner: Mutex::new(MockWalletState {
                balances: HashMap::new(),
                applied_keys: HashSet::new(),
                unavailable: false,
                credit_failures: 0,
                starting_balance,
            }),
        }
    }

    pub fn with_balance(self, account_id: &str, amount: u64) -> Self {
        self.deposit(&account_id.to_string(), amount);
        self
    }

    pub fn deposit(&self, account_id: &AccountId, amount: u64) {
        let mut state = self.inner.lock().expect("mock wallet lock poisoned");
        *state.balances.entry(account_id.clone()).or_default() += amount;
    }

    pub fn balance(&self, account_id: &AccountId) -> u64 {
        let state = self.inner.lock().expect("mock wallet lock poisoned");
        state
            .balances
            .get(account_id)
            .copied()
            .unwrap_or(state.starting_balance)
    }

    /// Simulate a full wallet outage (debits and credits both fail).
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut state = self.inner.lock().expect("mock wallet lock poisoned");
        state.unavailable = unavailable;
    }

    /// Fail the next `n` credit attempts with `Unavailable`.
    pub fn fail_next_credits(&self, n: usize) {
        let mut state = self.inner.lock().expect("mock wallet lock poisoned");
        state.credit_failures = n;
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet for MockWallet {
    fn debit<'a>(
        &'a self,
        account_id: &'a AccountId,
        amount: u64,
    ) -> BoxFuture<'a, Result<(), WalletError>> {
        Box::pin(async move {
            let mut state = self.inner.lock().expect("mock wallet lock poisoned");
            if state.unavailable {
                return Err(WalletError::Unavailable("injected outage".to_string()));
            }
            let starting = state.starting_balance;
            let balance = state.balances.entry(account_id.clone()).or_insert(starting);
            if *balance < amount {
                return Err(WalletError::InsufficientFunds);
            }
            *balance -= amount;
            Ok(())
        })
    }

    fn credit<'a>(
        &'a self,
        account_id: &'a AccountId,
        amount: u64,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<(), WalletError>> {
        Box::pin(async move {
            let mut state = self.inner.lock().expect("mock wallet lock poisoned");
            if state.credit_failures > 0 {
                state.credit_failures -= 1;
                return Err(WalletError::Unavailable("injected outage".to_string()));
            }
            if state.unavailable {
                return Err(WalletError::Unavailable("injected outage".to_string()));
            }
            if !state.applied_keys.insert(idempotency_key.to_string()) {
                // Replayed key: already applied, nothing to do.
                return Ok(());
            }
            let starting = state.starting_balance;
            *state.balances.entry(account_id.clone()).or_insert(starting) += amount;
            Ok(())
        })
    }
}

/// Seed source yielding a fixed sequence, then a deterministic counter tail.
pub struct FixedSeedSource {
    seeds: VecDeque<[u8; SERVER_SEED_LENGTH]>,
    counter: u64,
}

impl FixedSeedSource {
    pub fn new(seeds: Vec<[u8; SERVER_SEED_LENGTH]>) -> Self {
        Self {
            seeds: seeds.into(),
            counter: 0,
        }
    }
}

impl SeedSource for FixedSeedSource {
    fn next_commit(&mut self) -> SeedCommit {
        let seed = self.seeds.pop_front().unwrap_or_else(|| {
            self.counter += 1;
            let mut seed = [0u8; SERVER_SEED_LENGTH];
            seed[..8].copy_from_slice(&self.counter.to_be_bytes());
            seed
        });
        SeedCommit::from_seed(seed)
    }
}

/// Engine config with short phases for fast deterministic tests.
pub fn create_test_config() -> EngineConfig {
    EngineConfig {
        waiting_duration: Duration::from_millis(1_000),
        betting_cutoff: Duration::from_millis(200),
        cooldown: Duration::from_millis(500),
        tick_interval: Duration::from_millis(50),
        credit_retry: RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
        },
        ..EngineConfig::default()
    }
}

/// Search for a server seed whose crash point for `round_id` falls in
/// `[lo, hi)`. Deterministic: the search order never changes.
pub fn create_seed_for_crash_range(
    round_id: u64,
    client_seed: &str,
    lo: Multiplier,
    hi: Multiplier,
    config: &EngineConfig,
) -> [u8; SERVER_SEED_LENGTH] {
    for k in 0u64..1_000_000 {
        let mut seed = [0u8; SERVER_SEED_LENGTH];
        seed[..8].copy_from_slice(&k.to_be_bytes());
        let crash = compute_crash_point(
            &seed,
            client_seed,
            round_id,
            config.house_edge_bps,
            config.max_crash_point,
        );
        if crash >= lo && crash < hi {
            return seed;
        }
    }
    panic!("no seed found with crash point in [{lo}, {hi})");
}
