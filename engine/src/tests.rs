//! End-to-end round scenarios against a live engine.
//!
//! All tests run under tokio's paused clock: phase timers and tick cadence
//! advance deterministically in virtual time, so the waiting window, the
//! scheduled crash, and the settlement retries are exact.

use crate::fairness::{compute_crash_point, verify_commitment};
use crate::mocks::{create_seed_for_crash_range, create_test_config, FixedSeedSource, MockWallet};
use crate::Engine;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use updraft_types::{
    BetStatus, FeedEvent, Multiplier, PlaceBetRequest, Rejection, RoundId, RoundStatus,
};

const STARTING_BALANCE: u64 = 1_000;

fn create_test_wallet(accounts: &[&str]) -> Arc<MockWallet> {
    let wallet = MockWallet::new();
    for account in accounts {
        wallet.deposit(&account.to_string(), STARTING_BALANCE);
    }
    Arc::new(wallet)
}

/// Spawn an engine whose first rounds use the given seeds, subscribing to
/// the feed before the actor first runs so no event is missed.
fn spawn_test_engine(
    seeds: Vec<[u8; 32]>,
    wallet: Arc<MockWallet>,
) -> (Engine, broadcast::Receiver<FeedEvent>) {
    let engine = Engine::spawn_with_seed_source(
        create_test_config(),
        wallet,
        Box::new(FixedSeedSource::new(seeds)),
    );
    let feed = engine.subscribe();
    (engine, feed)
}

fn bet_request(account: &str, slot: u8, amount: u64) -> PlaceBetRequest {
    PlaceBetRequest {
        account_id: account.to_string(),
        slot_index: slot,
        amount,
        auto_cash_out_at: None,
        client_seed: None,
    }
}

async fn next_event(feed: &mut broadcast::Receiver<FeedEvent>) -> FeedEvent {
    feed.recv().await.expect("feed closed")
}

async fn wait_for_waiting(feed: &mut broadcast::Receiver<FeedEvent>) -> RoundId {
    loop {
        if let FeedEvent::RoundWaiting { round_id, .. } = next_event(feed).await {
            return round_id;
        }
    }
}

async fn wait_for_crash(feed: &mut broadcast::Receiver<FeedEvent>) -> (RoundId, Multiplier) {
    loop {
        if let FeedEvent::RoundCrashed {
            round_id,
            crash_point,
            ..
        } = next_event(feed).await
        {
            return (round_id, crash_point);
        }
    }
}

async fn wait_for_settled(feed: &mut broadcast::Receiver<FeedEvent>) -> RoundId {
    loop {
        if let FeedEvent::RoundSettled { round_id } = next_event(feed).await {
            return round_id;
        }
    }
}

/// Wait until a running round's tick reaches `threshold`.
async fn wait_for_tick_at_least(
    feed: &mut broadcast::Receiver<FeedEvent>,
    threshold: Multiplier,
) -> Multiplier {
    loop {
        if let FeedEvent::RoundTick { multiplier, .. } = next_event(feed).await {
            if multiplier >= threshold {
                return multiplier;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_lifecycle_broadcasts_and_reveals() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(15_000),
        Multiplier::from_bps(30_000),
        &config,
    );
    let wallet = create_test_wallet(&[]);
    let (_engine, mut feed) = spawn_test_engine(vec![seed], wallet);

    let FeedEvent::RoundWaiting {
        round_id,
        server_seed_hash,
        betting_closes_in_ms,
    } = next_event(&mut feed).await
    else {
        panic!("expected round.waiting first");
    };
    assert_eq!(round_id, 1);
    assert!(betting_closes_in_ms > 0);

    // Flight: ticks are monotone
    let mut last_tick = Multiplier::from_bps(0);
    let (crashed_round, crash_point) = loop {
        match next_event(&mut feed).await {
            FeedEvent::RoundTick {
                round_id,
                multiplier,
            } => {
                assert_eq!(round_id, 1);
                assert!(multiplier >= last_tick, "ticks must be monotone");
                assert!(multiplier < crash_point_of(&seed, &config), "tick past crash");
                last_tick = multiplier;
            }
            FeedEvent::RoundCrashed {
                round_id,
                crash_point,
                server_seed,
                client_seed,
            } => {
                // The reveal must match the commitment published at waiting
                assert!(verify_commitment(&server_seed, &server_seed_hash));
                assert_eq!(client_seed, "");
                break (round_id, crash_point);
            }
            event => panic!("unexpected event {event:?}"),
        }
    };
    assert_eq!(crashed_round, 1);
    assert_eq!(crash_point, crash_point_of(&seed, &config));

    assert_eq!(wait_for_settled(&mut feed).await, 1);

    // The next round opens with a fresh commitment
    let FeedEvent::RoundWaiting {
        round_id,
        server_seed_hash: next_hash,
        ..
    } = next_event(&mut feed).await
    else {
        panic!("expected the next round.waiting");
    };
    assert_eq!(round_id, 2);
    assert_ne!(next_hash, server_seed_hash);
}

fn crash_point_of(seed: &[u8; 32], config: &crate::EngineConfig) -> Multiplier {
    compute_crash_point(seed, "", 1, config.house_edge_bps, config.max_crash_point)
}

// Scenario A: instant crash with three active bets and no cash-outs.
#[tokio::test(start_paused = true)]
async fn test_instant_crash_settles_all_bets_as_losses() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::ONE,
        Multiplier::from_bps(10_100),
        &config,
    );
    let wallet = create_test_wallet(&["alice", "bob", "carol"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    for account in ["alice", "bob", "carol"] {
        engine
            .place_bet(round_id, bet_request(account, 0, 100))
            .await
            .expect("placement failed");
    }

    let (_, crash_point) = wait_for_crash(&mut feed).await;
    assert!(crash_point.is_instant_crash());
    wait_for_settled(&mut feed).await;

    let entry = engine.recent_rounds(1).pop().expect("no history entry");
    assert_eq!(entry.round_id, round_id);
    assert_eq!(entry.total_bets, 3);
    assert_eq!(entry.total_wagered, 300);
    assert_eq!(entry.total_payout, 0);

    // Stakes were debited and never returned
    for account in ["alice", "bob", "carol"] {
        assert_eq!(
            wallet.balance(&account.to_string()),
            STARTING_BALANCE - 100
        );
    }
}

// Scenario B: auto cash-out pays the configured threshold, not the tick value.
#[tokio::test(start_paused = true)]
async fn test_auto_cash_out_at_exact_threshold() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(34_000),
        Multiplier::from_bps(36_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    let auto = Multiplier::from_bps(20_000);
    let response = engine
        .place_bet(
            round_id,
            PlaceBetRequest {
                auto_cash_out_at: Some(auto),
                ..bet_request("alice", 0, 100)
            },
        )
        .await
        .expect("placement failed");

    wait_for_crash(&mut feed).await;
    wait_for_settled(&mut feed).await;

    // Exactly 2.00x, although the triggering tick was almost certainly higher
    let snapshot = engine
        .snapshot(Some("alice".to_string()))
        .await
        .expect("snapshot failed");
    let bet = snapshot
        .bets
        .iter()
        .find(|b| b.id == response.bet_id)
        .expect("bet missing from snapshot");
    assert_eq!(bet.status, BetStatus::CashedOut);
    assert_eq!(bet.cash_out_multiplier, Some(auto));
    assert_eq!(bet.payout, Some(200));

    // Credit lands asynchronously through the settlement worker
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        wallet.balance(&"alice".to_string()),
        STARTING_BALANCE - 100 + 200
    );
}

// Scenario C: one live cash-out, one bet riding into the crash.
#[tokio::test(start_paused = true)]
async fn test_live_cash_out_and_loss() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(40_000),
        Multiplier::from_bps(45_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice", "bob"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    let alice_bet = engine
        .place_bet(round_id, bet_request("alice", 0, 100))
        .await
        .expect("placement failed");
    engine
        .place_bet(round_id, bet_request("bob", 0, 100))
        .await
        .expect("placement failed");

    // Ride to 1.80x, then cash alice out at the server's current multiplier
    let tick = wait_for_tick_at_least(&mut feed, Multiplier::from_bps(18_000)).await;
    let response = engine
        .cash_out(alice_bet.bet_id)
        .await
        .expect("cash out failed");
    assert_eq!(response.multiplier, tick);
    assert!(response.multiplier >= Multiplier::from_bps(18_000));
    assert_eq!(
        response.payout,
        response
            .multiplier
            .payout(100)
            .expect("payout overflowed")
    );

    let (_, crash_point) = wait_for_crash(&mut feed).await;
    assert!(response.multiplier < crash_point);
    wait_for_settled(&mut feed).await;

    // Conservation: exactly one terminal state per bet, payouts bounded
    let entry = engine.recent_rounds(1).pop().expect("no history entry");
    assert_eq!(entry.total_bets, 2);
    assert_eq!(entry.total_payout, response.payout);
    assert!(
        entry.total_payout
            <= crash_point
                .payout(entry.total_wagered)
                .expect("bound overflowed")
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        wallet.balance(&"alice".to_string()),
        STARTING_BALANCE - 100 + response.payout
    );
    assert_eq!(wallet.balance(&"bob".to_string()), STARTING_BALANCE - 100);
}

// Scenario D: insufficient funds rejects with no engine state created.
#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_leaves_no_state() {
    let wallet = Arc::new(MockWallet::new().with_balance("alice", 50));
    let (engine, mut feed) = spawn_test_engine(Vec::new(), wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    let result = engine.place_bet(round_id, bet_request("alice", 0, 100)).await;
    assert_eq!(result.unwrap_err(), Rejection::InsufficientFunds);

    // No debit, no bet
    assert_eq!(wallet.balance(&"alice".to_string()), 50);
    let snapshot = engine
        .snapshot(Some("alice".to_string()))
        .await
        .expect("snapshot failed");
    assert!(snapshot.bets.is_empty());

    // The slot is free again for a bet the account can afford
    engine
        .place_bet(round_id, bet_request("alice", 0, 50))
        .await
        .expect("placement failed");
}

// Scenario E: bets after the round started are validation rejections.
#[tokio::test(start_paused = true)]
async fn test_bet_after_running_rejected() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(20_000),
        Multiplier::from_bps(30_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    // The first tick proves the round is running
    wait_for_tick_at_least(&mut feed, Multiplier::ONE).await;

    let result = engine.place_bet(round_id, bet_request("alice", 0, 100)).await;
    assert!(matches!(result, Err(Rejection::Validation { .. })));
    // Fail closed: the wallet was never touched
    assert_eq!(wallet.balance(&"alice".to_string()), STARTING_BALANCE);
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_payout_under_concurrent_cash_outs() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(30_000),
        Multiplier::from_bps(40_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    let bet = engine
        .place_bet(round_id, bet_request("alice", 0, 100))
        .await
        .expect("placement failed");

    wait_for_tick_at_least(&mut feed, Multiplier::from_bps(12_000)).await;

    let attempts = join_all((0..5).map(|_| engine.cash_out(bet.bet_id))).await;
    let successes: Vec<_> = attempts.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(successes.len(), 1, "exactly one cash-out must win");
    for failure in attempts.iter().filter(|r| r.is_err()) {
        assert_eq!(failure.as_ref().unwrap_err(), &Rejection::StaleCashOut);
    }

    // And exactly one credit
    let payout = successes[0].as_ref().expect("winning cash-out").payout;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        wallet.balance(&"alice".to_string()),
        STARTING_BALANCE - 100 + payout
    );
}

#[tokio::test(start_paused = true)]
async fn test_cash_out_after_crash_rejected() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(15_000),
        Multiplier::from_bps(25_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    let bet = engine
        .place_bet(round_id, bet_request("alice", 0, 100))
        .await
        .expect("placement failed");

    // Let the round crash with the bet still riding
    wait_for_crash(&mut feed).await;
    let result = engine.cash_out(bet.bet_id).await;
    assert_eq!(result.unwrap_err(), Rejection::StaleCashOut);

    wait_for_settled(&mut feed).await;
    let snapshot = engine
        .snapshot(Some("alice".to_string()))
        .await
        .expect("snapshot failed");
    assert_eq!(snapshot.bets[0].status, BetStatus::Lost);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_slot_rejected_but_second_slot_allowed() {
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(Vec::new(), wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    engine
        .place_bet(round_id, bet_request("alice", 0, 100))
        .await
        .expect("placement failed");

    let result = engine.place_bet(round_id, bet_request("alice", 0, 100)).await;
    assert!(matches!(result, Err(Rejection::Validation { .. })));
    // Only the first debit went through
    assert_eq!(wallet.balance(&"alice".to_string()), STARTING_BALANCE - 100);

    // An independent slot is a second concurrent bet
    engine
        .place_bet(round_id, bet_request("alice", 1, 100))
        .await
        .expect("placement failed");
    assert_eq!(wallet.balance(&"alice".to_string()), STARTING_BALANCE - 200);
}

#[tokio::test(start_paused = true)]
async fn test_client_seed_mixed_into_crash_point() {
    let wallet = create_test_wallet(&["alice", "bob"]);
    let (engine, mut feed) = spawn_test_engine(Vec::new(), wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    engine
        .place_bet(
            round_id,
            PlaceBetRequest {
                client_seed: Some("alice-nonce".to_string()),
                ..bet_request("alice", 0, 100)
            },
        )
        .await
        .expect("placement failed");
    // A later contribution is ignored
    engine
        .place_bet(
            round_id,
            PlaceBetRequest {
                client_seed: Some("bob-nonce".to_string()),
                ..bet_request("bob", 0, 100)
            },
        )
        .await
        .expect("placement failed");

    let client_seed = loop {
        if let FeedEvent::RoundCrashed { client_seed, .. } = next_event(&mut feed).await {
            break client_seed;
        }
    };
    assert_eq!(client_seed, "alice-nonce");

    wait_for_settled(&mut feed).await;
    let report = engine.verify_round(round_id).expect("no verify report");
    assert_eq!(report.client_seed, "alice-nonce");
    assert!(report.is_fair());
}

#[tokio::test(start_paused = true)]
async fn test_history_accumulates_and_verifies() {
    let wallet = create_test_wallet(&[]);
    let (engine, mut feed) = spawn_test_engine(Vec::new(), wallet);

    for _ in 0..3 {
        wait_for_settled(&mut feed).await;
    }

    let recent = engine.recent_rounds(10);
    assert_eq!(recent.len(), 3);
    let ids: Vec<RoundId> = recent.iter().map(|e| e.round_id).collect();
    assert_eq!(ids, vec![3, 2, 1]);

    for entry in &recent {
        let report = engine.verify_round(entry.round_id).expect("no report");
        assert!(report.is_fair(), "round {} failed audit", entry.round_id);
    }
    assert!(engine.verify_round(99).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_wallet_outage_fails_closed() {
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(Vec::new(), wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    wallet.set_unavailable(true);
    let result = engine.place_bet(round_id, bet_request("alice", 0, 100)).await;
    assert_eq!(result.unwrap_err(), Rejection::WalletUnavailable);

    wallet.set_unavailable(false);
    let snapshot = engine
        .snapshot(Some("alice".to_string()))
        .await
        .expect("snapshot failed");
    assert!(snapshot.bets.is_empty());
    // The aborted reservation freed the slot
    engine
        .place_bet(round_id, bet_request("alice", 0, 100))
        .await
        .expect("placement failed");
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_tracks_running_round() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(25_000),
        Multiplier::from_bps(35_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet);

    let round_id = wait_for_waiting(&mut feed).await;
    let snapshot = engine.snapshot(None).await.expect("snapshot failed");
    assert_eq!(snapshot.round_id, round_id);
    assert_eq!(snapshot.status, RoundStatus::Waiting);
    assert_eq!(snapshot.multiplier, Multiplier::ONE);
    assert!(snapshot.betting_closes_in_ms.is_some());

    let tick = wait_for_tick_at_least(&mut feed, Multiplier::from_bps(11_000)).await;
    let snapshot = engine.snapshot(None).await.expect("snapshot failed");
    assert_eq!(snapshot.status, RoundStatus::Running);
    assert_eq!(snapshot.multiplier, tick);
    assert!(snapshot.elapsed_ms.expect("no elapsed") > 0);
    assert!(snapshot.betting_closes_in_ms.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_settlement_credit_retries_through_outage() {
    let config = create_test_config();
    let seed = create_seed_for_crash_range(
        1,
        "",
        Multiplier::from_bps(30_000),
        Multiplier::from_bps(40_000),
        &config,
    );
    let wallet = create_test_wallet(&["alice"]);
    let (engine, mut feed) = spawn_test_engine(vec![seed], wallet.clone());

    let round_id = wait_for_waiting(&mut feed).await;
    engine
        .place_bet(
            round_id,
            PlaceBetRequest {
                auto_cash_out_at: Some(Multiplier::from_bps(15_000)),
                ..bet_request("alice", 0, 100)
            },
        )
        .await
        .expect("placement failed");

    // The payout credit hits a two-attempt outage, then lands
    wallet.fail_next_credits(2);
    wait_for_settled(&mut feed).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        wallet.balance(&"alice".to_string()),
        STARTING_BALANCE - 100 + 150
    );
}
