//! HTTP and WebSocket surface for the crash-round engine.
//!
//! Thin translation layer: handlers parse requests, call the engine handle,
//! and map [`Rejection`]s to reason-coded 409 responses. The `/feed`
//! WebSocket fans the engine's broadcast feed out as JSON text frames.

pub mod wallet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State as AxumState,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, warn};
use updraft_engine::Engine;
use updraft_types::{BetId, PlaceBetRequest, Rejection, RejectionBody, RoundId};

/// Default and maximum page sizes for the history endpoint.
const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

pub struct Api {
    engine: Engine,
}

impl Api {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn router(&self) -> Router {
        // Configure CORS
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        // Configure rate limiting per client IP
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(20)
                .burst_size(100)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .expect("governor configuration is static and valid"),
        );

        Router::new()
            .route("/rounds/:round_id/bets", post(place_bet))
            .route("/bets/:bet_id/cashout", post(cash_out))
            .route("/rounds", get(history))
            .route("/snapshot", get(snapshot))
            .route("/verify/:round_id", get(verify))
            .route("/feed", get(feed_ws))
            .layer(cors)
            .layer(GovernorLayer {
                config: governor_conf,
            })
            .with_state(self.engine.clone())
    }
}

/// Map a rejection to its HTTP shape: reason-coded 409s for the expected
/// refusals, 503 for a halted table.
fn rejection_response(rejection: Rejection) -> Response {
    let status = match rejection {
        Rejection::TableHalted => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::CONFLICT,
    };
    (status, Json(RejectionBody::from(rejection))).into_response()
}

async fn place_bet(
    AxumState(engine): AxumState<Engine>,
    Path(round_id): Path<RoundId>,
    Json(request): Json<PlaceBetRequest>,
) -> Response {
    match engine.place_bet(round_id, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn cash_out(AxumState(engine): AxumState<Engine>, Path(bet_id): Path<BetId>) -> Response {
    match engine.cash_out(bet_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(rejection) => rejection_response(rejection),
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    AxumState(engine): AxumState<Engine>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    Json(engine.recent_rounds(limit)).into_response()
}

#[derive(Deserialize)]
struct SnapshotQuery {
    account_id: Option<String>,
}

async fn snapshot(
    AxumState(engine): AxumState<Engine>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    match engine.snapshot(query.account_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn verify(AxumState(engine): AxumState<Engine>, Path(round_id): Path<RoundId>) -> Response {
    match engine.verify_round(round_id) {
        Some(report) => Json(report).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn feed_ws(AxumState(engine): AxumState<Engine>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_feed_ws(socket, engine))
}

async fn handle_feed_ws(socket: WebSocket, engine: Engine) {
    debug!("feed subscriber connected");
    let (mut sender, mut receiver) = socket.split();
    let mut feed = engine.subscribe();

    loop {
        tokio::select! {
            // Handle incoming WebSocket messages (ping/pong/close)
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) => {
                        debug!("feed subscriber closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("feed WebSocket error: {:?}", e);
                        break;
                    }
                    None => break,
                    _ => {} // Ignore other message types
                }
            }
            // Forward engine events
            event = feed.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!("failed to encode feed event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            debug!("feed subscriber disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Slow consumer: skip ahead, a snapshot can resync it
                        warn!(skipped, "feed subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    let _ = sender.close().await;
    debug!("feed subscriber exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use updraft_engine::mocks::{create_test_config, MockWallet};
    use updraft_types::{
        FeedEvent, PlaceBetResponse, RoundHistoryEntry, RoundSnapshot, RoundStatus,
    };

    fn create_test_api() -> (Router, Arc<MockWallet>, Engine) {
        let wallet = Arc::new(MockWallet::new().with_balance("alice", 1_000));
        let engine = Engine::spawn(create_test_config(), wallet.clone());
        let router = Api::new(engine.clone()).router();
        (router, wallet, engine)
    }

    fn json_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            // SmartIpKeyExtractor needs a client address
            .header("x-forwarded-for", "127.0.0.1");
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("decode body")
    }

    async fn wait_for_waiting(feed: &mut broadcast::Receiver<FeedEvent>) -> RoundId {
        loop {
            if let Ok(FeedEvent::RoundWaiting { round_id, .. }) = feed.recv().await {
                return round_id;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_bet_http() {
        let (router, wallet, engine) = create_test_api();
        let mut feed = engine.subscribe();
        let round_id = wait_for_waiting(&mut feed).await;

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/rounds/{round_id}/bets"),
                Some(serde_json::json!({
                    "account_id": "alice",
                    "slot_index": 0,
                    "amount": 100
                })),
            ))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::OK);
        let placed: PlaceBetResponse = body_json(response).await;
        assert_eq!(wallet.balance(&"alice".to_string()), 900);

        // Same slot again: reason-coded 409
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/rounds/{round_id}/bets"),
                Some(serde_json::json!({
                    "account_id": "alice",
                    "slot_index": 0,
                    "amount": 100
                })),
            ))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let rejection: serde_json::Value = body_json(response).await;
        assert_eq!(rejection["code"], "validation");

        // Premature cash-out: the round has not started
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/bets/{}/cashout", placed.bet_id),
                None,
            ))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let rejection: serde_json::Value = body_json(response).await;
        assert_eq!(rejection["code"], "stale_cash_out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_funds_http() {
        let (router, _wallet, engine) = create_test_api();
        let mut feed = engine.subscribe();
        let round_id = wait_for_waiting(&mut feed).await;

        let response = router
            .oneshot(json_request(
                "POST",
                &format!("/rounds/{round_id}/bets"),
                Some(serde_json::json!({
                    "account_id": "broke",
                    "slot_index": 0,
                    "amount": 100
                })),
            ))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let rejection: serde_json::Value = body_json(response).await;
        assert_eq!(rejection["code"], "insufficient_funds");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_http() {
        let (router, _wallet, engine) = create_test_api();
        let mut feed = engine.subscribe();
        let round_id = wait_for_waiting(&mut feed).await;

        let response = router
            .oneshot(json_request("GET", "/snapshot?account_id=alice", None))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot: RoundSnapshot = body_json(response).await;
        assert_eq!(snapshot.round_id, round_id);
        assert_eq!(snapshot.status, RoundStatus::Waiting);
        assert!(snapshot.bets.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_and_verify_http() {
        let (router, _wallet, engine) = create_test_api();
        let mut feed = engine.subscribe();

        // No settled rounds yet
        let response = router
            .clone()
            .oneshot(json_request("GET", "/rounds?limit=5", None))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::OK);
        let entries: Vec<RoundHistoryEntry> = body_json(response).await;
        assert!(entries.is_empty());

        // Unknown round cannot be verified
        let response = router
            .clone()
            .oneshot(json_request("GET", "/verify/1", None))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Let one round complete
        loop {
            if let Ok(FeedEvent::RoundSettled { .. }) = feed.recv().await {
                break;
            }
        }
        let response = router
            .clone()
            .oneshot(json_request("GET", "/rounds", None))
            .await
            .expect("request failed");
        let entries: Vec<RoundHistoryEntry> = body_json(response).await;
        assert_eq!(entries.len(), 1);

        let response = router
            .oneshot(json_request(
                "GET",
                &format!("/verify/{}", entries[0].round_id),
                None,
            ))
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::OK);
        let report: updraft_types::VerifyReport = body_json(response).await;
        assert!(report.is_fair());
    }
}
