//! Dashboard Module
//!
//! Read-only HTTP/WebSocket API over the engine snapshot channel.
//! Only compiled when the `dashboard` feature is enabled. The dashboard
//! never touches engine state: it sees whatever versioned snapshot the
//! worker last published.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::engine::EngineSnapshot;

/// Standard API envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One leaderboard row per strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRow {
    pub id: String,
    pub series: String,
    pub name: String,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub bankroll: f64,
    pub profit: f64,
    pub roi: f64,
    pub current_streak: i32,
    pub pending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRow {
    pub snapshot_version: u64,
    pub last_update: i64,
    pub tick_count: u64,
    pub windows_processed: usize,
    pub runtime_seconds: f64,
}

type SnapshotRx = watch::Receiver<EngineSnapshot>;

/// Create the API router with all endpoints
pub fn create_router(snapshot_rx: SnapshotRx) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/strategies", get(get_strategies))
        .route("/api/health", get(get_health))
        .route("/ws", get(websocket_handler))
        .with_state(snapshot_rx)
        // CORS for a local frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /api/snapshot - the full versioned engine snapshot
async fn get_snapshot(State(rx): State<SnapshotRx>) -> impl IntoResponse {
    let snapshot = rx.borrow().clone();
    Json(ApiResponse::success(snapshot))
}

/// GET /api/strategies - leaderboard rows sorted by profit
async fn get_strategies(State(rx): State<SnapshotRx>) -> impl IntoResponse {
    let snapshot = rx.borrow().clone();
    let mut rows = strategy_rows(&snapshot);
    rows.sort_by(|a, b| b.profit.partial_cmp(&a.profit).unwrap_or(std::cmp::Ordering::Equal));
    Json(ApiResponse::success(rows))
}

/// GET /api/health - run liveness metadata
async fn get_health(State(rx): State<SnapshotRx>) -> impl IntoResponse {
    let snapshot = rx.borrow();
    Json(ApiResponse::success(HealthRow {
        snapshot_version: snapshot.version,
        last_update: snapshot.last_update,
        tick_count: snapshot.tick_count,
        windows_processed: snapshot.windows_processed,
        runtime_seconds: snapshot.runtime_seconds,
    }))
}

fn strategy_rows(snapshot: &EngineSnapshot) -> Vec<StrategyRow> {
    snapshot
        .strategies
        .iter()
        .map(|(id, s)| StrategyRow {
            id: id.clone(),
            series: s.series.clone(),
            name: s.name.clone(),
            trades: s.trades,
            wins: s.wins,
            losses: s.losses,
            win_rate: s.win_rate,
            bankroll: s.bankroll,
            profit: s.profit,
            roi: s.roi,
            current_streak: s.current_streak,
            pending: s.pending,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────
// WebSocket: push every published snapshot version
// ─────────────────────────────────────────────────────────────────

async fn websocket_handler(ws: WebSocketUpgrade, State(rx): State<SnapshotRx>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, rx))
}

async fn handle_websocket(socket: WebSocket, mut rx: SnapshotRx) {
    use futures_util::{SinkExt, StreamExt};

    info!("🖥️ New WebSocket connection");
    let (mut sender, mut receiver) = socket.split();

    // Send the current snapshot immediately.
    let initial = rx.borrow().clone();
    if let Ok(json) = serde_json::to_string(&initial) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break; // worker gone
                }
                let snapshot = rx.borrow_and_update().clone();
                let Ok(json) = serde_json::to_string(&snapshot) else { continue };
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    info!("🖥️ WebSocket connection closed");
}

/// Start the dashboard server
pub async fn start_server(snapshot_rx: SnapshotRx, bind_addr: &str) -> anyhow::Result<()> {
    let app = create_router(snapshot_rx);

    info!("🖥️ Dashboard API starting on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
