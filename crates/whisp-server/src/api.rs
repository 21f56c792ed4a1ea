use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::Method,
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use whisp_core::Relay;
use whisp_shared::constants::MAX_WS_FRAME_BYTES;

use crate::session;

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub started_at: Instant,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/status", get(status))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    users: usize,
    chats: usize,
    uptime: u64,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let counts = state.relay.counts().await;
    Json(StatusResponse {
        status: "online",
        users: counts.users,
        chats: counts.chats,
        uptime: state.started_at.elapsed().as_secs(),
    })
}

/// Upgrade to the relay protocol.  The frame cap leaves room for the
/// largest accepted upload in its transport encoding.
async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(MAX_WS_FRAME_BYTES)
        .max_frame_size(MAX_WS_FRAME_BYTES)
        .on_upgrade(move |socket| session::run(socket, state.relay))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
