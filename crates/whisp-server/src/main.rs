//! # whisp-server
//!
//! Ephemeral anonymous messaging relay.
//!
//! This binary provides:
//! - **WebSocket endpoint** (`GET /ws`) speaking the JSON relay protocol:
//!   anonymous registration, direct chats, anonymous group chats, channels,
//!   file and voice attachments
//! - **Status endpoint** (`GET /status`) with live population counters
//! - **Janitor tasks** that sweep expired attachments and anonymous chats
//!
//! Nothing touches disk.  A restart forgets every user, chat and blob,
//! which is the point.

mod api;
mod config;
mod session;

use std::time::Instant;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use whisp_core::{Relay, RelayConfig};

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,whisp_server=debug")),
        )
        .init();

    info!("Starting whisp relay server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Relay state
    // -----------------------------------------------------------------------
    let relay = Relay::new(RelayConfig {
        channel_invite_domain: config.public_host.clone(),
        ..RelayConfig::default()
    });

    // -----------------------------------------------------------------------
    // 4. Spawn janitor tasks
    // -----------------------------------------------------------------------

    // Expired attachment sweep (every 5 minutes)
    let sweeper = relay.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweeper.config().attachment_sweep_period);
        loop {
            interval.tick().await;
            sweeper.sweep_expired_attachments(Utc::now()).await;
        }
    });

    // Expired anonymous chat sweep (every 10 minutes)
    let sweeper = relay.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweeper.config().chat_sweep_period);
        loop {
            interval.tick().await;
            sweeper.sweep_expired_anonymous_chats(Utc::now()).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let state = AppState {
        relay,
        started_at: Instant::now(),
    };

    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
