//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use whisp_shared::constants::DEFAULT_HTTP_PORT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR` (full address) or `PORT` (port only).
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Host part of generated channel invite links.
    /// Env: `PUBLIC_HOST`
    /// Default: `yourdomain.com`
    pub public_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            public_host: "yourdomain.com".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        // PORT alone rebinds just the port, the shape most hosts inject.
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.http_addr.set_port(parsed);
            } else {
                tracing::warn!(value = %port, "Invalid PORT, keeping current address");
            }
        }

        if let Ok(host) = std::env::var("PUBLIC_HOST") {
            if !host.is_empty() {
                config.public_host = host;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
