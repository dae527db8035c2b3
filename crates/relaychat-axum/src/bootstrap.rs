//! Axum server bootstrap - the composition root.
//!
//! This module is the ONLY place where the relay is wired to a concrete
//! upstream. Handlers only ever see the [`StreamRelay`] inside
//! [`AxumContext`].

use std::sync::Arc;

use anyhow::{Context, Result};
use relaychat_core::{RateLimiter, RelaySettings, StreamRelay, UpstreamPort};
use relaychat_upstream::{OpenAiUpstream, UpstreamConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::routes::create_router;

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsConfig {
    /// Allow all origins.
    #[default]
    AllowAll,
    /// Allow specific origins.
    AllowOrigins(Vec<String>),
}

impl CorsConfig {
    /// Build from a comma-separated origin list. Empty means allow all.
    pub fn from_origin_list(list: Option<&str>) -> Self {
        let origins: Vec<String> = list
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() {
            Self::AllowAll
        } else {
            Self::AllowOrigins(origins)
        }
    }
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port for the HTTP server.
    pub port: u16,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// Limiter and relay timeouts.
    pub relay: RelaySettings,
    /// Completion provider.
    pub upstream: UpstreamConfig,
}

/// Application context for the Axum adapter.
#[derive(Debug, Clone)]
pub struct AxumContext {
    /// The relay shared by every session.
    pub relay: StreamRelay,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AxumContext {
    /// Wrap an already-built relay.
    pub fn new(relay: StreamRelay, shutdown: CancellationToken) -> Self {
        Self { relay, shutdown }
    }
}

/// Build the limiter, upstream client and relay from configuration.
pub fn bootstrap(config: &ServerConfig, shutdown: CancellationToken) -> Result<AxumContext> {
    config.relay.validate()?;
    let limiter = Arc::new(RateLimiter::new(config.relay.rate_limit)?);
    let upstream: Arc<dyn UpstreamPort> = Arc::new(OpenAiUpstream::new(config.upstream.clone())?);

    info!(
        model = %config.upstream.model,
        flavor = ?config.upstream.flavor(),
        rate_limit = limiter.limit(),
        window_secs = limiter.window().as_secs(),
        "Relay configured"
    );

    let relay =
        StreamRelay::new(limiter, upstream).with_fragment_timeout(config.relay.fragment_timeout);
    Ok(AxumContext::new(relay, shutdown))
}

/// Serve until `shutdown` is cancelled.
///
/// On shutdown the limiter is closed first, so queued turns fail fast
/// instead of holding connections open.
pub async fn start_server(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let ctx = bootstrap(&config, shutdown.clone())?;
    let limiter = Arc::clone(ctx.relay.limiter());
    let app = create_router(ctx, &config.cors);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!("relaychat listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Shutdown requested, closing admissions");
            limiter.close();
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
