//! Command-line and environment configuration.
//!
//! Every flag can also be supplied through the environment variable named
//! next to it, and therefore through a `.env` file.

use std::time::Duration;

use clap::Parser;
use relaychat_axum::{CorsConfig, ServerConfig};
use relaychat_core::{
    ConfigError, DEFAULT_RATE_LIMIT, DEFAULT_TIME_WINDOW_SECS, RateLimitSettings, RelaySettings,
};
use relaychat_upstream::UpstreamConfig;

/// Relay chat completions from a model provider to WebSocket and SSE clients.
#[derive(Parser, Debug)]
#[command(name = "relaychat")]
#[command(about = "Stream chat completions to WebSocket and SSE clients")]
#[command(version)]
pub struct Cli {
    /// Provider base URL
    #[arg(long, env = "ENDPOINT")]
    pub endpoint: Option<String>,

    /// Provider credential
    #[arg(long = "api-key", env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Deployment name (Azure) or model id
    #[arg(long = "model", env = "MODEL_NAME")]
    pub model: Option<String>,

    /// Azure OpenAI API version; omit for an OpenAI-compatible provider
    #[arg(long = "api-version", env = "API_VERSION")]
    pub api_version: Option<String>,

    /// Upstream calls allowed per window, and at once
    #[arg(long = "rate-limit", env = "RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: usize,

    /// Sliding window length in seconds
    #[arg(long = "time-window", env = "TIME_WINDOW", default_value_t = DEFAULT_TIME_WINDOW_SECS)]
    pub time_window: u64,

    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Seconds to wait for the provider to answer, and between fragments
    #[arg(long = "upstream-timeout", env = "UPSTREAM_TIMEOUT")]
    pub upstream_timeout: Option<u64>,

    /// Seconds a turn may wait for admission before failing
    #[arg(long = "admission-timeout", env = "ADMISSION_TIMEOUT")]
    pub admission_timeout: Option<u64>,

    /// Comma-separated CORS origins; all origins when unset
    #[arg(long = "allowed-origins", env = "ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Validate and assemble the server configuration.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let upstream_timeout = self.upstream_timeout.map(Duration::from_secs);

        let mut rate_limit =
            RateLimitSettings::new(self.rate_limit, Duration::from_secs(self.time_window));
        if let Some(secs) = self.admission_timeout {
            rate_limit = rate_limit.with_admission_timeout(Duration::from_secs(secs));
        }
        let relay = RelaySettings {
            rate_limit,
            fragment_timeout: upstream_timeout,
        };
        relay.validate()?;

        let upstream = UpstreamConfig {
            endpoint: self.endpoint.unwrap_or_default(),
            api_key: self.api_key.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            api_version: self.api_version.filter(|v| !v.trim().is_empty()),
            request_timeout: upstream_timeout,
        };
        upstream.validate()?;

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            cors: CorsConfig::from_origin_list(self.allowed_origins.as_deref()),
            relay,
            upstream,
        })
    }
}
