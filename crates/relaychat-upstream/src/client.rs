//! Streaming completion client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use relaychat_core::{ChatRequest, ConfigError, StreamFragment, UpstreamError, UpstreamPort};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ProviderFlavor, UpstreamConfig};
use crate::sse::pump;

/// Longest error body echoed back to clients.
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct CompletionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [relaychat_core::ChatMessage],
    stream: bool,
}

/// Upstream adapter for Azure OpenAI and OpenAI-compatible providers.
///
/// One instance is shared by every session; `reqwest::Client` pools
/// connections internally.
#[derive(Debug, Clone)]
pub struct OpenAiUpstream {
    client: Client,
    config: UpstreamConfig,
    url: Url,
}

impl OpenAiUpstream {
    pub fn new(config: UpstreamConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let url = config.completion_url()?;

        let mut builder = Client::builder().pool_max_idle_per_host(10);
        if let Some(timeout) = config.request_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| ConfigError::Invalid {
            key: "ENDPOINT",
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            config,
            url,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Send the request and wait for response headers.
    async fn open(&self, request: &ChatRequest) -> Result<reqwest::Response, UpstreamError> {
        let flavor = self.config.flavor();
        let body = CompletionBody {
            model: match flavor {
                ProviderFlavor::Azure { .. } => None,
                ProviderFlavor::OpenAi => Some(self.config.model.as_str()),
            },
            messages: request.messages(),
            stream: true,
        };

        let builder = self
            .client
            .post(self.url.clone())
            .header("accept", "text/event-stream")
            .json(&body);
        let builder = match flavor {
            ProviderFlavor::Azure { .. } => builder.header("api-key", &self.config.api_key),
            ProviderFlavor::OpenAi => builder.bearer_auth(&self.config.api_key),
        };

        debug!(
            model = %self.config.model,
            messages = request.len(),
            "Opening upstream completion stream"
        );

        let response = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, builder.send())
                .await
                .map_err(|_| UpstreamError::Timeout(describe(limit)))?,
            None => builder.send().await,
        }
        .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl UpstreamPort for OpenAiUpstream {
    async fn stream_into(&self, request: ChatRequest, tx: mpsc::Sender<StreamFragment>) {
        let response = match self.open(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(model = %self.config.model, "Upstream request failed: {e}");
                let _ = tx.send(StreamFragment::Error(e)).await;
                return;
            }
        };

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error));
        pump(body, &tx).await;
    }
}

/// Translate a transport error, keeping the URL out of the message.
fn map_reqwest_error(err: reqwest::Error) -> UpstreamError {
    let is_timeout = err.is_timeout();
    let is_body = err.is_body() || err.is_decode();
    let message = err.without_url().to_string();

    if is_timeout {
        UpstreamError::Timeout(message)
    } else if is_body {
        UpstreamError::Stream(message)
    } else {
        UpstreamError::Request(message)
    }
}

fn describe(limit: Duration) -> String {
    format!("no response within {}ms", limit.as_millis())
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
