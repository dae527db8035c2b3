//! Provider connection settings.

use std::fmt;
use std::time::Duration;

use relaychat_core::ConfigError;
use url::Url;

/// Which request shape the provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFlavor<'a> {
    /// Azure OpenAI deployment addressed by `api-version`.
    Azure { api_version: &'a str },
    /// Plain OpenAI-compatible `/v1/chat/completions`.
    OpenAi,
}

/// Connection settings for the completion provider.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    /// Credential. Sent as a header only.
    pub api_key: String,
    /// Deployment name (Azure) or model id (OpenAI).
    pub model: String,
    /// Azure API version. `None` selects the OpenAI flavor.
    pub api_version: Option<String>,
    /// Bound on connecting and receiving response headers.
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn flavor(&self) -> ProviderFlavor<'_> {
        match self.api_version.as_deref() {
            Some(api_version) => ProviderFlavor::Azure { api_version },
            None => ProviderFlavor::OpenAi,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("ENDPOINT"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("API_KEY"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("MODEL_NAME"));
        }
        if self.api_version.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                key: "API_VERSION",
                reason: "must not be blank when set".to_string(),
            });
        }

        let url = Url::parse(self.endpoint.trim()).map_err(|e| ConfigError::Invalid {
            key: "ENDPOINT",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "ENDPOINT",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(())
    }

    /// Full URL of the streaming completion call.
    pub fn completion_url(&self) -> Result<Url, ConfigError> {
        let base = self.endpoint.trim().trim_end_matches('/');
        let invalid = |e: url::ParseError| ConfigError::Invalid {
            key: "ENDPOINT",
            reason: e.to_string(),
        };

        match self.flavor() {
            ProviderFlavor::Azure { api_version } => {
                let mut url = Url::parse(&format!(
                    "{base}/openai/deployments/{}/chat/completions",
                    self.model
                ))
                .map_err(invalid)?;
                url.query_pairs_mut().append_pair("api-version", api_version);
                Ok(url)
            }
            ProviderFlavor::OpenAi => {
                Url::parse(&format!("{base}/v1/chat/completions")).map_err(invalid)
            }
        }
    }
}
