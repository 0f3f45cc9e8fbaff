//! HTTP invoke adapter.
//!
//! Each backend command is `POST {base_url}/invoke/{command}` with a
//! camelCase JSON body. 2xx is success, any other status is a rejection
//! carrying the response text. No retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::application::ports::{BackendError, StreamBackend, commands};
use crate::domain::status::ConnectionStatus;

/// HTTP backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    /// Base URL of the backend, without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpBackendConfig {
    /// Config with the default 10 second timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct SymbolsArgs<'a> {
    symbols: &'a [String],
}

#[derive(Serialize)]
struct AddressesArgs<'a> {
    addresses: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderArgs<'a> {
    provider_id: &'a str,
}

#[derive(Serialize)]
struct NoArgs {}

/// `StreamBackend` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStreamBackend {
    client: Client,
    base_url: String,
}

impl HttpStreamBackend {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, command: &str) -> String {
        format!("{}/invoke/{command}", self.base_url)
    }

    async fn invoke<B: Serialize + Sync>(
        &self,
        command: &str,
        args: &B,
    ) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.url(command))
            .json(args)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if status.is_success() {
            tracing::trace!(command, %status, "Backend call succeeded");
            return Ok(text);
        }

        let message = if text.is_empty() {
            status.to_string()
        } else {
            text
        };
        Err(BackendError::Rejected {
            command: command.to_string(),
            message,
        })
    }
}

#[async_trait]
impl StreamBackend for HttpStreamBackend {
    async fn subscribe_price_stream(&self, symbols: &[String]) -> Result<(), BackendError> {
        self.invoke(commands::SUBSCRIBE_PRICE_STREAM, &SymbolsArgs { symbols })
            .await
            .map(drop)
    }

    async fn unsubscribe_price_stream(&self, symbols: &[String]) -> Result<(), BackendError> {
        self.invoke(commands::UNSUBSCRIBE_PRICE_STREAM, &SymbolsArgs { symbols })
            .await
            .map(drop)
    }

    async fn subscribe_wallet_stream(&self, addresses: &[String]) -> Result<(), BackendError> {
        self.invoke(commands::SUBSCRIBE_WALLET_STREAM, &AddressesArgs { addresses })
            .await
            .map(drop)
    }

    async fn unsubscribe_wallet_stream(&self, addresses: &[String]) -> Result<(), BackendError> {
        self.invoke(commands::UNSUBSCRIBE_WALLET_STREAM, &AddressesArgs { addresses })
            .await
            .map(drop)
    }

    async fn get_stream_status(&self) -> Result<Vec<ConnectionStatus>, BackendError> {
        let body = self.invoke(commands::GET_STREAM_STATUS, &NoArgs {}).await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn reconnect_stream(&self, provider_id: &str) -> Result<(), BackendError> {
        self.invoke(commands::RECONNECT_STREAM, &ProviderArgs { provider_id })
            .await
            .map(drop)
    }
}
