//! Stream Backend Port (Driven Port)
//!
//! Request/response interface to the native backend that owns the actual
//! provider connections. Every call may suspend; none can be cancelled.

use async_trait::async_trait;

use crate::domain::status::ConnectionStatus;

/// Backend RPC error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend received the call and rejected it.
    #[error("{command} rejected: {message}")]
    Rejected {
        /// Backend command name.
        command: String,
        /// Backend-provided reason.
        message: String,
    },

    /// The call never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// RPC boundary to the stream backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Start price streams for symbols.
    async fn subscribe_price_stream(&self, symbols: &[String]) -> Result<(), BackendError>;

    /// Stop price streams for symbols.
    async fn unsubscribe_price_stream(&self, symbols: &[String]) -> Result<(), BackendError>;

    /// Start wallet streams for addresses.
    async fn subscribe_wallet_stream(&self, addresses: &[String]) -> Result<(), BackendError>;

    /// Stop wallet streams for addresses.
    async fn unsubscribe_wallet_stream(&self, addresses: &[String]) -> Result<(), BackendError>;

    /// Fetch the current status of every provider.
    async fn get_stream_status(&self) -> Result<Vec<ConnectionStatus>, BackendError>;

    /// Ask the backend to reconnect one provider.
    async fn reconnect_stream(&self, provider_id: &str) -> Result<(), BackendError>;
}

/// Backend command names.
pub mod commands {
    /// Start price streams.
    pub const SUBSCRIBE_PRICE_STREAM: &str = "subscribe_price_stream";
    /// Stop price streams.
    pub const UNSUBSCRIBE_PRICE_STREAM: &str = "unsubscribe_price_stream";
    /// Start wallet streams.
    pub const SUBSCRIBE_WALLET_STREAM: &str = "subscribe_wallet_stream";
    /// Stop wallet streams.
    pub const UNSUBSCRIBE_WALLET_STREAM: &str = "unsubscribe_wallet_stream";
    /// Fetch provider status.
    pub const GET_STREAM_STATUS: &str = "get_stream_status";
    /// Reconnect one provider.
    pub const RECONNECT_STREAM: &str = "reconnect_stream";
}
