//! Application Services
//!
//! - `StreamManager`: ref-counted subscriptions, preferences and status cache
//! - `PersistedState`: durable slots behind a `KeyValueStore`
//! - `ReconnectBackoff`: per-provider backoff for automatic reconnects

pub mod persistence;
pub mod reconnect;
pub mod stream_manager;

pub use persistence::{
    PREFERENCES_KEY, PRICE_SUBSCRIPTIONS_KEY, PersistedState, WALLET_SUBSCRIPTIONS_KEY,
};
pub use reconnect::{BackoffConfig, ReconnectBackoff};
pub use stream_manager::{ManagerSettings, StreamManager, StreamManagerError};
