#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Stream Manager - Subscription Multiplexer
//!
//! Sits between many UI consumers and a native stream backend that owns
//! the actual provider connections (price feeds, wallet watchers). Each
//! subscription key is sent to the backend once, however many consumers
//! hold it, and the set of keys survives restarts.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `subscription`: Subscription classes and ref-counted key sets
//!   - `preferences`: Stream preferences and partial updates
//!   - `status`: Provider connection status and aggregate flags
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream backend, key-value storage, status feed
//!   - `services`: The stream manager, persistence, reconnect backoff
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `backend`: HTTP invoke adapter and polling status feed
//!   - `storage`: JSON file and in-memory key-value stores
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Consumer A ──┐                                  ┌──► subscribe_price_stream
//!              ├──► StreamManager (ref counts) ───┤
//! Consumer B ──┘          │      ▲                └──► unsubscribe_price_stream
//!                         ▼      │
//!                  KeyValueStore  StatusFeed ◄── get_stream_status (poll)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Subscription, preference and status types.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::preferences::{PreferencesPatch, StreamPreferences, StreamToggle};
pub use domain::status::{
    ConnectionState, ConnectionStatus, FallbackStatus, StatusSnapshot, StreamStatistics,
};
pub use domain::subscription::{
    RefCountedKeys, SubscriptionClass, SubscriptionKey, SubscriptionStats, TotalSubscriptionStats,
};

// Ports
pub use application::ports::{BackendError, KeyValueStore, StatusFeed, StorageError, StreamBackend};

// Services
pub use application::services::{
    BackoffConfig, ManagerSettings, StreamManager, StreamManagerError,
};

// Adapters
pub use infrastructure::backend::{HttpBackendConfig, HttpStreamBackend, polling_status_feed};
pub use infrastructure::storage::{FileKeyValueStore, InMemoryKeyValueStore};

// Infrastructure config
pub use infrastructure::config::{BackendSettings, ConfigError, ManagerConfig, ServerSettings};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
