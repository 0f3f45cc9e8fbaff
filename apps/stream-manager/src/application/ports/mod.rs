//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamBackend`: Request/response RPCs to the native stream backend
//! - `KeyValueStore`: Durable string slots for persisted manager state
//! - `StatusFeed`: Push stream of provider status lists

mod status_feed_port;
mod storage_port;
mod stream_backend_port;

pub use status_feed_port::StatusFeed;
pub use storage_port::{KeyValueStore, StorageError};
pub use stream_backend_port::{BackendError, StreamBackend, commands};

#[cfg(test)]
pub use stream_backend_port::MockStreamBackend;
