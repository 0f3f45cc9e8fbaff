//! Stream Backend Adapters
//!
//! HTTP implementation of the `StreamBackend` port and a polling
//! `StatusFeed` built on top of any backend.

mod http;
mod polling;

pub use http::{HttpBackendConfig, HttpStreamBackend};
pub use polling::polling_status_feed;
