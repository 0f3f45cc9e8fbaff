//! Application Layer - Manager service and port definitions.
//!
//! This layer contains the subscription manager service and the port
//! interfaces that define how it reaches the backend and local storage.

/// Port interfaces for external systems (backend RPC, storage, status feed).
pub mod ports;

/// Application services for subscription and status management.
pub mod services;
