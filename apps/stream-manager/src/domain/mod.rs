//! Domain Layer - Subscription, preference, and status types.
//!
//! This layer contains the core types for subscription tracking with no
//! knowledge of transports or storage. All types here are pure Rust with
//! serialization support.

/// Stream preferences and partial updates.
pub mod preferences;

/// Provider connection status and aggregate flags.
pub mod status;

/// Reference-counted subscription tracking.
pub mod subscription;
