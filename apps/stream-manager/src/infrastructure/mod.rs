//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the service's ambient plumbing.

/// Stream backend adapters (HTTP invoke, polling status feed).
pub mod backend;

/// Key-value storage adapters (JSON file, in-memory).
pub mod storage;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
