//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Message bus adapters (in-memory, Redis pub/sub).
pub mod bus;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// InfluxDB line-protocol writer.
pub mod influx;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Startup dependency waits.
pub mod startup;

/// Price store adapters (Redis hash, in-memory).
pub mod store;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
