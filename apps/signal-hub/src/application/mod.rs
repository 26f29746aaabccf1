//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (bus, price store, time-series writer).
pub mod ports;

/// Application services for the price table, normalization and shipping.
pub mod services;
