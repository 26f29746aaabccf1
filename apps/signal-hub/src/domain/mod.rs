//! Domain Layer - Core market signal types.
//!
//! This layer contains the core domain types with no I/O: asset prices,
//! topics and their payload schemas, and normalized time-series points.

/// Per-topic payload schemas and the tagged decode step.
pub mod feeds;

/// Normalized time-series points.
pub mod point;

/// Asset prices, price updates and the readiness set.
pub mod price;

/// Known bus topics.
pub mod topic;
