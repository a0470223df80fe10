#![deny(missing_docs)]

//! Shared configuration, error types, IDs, and observability primitives for ODL crates.
//!
//! Architecture role:
//! - defines coordinator/worker configuration passed across layers
//! - provides common [`OdlError`] / [`Result`] contracts
//! - hosts the Prometheus metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

/// Coordinator configuration knobs and derived thresholds.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;
/// Metrics registry and Prometheus rendering helpers.
pub mod metrics;

pub use config::DdlConfig;
pub use error::{OdlError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;
