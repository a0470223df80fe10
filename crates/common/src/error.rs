use thiserror::Error;

/// Canonical ODL error taxonomy used across crates.
///
/// Classification guidance:
/// - [`OdlError::InvalidConfig`]: configuration/environment contract violations
/// - [`OdlError::Catalog`]: schema/topology lookups that fail or return inconsistent state
/// - [`OdlError::Schedule`]: scheduler/controller state-machine contract violations
/// - [`OdlError::Persistence`]: meta-store encode/decode/apply failures
/// - [`OdlError::Io`]: raw filesystem IO failures from std APIs
#[derive(Debug, Error)]
pub enum OdlError {
    /// Invalid or inconsistent configuration.
    ///
    /// Examples:
    /// - zero heartbeat interval or retry budget
    /// - malformed catalog snapshot file
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catalog/topology failures.
    ///
    /// Examples:
    /// - unknown table or index
    /// - index visibility state not yet readable after a DDL request
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Scheduling and state-machine failures.
    ///
    /// Examples:
    /// - duplicate DDL job submitted for a table
    /// - status report for a table with no in-flight job
    #[error("scheduling error: {0}")]
    Schedule(String),

    /// Durable meta-store failures.
    ///
    /// Examples:
    /// - value encode/decode mismatch
    /// - consensus-log apply rejected
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid request for behavior not implemented in the current version.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard ODL result alias.
pub type Result<T> = std::result::Result<T, OdlError>;
