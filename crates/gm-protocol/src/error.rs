//! Query error taxonomy shared by every GcpMon crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cloud domain a query was issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Data warehouse (datasets, job metadata).
    Warehouse,
    /// Scheduled batch jobs and their executions.
    BatchJobs,
    /// Execution logs.
    Logging,
    /// Time-series metrics.
    Monitoring,
    /// Virtual machine inventory.
    Compute,
    /// Identity accounts.
    Identity,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::BatchJobs => "batch_jobs",
            Self::Logging => "logging",
            Self::Monitoring => "monitoring",
            Self::Compute => "compute",
            Self::Identity => "identity",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while validating or executing a query.
///
/// Resolution outcomes (ambiguous or missing matches) are not
/// part of this enum; they travel as `MatchResult` values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// Malformed resource path or identifier. Caller-fixable, never retried.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Non-positive day or minute count.
    #[error("invalid window: {0}")]
    InvalidWindow(String),

    /// Network, auth or quota failure from a backing service.
    #[error("{domain} backend unavailable: {message}")]
    BackendUnavailable { domain: Domain, message: String },

    /// A backend record is missing a field that cannot be skipped.
    #[error("malformed {domain} record: {message}")]
    MalformedRecord { domain: Domain, message: String },

    /// Tool name not present in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed to deserialize.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl QueryError {
    pub fn backend(domain: Domain, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            domain,
            message: message.into(),
        }
    }

    /// Whether a caller may retry this failure with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Convenience alias for query results.
pub type QueryResult<T> = Result<T, QueryError>;
