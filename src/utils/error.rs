//! Error types for source adapters and stream resolution
//!
//! `SourceError` covers everything that can go wrong while talking to a
//! single backend; `ResolveError` is what the resolver hands back to its
//! caller once every tier has been tried.

use std::fmt;

use thiserror::Error;

use crate::models::ProtocolKind;

/// Errors raised while querying one source (endpoint, worker or adapter)
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network failure reaching an endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request or worker call exceeded its timeout
    #[error("Request timeout")]
    Timeout,

    /// Endpoint answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// Response body did not match the expected shape
    #[error("Unexpected response shape: {0}")]
    Parse(String),

    /// Every endpoint of a protocol failed or is cooling down
    #[error("All {protocol} endpoints exhausted after {attempts} attempt(s)")]
    Exhausted { protocol: ProtocolKind, attempts: usize },

    /// No endpoint is configured for the protocol at all
    #[error("No endpoints configured for {0}")]
    NoEndpoints(ProtocolKind),

    /// The source answered but offered no playable format
    #[error("Source returned no playable formats")]
    NoFormats,

    /// External worker process failed
    #[error("Worker error: {0}")]
    Worker(String),

    /// Capability is not offered by this source
    #[error("Capability not supported: {0}")]
    Unsupported(&'static str),

    /// Id cannot be addressed safely (path separators, blanks, ...)
    #[error("Invalid id: {0:?}")]
    InvalidId(String),
}

impl SourceError {
    /// Whether the failure should put the endpoint into cooldown
    pub fn counts_against_endpoint(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::Status(_) | Self::Parse(_)
        )
    }

    /// Whether the source as a whole gave up rather than one endpoint
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::NoEndpoints(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Why one resolver tier did not produce a result
#[derive(Debug)]
pub enum TierFailureReason {
    /// The tier exceeded the per-step timeout
    TimedOut,
    /// The tier returned a result with no formats
    EmptyFormats,
    /// The tier reported a source error
    Source(SourceError),
}

impl fmt::Display for TierFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "step timed out"),
            Self::EmptyFormats => write!(f, "no formats"),
            Self::Source(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TierFailureReason {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::TimedOut | Self::EmptyFormats => None,
        }
    }
}

/// One failed step of the resolution chain
#[derive(Debug)]
pub struct TierFailure {
    pub tier: String,
    pub reason: TierFailureReason,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.reason)
    }
}

/// Errors surfaced by the stream resolver
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Every tier failed; reported to callers as "stream unavailable"
    #[error("Stream unavailable for {content_id} ({} tier(s) tried)", .failures.len())]
    ChainExhausted {
        content_id: String,
        failures: Vec<TierFailure>,
    },

    /// The content id is empty or malformed
    #[error("Invalid content id: {0:?}")]
    InvalidContentId(String),
}

impl ResolveError {
    /// Per-tier failure details, empty for non-chain errors
    pub fn failures(&self) -> &[TierFailure] {
        match self {
            Self::ChainExhausted { failures, .. } => failures,
            Self::InvalidContentId(_) => &[],
        }
    }
}
