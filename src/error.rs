//! Unified error handling for the vidrelay crate
//!
//! This module provides a unified error type that consolidates the
//! source-level and resolver-level errors into a single `Error` enum, while
//! keeping the domain-specific errors usable on their own.
//!
//! # Architecture
//!
//! - [`VidrelayErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

pub use crate::utils::error::{ResolveError, SourceError, TierFailure, TierFailureReason};

/// Common trait for all vidrelay error types
pub trait VidrelayErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, status)
    Network,
    /// Response shape and decoding errors
    Parsing,
    /// External worker process errors
    Worker,
    /// Stream resolution outcome errors
    Resolution,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Worker => "worker",
            Self::Resolution => "resolution",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl VidrelayErrorTrait for SourceError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Exhausted { .. } | Self::Worker(_) => true,
            Self::Status(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Parse(_)
            | Self::NoEndpoints(_)
            | Self::NoFormats
            | Self::Unsupported(_)
            | Self::InvalidId(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Status(_) | Self::Exhausted { .. } => {
                ErrorCategory::Network
            }
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::Worker(_) => ErrorCategory::Worker,
            Self::NoEndpoints(_) => ErrorCategory::Config,
            Self::NoFormats | Self::Unsupported(_) | Self::InvalidId(_) => {
                ErrorCategory::Resolution
            }
        }
    }
}

impl VidrelayErrorTrait for TierFailureReason {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::TimedOut => true,
            Self::EmptyFormats => false,
            Self::Source(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::TimedOut => ErrorCategory::Network,
            Self::EmptyFormats => ErrorCategory::Resolution,
            Self::Source(e) => e.category(),
        }
    }
}

impl VidrelayErrorTrait for ResolveError {
    /// A later attempt may succeed when any tier failed transiently
    fn is_recoverable(&self) -> bool {
        self.failures().iter().any(|f| f.reason.is_recoverable())
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Resolution
    }
}

/// Unified error type for the vidrelay crate
#[derive(Error, Debug)]
pub enum Error {
    /// Source adapter errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Stream resolution errors
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl VidrelayErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_recoverable(),
            Self::Resolve(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(e) => e.category(),
            Self::Resolve(e) => e.category(),
            Self::Http(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProtocolKind;

    #[test]
    fn test_error_category() {
        let err = Error::Source(SourceError::Timeout);
        assert_eq!(err.category(), ErrorCategory::Network);

        let err = Error::Source(SourceError::Parse("missing field".into()));
        assert_eq!(err.category(), ErrorCategory::Parsing);

        let err = Error::Source(SourceError::NoEndpoints(ProtocolKind::Piped));
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Source(SourceError::Timeout).is_recoverable());
        assert!(Error::Source(SourceError::Status(503)).is_recoverable());
        assert!(!Error::Source(SourceError::Status(404)).is_recoverable());
        assert!(!Error::Source(SourceError::Parse("x".into())).is_recoverable());
    }

    #[test]
    fn test_resolve_error_conversion() {
        let err: Error = ResolveError::InvalidContentId(String::new()).into();
        assert!(matches!(err, Error::Resolve(_)));
        assert_eq!(err.category(), ErrorCategory::Resolution);
    }

    #[test]
    fn test_tier_failure_classification() {
        assert!(TierFailureReason::TimedOut.is_recoverable());
        assert_eq!(TierFailureReason::TimedOut.category(), ErrorCategory::Network);
        assert!(!TierFailureReason::EmptyFormats.is_recoverable());

        let worker = TierFailureReason::Source(SourceError::Worker("exit 1".into()));
        assert_eq!(worker.category(), ErrorCategory::Worker);

        let transient = ResolveError::ChainExhausted {
            content_id: "abc".into(),
            failures: vec![
                TierFailure {
                    tier: "invidious".into(),
                    reason: TierFailureReason::EmptyFormats,
                },
                TierFailure {
                    tier: "mirror".into(),
                    reason: TierFailureReason::TimedOut,
                },
            ],
        };
        assert!(transient.is_recoverable());

        let permanent = ResolveError::ChainExhausted {
            content_id: "abc".into(),
            failures: vec![TierFailure {
                tier: "mirror".into(),
                reason: TierFailureReason::EmptyFormats,
            }],
        };
        assert!(!permanent.is_recoverable());
        assert!(!ResolveError::InvalidContentId("a/b".into()).is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("no tiers configured");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Config error: no tiers configured");
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(ErrorCategory::Other.as_str(), "other");
    }
}
