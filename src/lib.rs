//! vidrelay - multi-source video stream resolver
//!
//! Resolves playable stream URLs and video metadata by querying federated
//! mirror APIs, a last-resort high-quality mirror and local extraction
//! workers, falling back from one source to the next.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`pool`] - Endpoint health tracking with failure cooldowns
//! - [`cache`] - Time-bounded memoization of backend responses
//! - [`sources`] - Source adapters (federated APIs, mirror, workers)
//! - [`reconcile`] - Format de-duplication, audio assignment and ordering
//! - [`resolver`] - Ordered fallback chain for stream resolution
//! - [`portal`] - Query surface tying everything together
//! - [`utils`] - Clock abstraction and lenient parsing helpers
//!
//! # Example
//!
//! ```no_run
//! use vidrelay::config::Config;
//! use vidrelay::portal::Portal;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let portal = Portal::new(config)?;
//!     let stream = portal.resolve_stream("dQw4w9WgXcQ").await?;
//!     println!("{}", stream.best_url);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod portal;
pub mod reconcile;
pub mod resolver;
pub mod sources;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, VidrelayErrorTrait};
    pub use crate::models::{
        CanonicalVideoInfo, Endpoint, ProtocolKind, ReconciledFormat, StreamResolutionResult,
    };
    pub use crate::portal::Portal;
    pub use crate::resolver::StreamResolver;
    pub use crate::sources::SourceAdapter;
}

// Direct re-exports for convenience
pub use models::{CanonicalVideoInfo, ProtocolKind, StreamResolutionResult};
