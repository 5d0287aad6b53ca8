//! Tower middleware layers for interlay pipelines.
//!
//! Each middleware is a [`Layer`] over a handler taking a [`Request`] and
//! producing a [`Response`]. They can be stacked through
//! [`PipelineBuilder`](crate::PipelineBuilder) or any tower
//! [`ServiceBuilder`].
//!
//! # Available Layers
//!
//! - [`CacheLayer`] - Serves repeated requests from a [`CacheStore`]
//! - [`RetryPolicy`] - Retry decision and backoff for [`RetryLayer`]
//! - [`LogLayer`] - One redacted log entry per exchange
//! - [`UserAgentLayer`] - Random `User-Agent` from a fixed pool
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use interlay::middleware::{CacheConfig, CacheLayer, RetryConfig, RetryLayer, RetryPolicy};
//! use interlay::{HyperTransport, MemoryStore};
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CacheLayer::new(Arc::new(MemoryStore::new())).with_config(CacheConfig::default()))
//!     .layer(RetryLayer::new(RetryPolicy::new(RetryConfig::default())))
//!     .service(HyperTransport::default());
//! ```
//!
//! [`Request`]: crate::Request
//! [`Response`]: crate::Response
//! [`CacheStore`]: crate::CacheStore

mod cache;
mod logging;
mod retry;
mod user_agent;

pub use cache::{
    Cache, CacheConfig, CacheLayer, DEBUG_HEADER, DEBUG_HEADER_HIT, DEBUG_HEADER_MISS, DEFAULT_TTL,
};
pub use logging::{Log, LogConfig, LogLayer};
pub use retry::{
    Backoff, DEFAULT_MAX_RETRIES, RetryConfig, RetryDecider, RetryPolicy, SERVER_ERROR_THRESHOLD,
};
pub use user_agent::{RandomSource, USER_AGENT_HEADER, UserAgent, UserAgentLayer};

// Re-export tower types for convenience
pub use tower::retry::RetryLayer;
pub use tower::{Layer, ServiceBuilder};
