//! Composable HTTP client middleware.
//!
//! A [`Pipeline`] wraps a transport with tower layers: response caching,
//! retry on transient failures, credential-safe logging and user-agent
//! rotation. Each layer can also be used on its own through
//! [`middleware`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use interlay::prelude::*;
//!
//! let pipeline = Pipeline::builder()
//!     .logger(TracingLogger::shared())
//!     .with_logging(LogConfig::default().with_credentials(["s3cr3t"]))?
//!     .with_retry(RetryConfig::default())
//!     .with_cache(Arc::new(MemoryStore::new()), CacheConfig::default())
//!     .with_user_agents(["interlay/0.1", "interlay/0.2"])?
//!     .build_hyper();
//!
//! let url = "https://api.example.com/users/42".parse()?;
//! let response = pipeline.execute(Request::builder(Method::Get, url).build()).await?;
//! ```

pub mod cache_key;
#[cfg(feature = "hyper-transport")]
mod config;
#[cfg(feature = "hyper-transport")]
mod connector;
pub mod formatter;
pub mod logger;
pub mod middleware;
mod pipeline;
pub mod prelude;
mod store;
#[cfg(feature = "hyper-transport")]
mod transport;
pub mod ttl;

#[cfg(test)]
mod test_support;

// Re-export pipeline types
pub use pipeline::{BoxedService, Pipeline, PipelineBuilder, ServiceFuture};
pub use store::MemoryStore;

#[cfg(feature = "hyper-transport")]
pub use config::{TransportConfig, TransportConfigBuilder};
#[cfg(feature = "hyper-transport")]
pub use transport::HyperTransport;

pub use formatter::{CREDENTIAL_REPLACEMENT, MessageFormatter, Template};
pub use logger::{LogLevel, Logger, SharedLogger, TracingLogger};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use interlay_core::{
    CacheEntry, CacheStore, Error, Headers, HttpClient, Method, Request, RequestBuilder,
    RequestOptions, Response, Result, StoreError,
};

pub use url;
