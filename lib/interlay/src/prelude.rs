//! Prelude module for convenient imports.
//!
//! ```ignore
//! use interlay::prelude::*;
//! ```

pub use crate::middleware::{Backoff, CacheConfig, LogConfig, RandomSource, RetryConfig};
pub use crate::{
    CacheStore, Error, Headers, HttpClient, LogLevel, Logger, MemoryStore, Method, Pipeline,
    PipelineBuilder, Request, RequestBuilder, Response, Result, SharedLogger, TracingLogger,
};

#[cfg(feature = "hyper-transport")]
pub use crate::{HyperTransport, TransportConfig};
