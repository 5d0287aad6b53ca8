//! HTTP execution capability.
//!
//! [`HttpClient`] is what callers see: the outermost end of a middleware
//! pipeline, or a bare transport.

use std::future::Future;

use crate::{Request, Response, Result};

/// Core HTTP client trait.
///
/// This trait defines the interface for executing HTTP requests.
/// Implementations should be async-first and safe to share across tasks.
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    /// - Invalid request
    fn execute(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}
