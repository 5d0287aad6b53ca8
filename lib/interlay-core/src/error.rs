//! Error types for interlay.

use derive_more::{Display, Error, From};

// ============================================================================
// Store Error
// ============================================================================

/// Failure reported by a [`CacheStore`](crate::CacheStore).
///
/// The cache middleware never lets these escape to the caller; they only end
/// up in the logs.
#[derive(Debug, Display, Error)]
pub enum StoreError {
    /// The store backend could not be reached or refused the operation.
    #[display("cache store unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),

    /// A stored entry could not be encoded or decoded.
    #[display("cache entry codec error: {_0}")]
    Codec(#[error(not(source))] String),
}

impl StoreError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for interlay operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// Header name or value rejected.
    #[display("invalid header: {_0}")]
    #[from(skip)]
    InvalidHeader(#[error(not(source))] String),

    /// Construction-time invariant violated.
    #[display("invalid configuration: {_0}")]
    #[from(skip)]
    Configuration(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// Cache store error.
    #[display("{_0}")]
    #[from]
    Store(StoreError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the transport could not complete the exchange at all.
    ///
    /// Connection, TLS handshake and timeout failures fall in this class.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_) | Self::Timeout)
    }
}
