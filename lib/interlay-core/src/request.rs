//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers, query parameters, and bodies.
//!
//! # Example
//!
//! ```
//! use interlay_core::{Method, Request};
//!
//! let request = Request::builder(Method::Get, "https://api.example.com".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build();
//! ```
//!
//! The body is a [`Bytes`] buffer: reading it never consumes it, so the cache
//! key deriver and the transport can both see the full payload.

use bytes::Bytes;

use crate::{Headers, Method};

/// Per-call options carried alongside a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Consult and populate the response cache for this call.
    ///
    /// Defaults to `true`; `false` sends the request straight past the cache.
    pub cache: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// An HTTP request with method, URL, headers, body, and per-call options.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: url::Url,
    headers: Headers,
    body: Bytes,
    options: RequestOptions,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Request body, empty when none was set.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Per-call options.
    #[must_use]
    pub const fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Mutable access to per-call options.
    #[must_use]
    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, url::Url, Headers, Bytes) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: url::Url,
    headers: Headers,
    body: Bytes,
    options: RequestOptions,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
            options: RequestOptions::default(),
        }
    }

    /// Sets a header, replacing previous values.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a header value, keeping previous values.
    #[must_use]
    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Enables or disables the response cache for this call.
    #[must_use]
    pub const fn cache(mut self, enabled: bool) -> Self {
        self.options.cache = enabled;
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            options: self.options,
        }
    }
}
