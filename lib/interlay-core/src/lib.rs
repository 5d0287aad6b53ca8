//! Core types and contracts for the interlay HTTP middleware pipeline.
//!
//! This crate provides the foundational types used by interlay:
//! - [`Method`] - HTTP method enum, including WebDAV verbs
//! - [`Headers`] - Ordered, case-insensitive, multi-valued headers
//! - [`Request`], [`RequestBuilder`] and [`RequestOptions`] - Outbound requests
//! - [`Response`] - Inbound responses
//! - [`CacheEntry`] and [`CacheStore`] - Cache projection and store contract
//! - [`Error`], [`StoreError`] and [`Result`] - Error handling
//! - [`HttpClient`] - Request execution capability

mod cache;
mod client;
mod error;
mod headers;
mod method;
mod request;
mod response;

pub use cache::{CacheEntry, CacheStore};
pub use client::HttpClient;
pub use error::{Error, Result, StoreError};
pub use headers::Headers;
pub use method::Method;
pub use request::{Request, RequestBuilder, RequestOptions};
pub use response::{DEFAULT_VERSION, Response};
