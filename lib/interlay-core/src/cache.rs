//! Cache entry projection and the store contract.
//!
//! The store itself is an external collaborator: interlay only defines the
//! shape it persists ([`CacheEntry`]) and the two operations it needs
//! ([`CacheStore`]).

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Headers, Response, StoreError};

/// Serialized projection of a [`Response`] plus its expiry.
///
/// On the wire this is
/// `{ status, headers: {name: [values]}, body, version, reason, expires_at }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Bytes,
    /// Protocol version.
    pub version: String,
    /// Reason phrase.
    pub reason: String,
    /// Absolute instant after which the entry must not be served.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Project a response into an entry that expires at `expires_at`.
    #[must_use]
    pub fn from_response(response: &Response, expires_at: DateTime<Utc>) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.body().clone(),
            version: response.version().to_string(),
            reason: response.reason().to_string(),
            expires_at,
        }
    }

    /// Rebuild the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        Response::new(self.status, self.headers, self.body)
            .with_reason(self.reason)
            .with_version(self.version)
    }

    /// Returns `true` once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the entry is expired right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Encode as JSON, for stores that persist opaque bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON produced by [`CacheEntry::to_json`].
    pub fn from_json(raw: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Key/value store with expiring entries, shared by all in-flight requests.
///
/// Implementations must be safe for concurrent use. Returning an expired
/// entry is tolerated: the cache middleware treats it as a miss.
pub trait CacheStore: Send + Sync + 'static {
    /// Look up the entry stored at `key`.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<CacheEntry>, StoreError>> + Send;

    /// Store `entry` at `key`, replacing any previous entry.
    fn put(
        &self,
        key: &str,
        entry: CacheEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
