//! Cache key derivation.
//!
//! The key is `"interlay_cache|"` followed by the hex SHA-256 digest of a
//! canonical encoding of the request: method, full URI, every header, body.
//! Each field is length-prefixed so that no two distinct requests share an
//! encoding. Header names are compared case-insensitively and sorted, values
//! keep their order.

use sha2::{Digest, Sha256};

use crate::Request;

/// Namespace prefix of every derived key.
pub const CACHE_KEY_PREFIX: &str = "interlay_cache";

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    hasher.update(len.to_le_bytes());
    hasher.update(bytes);
}

fn write_count(hasher: &mut Sha256, count: usize) {
    let count = u64::try_from(count).unwrap_or(u64::MAX);
    hasher.update(count.to_le_bytes());
}

/// Derive the cache key of a request.
///
/// Reading the body leaves the request untouched, so the transport still
/// sends it in full afterwards.
#[must_use]
pub fn cache_key(request: &Request) -> String {
    let mut hasher = Sha256::new();

    write_field(&mut hasher, request.method().as_str().as_bytes());
    write_field(&mut hasher, request.url().as_str().as_bytes());

    let mut headers: Vec<(String, &[String])> = request
        .headers()
        .iter()
        .map(|(name, values)| (name.to_ascii_lowercase(), values))
        .collect();
    headers.sort_by(|(a, _), (b, _)| a.cmp(b));

    write_count(&mut hasher, headers.len());
    for (name, values) in headers {
        write_field(&mut hasher, name.as_bytes());
        write_count(&mut hasher, values.len());
        for value in values {
            write_field(&mut hasher, value.as_bytes());
        }
    }

    write_field(&mut hasher, request.body());

    format!("{CACHE_KEY_PREFIX}|{}", hex::encode(hasher.finalize()))
}
