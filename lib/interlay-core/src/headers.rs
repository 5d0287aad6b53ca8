//! Ordered, case-insensitive, multi-valued header collection.
//!
//! Names keep the casing they were first inserted with and the position they
//! were first seen at; lookups ignore ASCII case.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// HTTP headers as an ordered mapping from name to one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    /// Empty header collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there is no header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a header with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// First value of a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// All values of a header, empty if absent.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.position(name)
            .and_then(|index| self.entries.get(index))
            .map_or(&[], |(_, values)| values.as_slice())
    }

    /// All values of a header joined with `", "`.
    #[must_use]
    pub fn line(&self, name: &str) -> Option<String> {
        self.position(name)
            .and_then(|index| self.entries.get(index))
            .map(|(_, values)| values.join(", "))
    }

    /// Set a header, replacing any previous values.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name).and_then(|i| self.entries.get_mut(i)) {
            Some((_, values)) => *values = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Set a header after checking that name and value are valid on the wire.
    pub fn try_insert(&mut self, name: &str, value: &str) -> Result<()> {
        http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Error::InvalidHeader(format!("{name}: {err}")))?;
        http::HeaderValue::from_str(value)
            .map_err(|err| Error::InvalidHeader(format!("{name}: {err}")))?;
        self.insert(name, value);
        Ok(())
    }

    /// Add a value to a header, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name).and_then(|i| self.entries.get_mut(i)) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Remove a header, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name)
            .map(|index| self.entries.remove(index).1)
    }

    /// Iterate over `(name, values)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        headers.extend(iter);
        headers
    }
}

impl<K, V> Extend<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.append(name, value);
        }
    }
}

impl From<&http::HeaderMap> for Headers {
    /// Values that are not valid UTF-8 are kept, with invalid bytes
    /// replaced by `U+FFFD`.
    fn from(map: &http::HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

struct HeadersVisitor;

impl<'de> Visitor<'de> for HeadersVisitor {
    type Value = Headers;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map of header names to lists of values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Headers, A::Error> {
        let mut headers = Headers::new();
        while let Some((name, values)) = access.next_entry::<String, Vec<String>>()? {
            for value in values {
                headers.append(name.clone(), value);
            }
        }
        Ok(headers)
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(HeadersVisitor)
    }
}
