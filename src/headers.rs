//! Ordered, case-insensitive header multimap.
//!
//! `http::HeaderMap` already stores multiple values per name, but its
//! iteration order interleaves by internal bucket layout rather than
//! insertion order. §3 requires observable insertion order and repeated
//! entries for multi-valued names, so headers are kept here as a plain
//! `Vec` of (name, value) pairs with case-insensitive lookup.

use http::{HeaderName, HeaderValue};
use std::fmt;

use crate::error::{Error, Result};

/// An ordered list of header name/value pairs.
///
/// Lookups by name are case-insensitive. A name may appear more than once;
/// `set` replaces all prior entries for a name, `add` appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// An empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, preserving any existing entries for the same name.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let name = name.as_ref();
        let value = value.as_ref();
        validate(name, value)?;
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Replace all entries for `name` with a single entry.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let name = name.as_ref();
        let value = value.as_ref();
        validate(name, value)?;
        self.remove_all(name);
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Remove all entries for `name` (case-insensitive).
    pub fn remove_all(&mut self, name: impl AsRef<str>) {
        let name = name.as_ref();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The first value for `name`, if present.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if any entry exists for `name`.
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.get(name).is_some()
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: impl AsRef<str>) -> Vec<&str> {
        let name = name.as_ref();
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Iterate all (name, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries (counting repeats).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build an `http::HeaderMap` suitable for handing to the transport.
    pub(crate) fn to_header_map(&self) -> http::HeaderMap {
        let mut map = http::HeaderMap::new();
        for (name, value) in &self.entries {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }

    /// Build from an `http::HeaderMap`, preserving its iteration order.
    pub(crate) fn from_header_map(map: &http::HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map {
            if let Ok(value) = value.to_str() {
                headers.entries.push((name.to_string(), value.to_string()));
            }
        }
        headers
    }
}

fn validate(name: &str, value: &str) -> Result<()> {
    HeaderName::try_from(name)
        .map_err(|e| Error::illegal_argument(format!("invalid header name {name:?}: {e}")))?;
    HeaderValue::from_str(value)
        .map_err(|e| Error::illegal_argument(format!("invalid header value for {name:?}: {e}")))?;
    Ok(())
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_all_prior_entries() {
        let mut h = Headers::new();
        h.add("X-Foo", "1").unwrap();
        h.add("X-Foo", "2").unwrap();
        h.set("X-Foo", "3").unwrap();
        assert_eq!(h.get_all("x-foo"), vec!["3"]);
    }

    #[test]
    fn add_preserves_insertion_order_and_repeats() {
        let mut h = Headers::new();
        h.add("Set-Cookie", "a=1").unwrap();
        h.add("Set-Cookie", "b=2").unwrap();
        assert_eq!(h.get_all("Set-Cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = Headers::new();
        h.add("Content-Type", "text/plain").unwrap();
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn remove_all_is_case_insensitive() {
        let mut h = Headers::new();
        h.add("X-A", "1").unwrap();
        h.add("x-a", "2").unwrap();
        h.remove_all("X-a");
        assert!(!h.contains("X-A"));
    }
}
