//! `Cache-Control` directive parsing and serialization (§3).

use std::fmt;
use std::time::Duration;

use crate::headers::Headers;

/// A parsed `Cache-Control` directive set.
///
/// Constructed lazily from a request's or response's headers on first
/// access (Design Note §9) and cheap to clone thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<Duration>,
    pub s_maxage: Option<Duration>,
    pub private: bool,
    pub public: bool,
    pub must_revalidate: bool,
    pub max_stale: Option<Duration>,
    pub min_fresh: Option<Duration>,
    pub only_if_cached: bool,
    pub no_transform: bool,
    pub immutable: bool,
}

impl CacheControl {
    /// Forces the network to be used, bypassing any cached response
    /// (`Cache-Control: no-cache`).
    pub fn force_network() -> Self {
        Self {
            no_cache: true,
            ..Default::default()
        }
    }

    /// Forces a cached response to be used even if stale, never touching
    /// the network (`Cache-Control: only-if-cached, max-stale=<max>`).
    pub fn force_cache() -> Self {
        Self {
            only_if_cached: true,
            max_stale: Some(Duration::from_secs(u32::MAX as u64)),
            ..Default::default()
        }
    }

    /// Parse a `Cache-Control` header value (request or response side).
    /// Unrecognized directives are ignored rather than rejected.
    pub fn parse(value: &str) -> Self {
        let mut cc = CacheControl::default();
        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, arg) = match directive.split_once('=') {
                Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                None => (directive, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "no-cache" => cc.no_cache = true,
                "no-store" => cc.no_store = true,
                "private" => cc.private = true,
                "public" => cc.public = true,
                "must-revalidate" => cc.must_revalidate = true,
                "only-if-cached" => cc.only_if_cached = true,
                "no-transform" => cc.no_transform = true,
                "immutable" => cc.immutable = true,
                "max-age" => cc.max_age = arg.and_then(parse_seconds),
                "s-maxage" => cc.s_maxage = arg.and_then(parse_seconds),
                "max-stale" => {
                    cc.max_stale = Some(arg.and_then(parse_seconds).unwrap_or(Duration::MAX))
                }
                "min-fresh" => cc.min_fresh = arg.and_then(parse_seconds),
                _ => {}
            }
        }
        cc
    }

    /// Parse from a request's or response's header set, looking up
    /// `Cache-Control` case-insensitively. Absent header yields the empty
    /// (all-false/None) directive set.
    pub fn from_headers(headers: &Headers) -> Self {
        match headers.get("Cache-Control") {
            Some(v) => Self::parse(v),
            None => Self::default(),
        }
    }

    /// True if this directive set carries no information at all, meaning
    /// the `Cache-Control` header should be omitted rather than emitted
    /// as an empty string.
    pub fn is_empty(&self) -> bool {
        *self == CacheControl::default()
    }
}

fn parse_seconds(s: &str) -> Option<Duration> {
    s.parse::<i64>().ok().map(|n| Duration::from_secs(n.max(0) as u64))
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if let Some(age) = self.max_age {
            parts.push(format!("max-age={}", age.as_secs()));
        }
        if let Some(age) = self.s_maxage {
            parts.push(format!("s-maxage={}", age.as_secs()));
        }
        if self.private {
            parts.push("private".to_string());
        }
        if self.public {
            parts.push("public".to_string());
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if let Some(stale) = self.max_stale {
            parts.push(format!("max-stale={}", stale.as_secs()));
        }
        if let Some(fresh) = self.min_fresh {
            parts.push(format!("min-fresh={}", fresh.as_secs()));
        }
        if self.only_if_cached {
            parts.push("only-if-cached".to_string());
        }
        if self.no_transform {
            parts.push("no-transform".to_string());
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_max_age_and_no_cache() {
        let cc = CacheControl::parse("no-cache, max-age=0");
        assert!(cc.no_cache);
        assert_eq!(cc.max_age, Some(Duration::from_secs(0)));
    }

    #[test]
    fn force_network_round_trips() {
        let cc = CacheControl::force_network();
        assert_eq!(cc.to_string(), "no-cache");
    }

    #[test]
    fn force_cache_sets_only_if_cached_and_max_stale() {
        let cc = CacheControl::force_cache();
        assert!(cc.only_if_cached);
        assert!(cc.max_stale.is_some());
    }

    #[test]
    fn empty_directive_set_has_empty_display() {
        let cc = CacheControl::default();
        assert!(cc.is_empty());
        assert_eq!(cc.to_string(), "");
    }

    #[test]
    fn unrecognized_directives_are_ignored() {
        let cc = CacheControl::parse("weird-directive, no-store");
        assert!(cc.no_store);
    }
}
