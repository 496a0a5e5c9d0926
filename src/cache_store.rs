//! RFC 7234 cache storage and freshness math (§4.5).
//!
//! Storage itself is an external collaborator behind [`CacheStore`],
//! grounded in the teacher's `armature-cache::traits::CacheStore` async
//! key/value-with-TTL interface, generalized here to entries keyed by URL,
//! with [`CacheEntry::varies_match`] deciding at lookup time whether a
//! candidate entry still applies under the response's own `Vary` header.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::header::HeaderName;

use crate::cache_control::CacheControl;
use crate::error::Result;
use crate::headers::Headers;
use crate::request::Request;
use crate::response::{Response, ResponseHead};

/// A stored response: enough of the original exchange to serve it again or
/// revalidate it conditionally.
#[derive(Clone)]
pub struct CacheEntry {
    pub request_headers: Headers,
    pub response_head: ResponseHead,
    pub body: bytes::Bytes,
    pub requested_at: SystemTime,
    pub received_at: SystemTime,
}

impl CacheEntry {
    fn header(&self, name: &str) -> Option<&str> {
        self.response_head.headers.get(name)
    }

    /// RFC 7234 §4.2.3 apparent/corrected age, taken at the moment of
    /// storage (the fixed point every freshness computation is relative
    /// to).
    fn age_at_receipt(&self) -> Duration {
        let date_value = self
            .header("Date")
            .and_then(|v| httpdate::parse_http_date(v).ok());
        let apparent_age = match date_value {
            Some(date) => self
                .received_at
                .duration_since(date)
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        };
        let age_header = self
            .header("Age")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);
        apparent_age.max(age_header)
    }

    /// Current effective age: age at receipt plus time resident in the
    /// cache.
    pub fn effective_age(&self, now: SystemTime) -> Duration {
        let resident = now.duration_since(self.received_at).unwrap_or(Duration::ZERO);
        self.age_at_receipt() + resident
    }

    /// Explicit freshness lifetime from `s-maxage`/`max-age`/`Expires`, or
    /// `None` if none of those are present (a heuristic must be applied
    /// instead).
    pub fn freshness_lifetime(&self) -> Option<Duration> {
        let cc = CacheControl::from_headers(&self.response_head.headers);
        if let Some(s_maxage) = cc.s_maxage {
            return Some(s_maxage);
        }
        if let Some(max_age) = cc.max_age {
            return Some(max_age);
        }
        let expires = self.header("Expires").and_then(|v| httpdate::parse_http_date(v).ok());
        let date = self
            .header("Date")
            .and_then(|v| httpdate::parse_http_date(v).ok())
            .unwrap_or(self.received_at);
        expires.map(|e| e.duration_since(date).unwrap_or(Duration::ZERO))
    }

    /// RFC 7234 §4.2.2 heuristic: 10% of the time since `Last-Modified`,
    /// applied only when no explicit freshness lifetime is present.
    pub fn heuristic_freshness_lifetime(&self) -> Duration {
        let last_modified = self
            .header("Last-Modified")
            .and_then(|v| httpdate::parse_http_date(v).ok());
        match last_modified {
            Some(lm) => {
                let date = self
                    .header("Date")
                    .and_then(|v| httpdate::parse_http_date(v).ok())
                    .unwrap_or(self.received_at);
                let age = date.duration_since(lm).unwrap_or(Duration::ZERO);
                age / 10
            }
            None => Duration::ZERO,
        }
    }

    pub fn is_fresh(&self, now: SystemTime, cc: &CacheControl) -> bool {
        if cc.no_cache {
            return false;
        }
        if CacheControl::from_headers(&self.response_head.headers).no_cache {
            return false;
        }
        let lifetime = self
            .freshness_lifetime()
            .unwrap_or_else(|| self.heuristic_freshness_lifetime());
        let effective_age = self.effective_age(now);
        let max_stale = cc.max_stale.unwrap_or(Duration::ZERO);
        effective_age + Duration::ZERO < lifetime + max_stale
            && cc.min_fresh.map_or(true, |min_fresh| {
                lifetime.saturating_sub(effective_age) >= min_fresh
            })
    }

    /// Whether this entry's stored request still matches `request` for
    /// every field the stored response's `Vary` header names (RFC 7234
    /// §4.1). A bare `*` never matches a later request — the server said
    /// the response depends on something this cache can't pin down. No
    /// `Vary` header at all always matches.
    pub fn varies_match(&self, request: &Request) -> bool {
        let Some(vary) = self.header("Vary") else {
            return true;
        };
        for name in vary.split(',') {
            let name = name.trim();
            if name == "*" {
                return false;
            }
            if self.request_headers.get(name) != request.headers().get(name) {
                return false;
            }
        }
        true
    }

    /// Whether this entry is eligible to be stored at all (§4.5
    /// storability rules): no `no-store`, not a partial/206, and the
    /// status is one of the cacheable-by-default codes or carries explicit
    /// freshness information.
    pub fn is_storable(response_cc: &CacheControl, request_cc: &CacheControl, status: u16) -> bool {
        if response_cc.no_store || request_cc.no_store {
            return false;
        }
        matches!(status, 200 | 203 | 204 | 300 | 301 | 308 | 404 | 405 | 410 | 414 | 501)
    }
}

/// Storage collaborator for cached responses, keyed by URL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Build the lookup key for `request`. The key is URL-only (§4.5) because a
/// `Vary` header isn't known until the response for this very request comes
/// back; `Vary` correctness instead comes from [`CacheEntry::varies_match`]
/// run against whatever entry this key turns up.
pub fn cache_key(request: &Request) -> String {
    request.url().to_string()
}

/// Default in-process store, for tests and library users who don't need
/// cross-process persistence (persistence format is out of scope, §1).
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.write().unwrap().insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

/// Apply a 304 Not Modified's headers onto a stored entry's headers (§4.5
/// merge rule: the 304's headers win, everything else from the cached copy
/// survives) and refresh its receipt clock.
pub fn merge_304(cached: &CacheEntry, not_modified: &ResponseHead, now: SystemTime) -> CacheEntry {
    let mut merged_headers = cached.response_head.headers.clone();
    for (name, value) in not_modified.headers.iter() {
        if name.eq_ignore_ascii_case("Warning")
            && value.starts_with('1')
        {
            continue;
        }
        let _ = merged_headers.set(name, value);
    }
    CacheEntry {
        request_headers: cached.request_headers.clone(),
        response_head: ResponseHead {
            status: cached.response_head.status,
            version: not_modified.version,
            headers: merged_headers,
        },
        body: cached.body.clone(),
        requested_at: cached.requested_at,
        received_at: now,
    }
}

/// Build the conditional-GET validator headers (`If-None-Match`/
/// `If-Modified-Since`) for revalidating `cached` (§4.5).
pub fn conditional_headers(cached: &CacheEntry) -> Vec<(HeaderName, String)> {
    let mut headers = Vec::new();
    if let Some(etag) = cached.header("ETag") {
        headers.push((HeaderName::from_static("if-none-match"), etag.to_string()));
    }
    if let Some(last_modified) = cached.header("Last-Modified") {
        headers.push((
            HeaderName::from_static("if-modified-since"),
            last_modified.to_string(),
        ));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{StatusCode, Version};

    fn entry_with_max_age(seconds: u64, received_secs_ago: u64) -> CacheEntry {
        let mut headers = Headers::new();
        headers
            .set("Cache-Control", format!("max-age={seconds}"))
            .unwrap();
        CacheEntry {
            request_headers: Headers::new(),
            response_head: ResponseHead {
                status: StatusCode::OK,
                version: Version::HTTP_11,
                headers,
            },
            body: bytes::Bytes::new(),
            requested_at: SystemTime::now() - Duration::from_secs(received_secs_ago),
            received_at: SystemTime::now() - Duration::from_secs(received_secs_ago),
        }
    }

    #[test]
    fn fresh_entry_within_max_age() {
        let entry = entry_with_max_age(60, 10);
        assert!(entry.is_fresh(SystemTime::now(), &CacheControl::default()));
    }

    #[test]
    fn stale_entry_past_max_age() {
        let entry = entry_with_max_age(5, 10);
        assert!(!entry.is_fresh(SystemTime::now(), &CacheControl::default()));
    }

    #[test]
    fn no_cache_request_directive_forces_revalidation() {
        let entry = entry_with_max_age(60, 1);
        let request_cc = CacheControl::force_network();
        assert!(!entry.is_fresh(SystemTime::now(), &request_cc));
    }

    #[test]
    fn no_cache_stored_on_the_response_itself_forces_revalidation() {
        let mut entry = entry_with_max_age(60, 1);
        entry
            .response_head
            .headers
            .set("Cache-Control", "max-age=60, no-cache")
            .unwrap();
        assert!(!entry.is_fresh(SystemTime::now(), &CacheControl::default()));
    }

    #[test]
    fn varies_match_is_true_with_no_vary_header() {
        let entry = entry_with_max_age(60, 0);
        let request = Request::builder().url("https://example.com").unwrap().build().unwrap();
        assert!(entry.varies_match(&request));
    }

    #[test]
    fn varies_match_compares_named_request_headers() {
        let mut response_headers = Headers::new();
        response_headers.set("Vary", "Accept-Encoding").unwrap();
        let mut stored_request_headers = Headers::new();
        stored_request_headers.set("Accept-Encoding", "gzip").unwrap();
        let entry = CacheEntry {
            request_headers: stored_request_headers,
            response_head: ResponseHead {
                status: StatusCode::OK,
                version: Version::HTTP_11,
                headers: response_headers,
            },
            body: bytes::Bytes::new(),
            requested_at: SystemTime::now(),
            received_at: SystemTime::now(),
        };

        let matching = Request::builder()
            .url("https://example.com")
            .unwrap()
            .header("Accept-Encoding", "gzip")
            .unwrap()
            .build()
            .unwrap();
        assert!(entry.varies_match(&matching));

        let different = Request::builder()
            .url("https://example.com")
            .unwrap()
            .header("Accept-Encoding", "identity")
            .unwrap()
            .build()
            .unwrap();
        assert!(!entry.varies_match(&different));
    }

    #[test]
    fn varies_match_never_matches_a_bare_star() {
        let mut response_headers = Headers::new();
        response_headers.set("Vary", "*").unwrap();
        let entry = CacheEntry {
            request_headers: Headers::new(),
            response_head: ResponseHead {
                status: StatusCode::OK,
                version: Version::HTTP_11,
                headers: response_headers,
            },
            body: bytes::Bytes::new(),
            requested_at: SystemTime::now(),
            received_at: SystemTime::now(),
        };
        let request = Request::builder().url("https://example.com").unwrap().build().unwrap();
        assert!(!entry.varies_match(&request));
    }

    #[test]
    fn not_storable_with_no_store_directive() {
        let response_cc = CacheControl {
            no_store: true,
            ..Default::default()
        };
        assert!(!CacheEntry::is_storable(&response_cc, &CacheControl::default(), 200));
    }

    #[test]
    fn storable_200_without_directives() {
        assert!(CacheEntry::is_storable(&CacheControl::default(), &CacheControl::default(), 200));
    }

    #[test]
    fn storable_308_permanent_redirect() {
        assert!(CacheEntry::is_storable(&CacheControl::default(), &CacheControl::default(), 308));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryCacheStore::new();
        let entry = entry_with_max_age(60, 0);
        store.put("k", entry).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
