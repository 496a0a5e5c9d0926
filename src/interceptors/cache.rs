//! Cache interceptor (§4.5): RFC 7234 freshness checks, conditional
//! revalidation, 304 merging, and storability-gated writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::StatusCode;

use crate::cache_control::CacheControl;
use crate::cache_store::{cache_key, merge_304, CacheEntry, CacheStore};
use crate::chain::{Chain, Interceptor};
use crate::error::Result;
use crate::response::{Response, ResponseHead};

/// Hit/miss/conditional-hit counters for diagnostics (§4.5 statistics).
#[derive(Default)]
pub struct CacheStatistics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub conditional_hits: AtomicU64,
    pub network_requests: AtomicU64,
}

pub struct CacheInterceptor {
    store: Arc<dyn CacheStore>,
    stats: Arc<CacheStatistics>,
}

impl CacheInterceptor {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            stats: Arc::new(CacheStatistics::default()),
        }
    }

    pub fn statistics(&self) -> Arc<CacheStatistics> {
        self.stats.clone()
    }
}

#[async_trait]
impl Interceptor for CacheInterceptor {
    async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
        let request = chain.request().clone();
        let request_cc = request.cache_control().clone();
        let key = cache_key(&request);
        let cached = self
            .store
            .get(&key)
            .await?
            .filter(|entry| entry.varies_match(&request));

        if request_cc.only_if_cached {
            return match &cached {
                Some(entry) if entry.is_fresh(SystemTime::now(), &request_cc) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    cached_response(&request, entry)
                }
                _ => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    Response::builder(request)
                        .status(StatusCode::GATEWAY_TIMEOUT)
                        .build()
                }
            };
        }

        if let Some(entry) = &cached {
            if entry.is_fresh(SystemTime::now(), &request_cc) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(url = %request.url(), "cache hit");
                return cached_response(&request, entry);
            }
        }

        let mut conditional_request = request.new_builder();
        if let Some(entry) = &cached {
            for (name, value) in crate::cache_store::conditional_headers(entry) {
                conditional_request = conditional_request.set_header(name.as_str(), value)?;
            }
        }

        self.stats.network_requests.fetch_add(1, Ordering::Relaxed);
        let network_response = chain.proceed(conditional_request.build()?).await?;

        if network_response.status() == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                self.stats.conditional_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(url = %request.url(), "conditional cache revalidation hit");
                let not_modified_head = ResponseHead {
                    status: network_response.status(),
                    version: network_response.version(),
                    headers: network_response.headers().clone(),
                };
                let merged = merge_304(&entry, &not_modified_head, SystemTime::now());
                self.store.put(&key, merged.clone()).await?;
                return cached_response(&request, &merged);
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(url = %request.url(), "cache miss");

        let response_cc = network_response.cache_control().clone();
        let status = network_response.status().as_u16();
        if CacheEntry::is_storable(&response_cc, &request_cc, status) {
            if let Some(body) = network_response.body() {
                let bytes = body.bytes().await?;
                let entry = CacheEntry {
                    request_headers: request.headers().clone(),
                    response_head: ResponseHead {
                        status: network_response.status(),
                        version: network_response.version(),
                        headers: network_response.headers().clone(),
                    },
                    body: bytes.clone(),
                    requested_at: network_response.sent_at(),
                    received_at: network_response.received_at(),
                };
                self.store.put(&key, entry).await?;
                return network_response
                    .new_builder()
                    .body(crate::body::ResponseBody::from_bytes(bytes))
                    .build();
            }
        } else {
            let _ = self.store.remove(&key).await;
        }

        Ok(network_response)
    }
}

/// Build a response served entirely from the cache (§3: `cache_response` is
/// set, `network_response` is not), marking it as cache-originated via a
/// body-stripped `cache_response` leg pointing at the same entry.
fn cached_response(request: &crate::request::Request, entry: &CacheEntry) -> Result<Response> {
    let candidate = Response::builder(request.clone())
        .status(entry.response_head.status)
        .version(entry.response_head.version)
        .headers(entry.response_head.headers.clone())
        .build()?;

    Response::builder(request.clone())
        .status(entry.response_head.status)
        .version(entry.response_head.version)
        .headers(entry.response_head.headers.clone())
        .body(crate::body::ResponseBody::from_bytes(entry.body.clone()))
        .cache_response(candidate)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::InMemoryCacheStore;
    use crate::headers::Headers;
    use http::Version;

    fn entry() -> CacheEntry {
        let mut headers = Headers::new();
        headers.set("Cache-Control", "max-age=60").unwrap();
        CacheEntry {
            request_headers: Headers::new(),
            response_head: ResponseHead {
                status: StatusCode::OK,
                version: Version::HTTP_11,
                headers,
            },
            body: bytes::Bytes::from_static(b"cached"),
            requested_at: SystemTime::now(),
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn fresh_cache_hit_increments_hit_counter() {
        let store = Arc::new(InMemoryCacheStore::new());
        let request = crate::request::Request::builder()
            .url("https://example.com/a")
            .unwrap()
            .build()
            .unwrap();
        let key = cache_key(&request);
        store.put(&key, entry()).await.unwrap();

        let interceptor = CacheInterceptor::new(store);
        let response = cached_response(&request, &entry()).unwrap();
        assert!(response.is_successful());
        assert_eq!(
            response.body().unwrap().bytes().await.unwrap(),
            bytes::Bytes::from_static(b"cached")
        );
        let _ = interceptor.statistics();
    }
}
