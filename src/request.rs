//! Immutable request value type and its builder (§3, §4.1).

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use http::Method;
use url::Url;

use crate::body::RequestBody;
use crate::cache_control::CacheControl;
use crate::error::{Error, Result};
use crate::headers::Headers;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Whether `method` is allowed to carry a request body at all.
pub fn method_permits_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// Whether `method` must carry a request body.
pub fn method_requires_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
        || method.as_str() == "PROPPATCH"
        || method.as_str() == "REPORT"
}

/// An opaque, application-supplied tag attached to a request for later
/// retrieval (e.g. from `Response::request().tag()`), independent of the
/// request's own identity.
#[derive(Clone)]
pub struct Tag(Arc<dyn Any + Send + Sync>);

impl Tag {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag(..)")
    }
}

/// An immutable HTTP request description (§3).
///
/// Requests are built via [`Request::builder`] or [`Request::new_builder`]
/// (to derive a modified copy of an existing request) and are cheap to
/// clone: `url`/`headers` are cloned by value, and the body (if any) is
/// reference-counted.
#[derive(Clone)]
pub struct Request {
    /// A process-unique id, used to key cancellation independent of the
    /// request's own object identity (Design Note §9: Rust values don't
    /// carry reference identity the way the tag = self default assumes).
    pub(crate) id: u64,
    url: Url,
    method: Method,
    headers: Headers,
    body: Option<RequestBody>,
    tag: Option<Tag>,
    cache_control: Arc<OnceLock<CacheControl>>,
}

impl Request {
    /// Start building a GET request for `url`.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// Seed a builder from this request's current state (§4.1: `build()`
    /// produces a value the builder no longer observes).
    pub fn new_builder(&self) -> RequestBuilder {
        RequestBuilder {
            url: Some(self.url.clone()),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            tag: self.tag.clone(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// The request's `Cache-Control` directives, computed on first access
    /// and memoized thereafter (safe for concurrent readers via
    /// `OnceLock`).
    pub fn cache_control(&self) -> &CacheControl {
        self.cache_control
            .get_or_init(|| CacheControl::from_headers(&self.headers))
    }

    /// True if this request is addressed to the same host as `other`
    /// (case-insensitively), used by the redirect/follow-up policy to
    /// decide whether to strip auth headers and whether a new
    /// `StreamAllocation` is required.
    pub fn is_same_host(&self, other: &Url) -> bool {
        self.url.host_str().map(|h| h.to_ascii_lowercase())
            == other.host_str().map(|h| h.to_ascii_lowercase())
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish()
    }
}

/// Builder for [`Request`]. Validates method/body compatibility and URL
/// scheme in [`build`](RequestBuilder::build).
#[derive(Clone, Default)]
pub struct RequestBuilder {
    url: Option<Url>,
    method: Method,
    headers: Headers,
    body: Option<RequestBody>,
    tag: Option<Tag>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            url: None,
            method: Method::GET,
            headers: Headers::new(),
            body: None,
            tag: None,
        }
    }

    /// Set the target URL. A `ws://`/`wss://` scheme is silently
    /// normalized to `http://`/`https://` (Design Note §9, Open
    /// Question: preserved for the non-WebSocket request path).
    pub fn url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let mut parsed = Url::parse(url.as_ref())?;
        match parsed.scheme() {
            "ws" => {
                let _ = parsed.set_scheme("http");
            }
            "wss" => {
                let _ = parsed.set_scheme("https");
            }
            "http" | "https" => {}
            other => {
                return Err(Error::illegal_argument(format!(
                    "unsupported URL scheme {other:?}, expected http or https"
                )))
            }
        }
        self.url = Some(parsed);
        Ok(self)
    }

    /// Set a parsed URL directly.
    pub fn parsed_url(mut self, url: Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => {
                self.url = Some(url);
                Ok(self)
            }
            other => Err(Error::illegal_argument(format!(
                "unsupported URL scheme {other:?}, expected http or https"
            ))),
        }
    }

    /// Set the method and optional body in one step, as `build()` will
    /// validate them together.
    pub fn method(mut self, method: Method, body: Option<RequestBody>) -> Self {
        self.method = method;
        self.body = body;
        self
    }

    pub fn get(mut self) -> Self {
        self.method = Method::GET;
        self.body = None;
        self
    }

    pub fn head(mut self) -> Self {
        self.method = Method::HEAD;
        self.body = None;
        self
    }

    pub fn post(mut self, body: RequestBody) -> Self {
        self.method = Method::POST;
        self.body = Some(body);
        self
    }

    pub fn put(mut self, body: RequestBody) -> Self {
        self.method = Method::PUT;
        self.body = Some(body);
        self
    }

    pub fn patch(mut self, body: RequestBody) -> Self {
        self.method = Method::PATCH;
        self.body = Some(body);
        self
    }

    /// A DELETE with no explicit body receives a zero-length sentinel
    /// rather than no body at all (Design Note §9, Open Question: we
    /// emit `Content-Length: 0` to match observable server behavior).
    pub fn delete(mut self, body: Option<RequestBody>) -> Self {
        self.method = Method::DELETE;
        self.body = Some(body.unwrap_or_else(RequestBody::empty));
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.headers.add(name, value)?;
        Ok(self)
    }

    pub fn set_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.headers.set(name, value)?;
        Ok(self)
    }

    pub fn remove_header(mut self, name: impl AsRef<str>) -> Self {
        self.headers.remove_all(name);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Serialize `cc` into a single `Cache-Control` header, or remove the
    /// header entirely if `cc` carries no directives (§4.1).
    pub fn cache_control(mut self, cc: &CacheControl) -> Self {
        if cc.is_empty() {
            self.headers.remove_all("Cache-Control");
        } else {
            let _ = self.headers.set("Cache-Control", cc.to_string());
        }
        self
    }

    pub fn tag<T: Any + Send + Sync>(mut self, tag: T) -> Self {
        self.tag = Some(Tag::new(tag));
        self
    }

    /// Validate and produce an immutable [`Request`].
    pub fn build(self) -> Result<Request> {
        let url = self
            .url
            .ok_or_else(|| Error::illegal_argument("request URL is required"))?;

        let has_body = self.body.is_some();
        if has_body && !method_permits_body(&self.method) {
            return Err(Error::illegal_argument(format!(
                "{} does not permit a request body",
                self.method
            )));
        }
        if !has_body && method_requires_body(&self.method) {
            return Err(Error::illegal_argument(format!(
                "{} requires a request body",
                self.method
            )));
        }

        Ok(Request {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            tag: self.tag,
            cache_control: Arc::new(OnceLock::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_round_trips_through_new_builder() {
        let r = Request::builder()
            .url("https://example.com/a")
            .unwrap()
            .header("X-Test", "1")
            .unwrap()
            .build()
            .unwrap();
        let r2 = r.new_builder().build().unwrap();
        assert_eq!(r.url(), r2.url());
        assert_eq!(r.method(), r2.method());
        assert_eq!(r.header("X-Test"), r2.header("X-Test"));
    }

    #[test]
    fn get_forbids_body() {
        let err = Request::builder()
            .url("https://example.com")
            .unwrap()
            .method(Method::GET, Some(RequestBody::from_bytes("x")))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn post_requires_body() {
        let err = Request::builder()
            .url("https://example.com")
            .unwrap()
            .method(Method::POST, None)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn delete_without_body_gets_zero_length_sentinel() {
        let r = Request::builder()
            .url("https://example.com")
            .unwrap()
            .delete(None)
            .build()
            .unwrap();
        assert_eq!(r.body().unwrap().content_length(), Some(0));
    }

    #[test]
    fn ws_scheme_normalizes_to_http() {
        let r = Request::builder()
            .url("ws://example.com/socket")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(r.url().scheme(), "http");
    }

    #[test]
    fn wss_scheme_normalizes_to_https() {
        let r = Request::builder()
            .url("wss://example.com/socket")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(r.url().scheme(), "https");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = Request::builder().url("ftp://example.com").unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn cache_control_is_memoized() {
        let r = Request::builder()
            .url("https://example.com")
            .unwrap()
            .header("Cache-Control", "no-cache")
            .unwrap()
            .build()
            .unwrap();
        assert!(r.cache_control().no_cache);
        // second access hits the memoized value
        assert!(r.cache_control().no_cache);
    }
}
