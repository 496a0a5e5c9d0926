//! Immutable response value type and its builder (§3, §4.1).

use std::sync::Arc;
use std::time::SystemTime;

use http::{StatusCode, Version};

use crate::body::ResponseBody;
use crate::cache_control::CacheControl;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::request::Request;

/// The raw status/version/headers a transport read off the wire, before a
/// body or the rest of the `Response` chain has been assembled (§4.7 read
/// phase).
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: Headers,
}

/// An immutable HTTP response description (§3).
///
/// A response may chain to the `network_response` that actually produced it
/// (absent for a pure cache hit), the `cache_response` candidate it was
/// validated against (absent for a pure network miss), and a `prior_response`
/// for each redirect/follow-up hop that preceded it. At most one of
/// `network_response`/`cache_response` carries a body — the other is
/// stripped, mirroring §3's "only one leg of the chain owns the bytes"
/// invariant. `prior_response` entries are always stripped of their bodies.
pub struct Response {
    request: Request,
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: Headers,
    body: Option<ResponseBody>,
    network_response: Option<Arc<Response>>,
    cache_response: Option<Arc<Response>>,
    prior_response: Option<Arc<Response>>,
    sent_at: SystemTime,
    received_at: SystemTime,
    cache_control: std::sync::OnceLock<CacheControl>,
}

impl Response {
    /// Start building a response for the given originating `request`.
    pub fn builder(request: Request) -> ResponseBuilder {
        ResponseBuilder::new(request)
    }

    /// Seed a builder from this response's current state, for constructing
    /// a 304-merge result or a stripped-body prior-response snapshot.
    pub fn new_builder(&self) -> ResponseBuilder {
        ResponseBuilder {
            request: self.request.clone(),
            status: self.status,
            reason: self.reason.clone(),
            version: self.version,
            headers: self.headers.clone(),
            body: None,
            network_response: self.network_response.clone(),
            cache_response: self.cache_response.clone(),
            prior_response: self.prior_response.clone(),
            sent_at: self.sent_at,
            received_at: self.received_at,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name)
    }

    /// The response body. Taken by value and `None` on a stripped copy such
    /// as `prior_response` entries (§3).
    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    pub fn network_response(&self) -> Option<&Response> {
        self.network_response.as_deref()
    }

    pub fn cache_response(&self) -> Option<&Response> {
        self.cache_response.as_deref()
    }

    /// The response that preceded this one in a redirect/follow-up chain,
    /// if any, always body-stripped.
    pub fn prior_response(&self) -> Option<&Response> {
        self.prior_response.as_deref()
    }

    pub fn sent_at(&self) -> SystemTime {
        self.sent_at
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// 2xx status.
    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    /// 3xx status.
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// True if this response was served (at least in part) from the cache,
    /// i.e. it has a `cache_response` leg.
    pub fn is_from_cache(&self) -> bool {
        self.cache_response.is_some()
    }

    /// The response's `Cache-Control` directives, computed on first access
    /// and memoized thereafter.
    pub fn cache_control(&self) -> &CacheControl {
        self.cache_control
            .get_or_init(|| CacheControl::from_headers(&self.headers))
    }

    /// A copy of this response with its body removed, used when chaining it
    /// into another response's `prior_response`/`cache_response`/
    /// `network_response` slot (§3: only the terminal response keeps its
    /// body).
    pub fn strip_body(&self) -> Response {
        Response {
            request: self.request.clone(),
            status: self.status,
            reason: self.reason.clone(),
            version: self.version,
            headers: self.headers.clone(),
            body: None,
            network_response: self.network_response.clone(),
            cache_response: self.cache_response.clone(),
            prior_response: self.prior_response.clone(),
            sent_at: self.sent_at,
            received_at: self.received_at,
            cache_control: std::sync::OnceLock::new(),
        }
    }

    /// Attach `prior` as this response's `prior_response` leg (body
    /// stripped), used by the RetryAndFollowUp interceptor to chain each
    /// redirect/follow-up hop onto the one that produced it (§3, §4.3).
    pub fn with_prior_response(self, prior: Response) -> Response {
        Response {
            prior_response: Some(Arc::new(prior.strip_body())),
            ..self
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.request.url().as_str())
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Builder for [`Response`].
pub struct ResponseBuilder {
    request: Request,
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: Headers,
    body: Option<ResponseBody>,
    network_response: Option<Arc<Response>>,
    cache_response: Option<Arc<Response>>,
    prior_response: Option<Arc<Response>>,
    sent_at: SystemTime,
    received_at: SystemTime,
}

impl ResponseBuilder {
    pub fn new(request: Request) -> Self {
        let now = SystemTime::now();
        Self {
            request,
            status: StatusCode::OK,
            reason: None,
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: None,
            network_response: None,
            cache_response: None,
            prior_response: None,
            sent_at: now,
            received_at: now,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.headers.add(name, value)?;
        Ok(self)
    }

    pub fn body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn network_response(mut self, response: Response) -> Self {
        self.network_response = Some(Arc::new(response));
        self
    }

    pub fn cache_response(mut self, response: Response) -> Self {
        self.cache_response = Some(Arc::new(response));
        self
    }

    pub fn prior_response(mut self, response: Response) -> Self {
        self.prior_response = Some(Arc::new(response.strip_body()));
        self
    }

    pub fn sent_at(mut self, at: SystemTime) -> Self {
        self.sent_at = at;
        self
    }

    pub fn received_at(mut self, at: SystemTime) -> Self {
        self.received_at = at;
        self
    }

    /// Validate and produce an immutable [`Response`]. At most one of
    /// `network_response`/`cache_response` may itself carry a body (§3); a
    /// build with both legs bodied is an illegal-state misuse by the
    /// caller's own interceptor code, not a protocol failure.
    pub fn build(self) -> Result<Response> {
        let network_has_body = self
            .network_response
            .as_ref()
            .is_some_and(|r| r.body().is_some());
        let cache_has_body = self
            .cache_response
            .as_ref()
            .is_some_and(|r| r.body().is_some());
        if network_has_body && cache_has_body {
            return Err(Error::illegal_state(
                "network_response and cache_response cannot both carry a body",
            ));
        }

        Ok(Response {
            request: self.request,
            status: self.status,
            reason: self.reason,
            version: self.version,
            headers: self.headers,
            body: self.body,
            network_response: self.network_response,
            cache_response: self.cache_response,
            prior_response: self.prior_response,
            sent_at: self.sent_at,
            received_at: self.received_at,
            cache_control: std::sync::OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::ResponseBody as RB;

    fn req() -> Request {
        Request::builder().url("https://example.com").unwrap().build().unwrap()
    }

    #[test]
    fn builder_defaults_to_200() {
        let r = Response::builder(req()).build().unwrap();
        assert_eq!(r.status(), StatusCode::OK);
        assert!(r.is_successful());
    }

    #[test]
    fn redirect_status_is_detected() {
        let r = Response::builder(req())
            .status(StatusCode::FOUND)
            .build()
            .unwrap();
        assert!(r.is_redirect());
    }

    #[test]
    fn prior_response_is_stripped_of_body() {
        let prior = Response::builder(req())
            .status(StatusCode::FOUND)
            .body(RB::from_bytes(bytes::Bytes::from_static(b"x")))
            .build()
            .unwrap();
        let r = Response::builder(req())
            .prior_response(prior)
            .build()
            .unwrap();
        assert!(r.prior_response().unwrap().body().is_none());
    }

    #[test]
    fn both_legs_with_body_is_rejected() {
        let network = Response::builder(req())
            .body(RB::from_bytes(bytes::Bytes::from_static(b"a")))
            .build()
            .unwrap();
        let cache = Response::builder(req())
            .body(RB::from_bytes(bytes::Bytes::from_static(b"b")))
            .build()
            .unwrap();
        let err = Response::builder(req())
            .network_response(network)
            .cache_response(cache)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn is_from_cache_reflects_cache_response_leg() {
        let cache = Response::builder(req()).build().unwrap();
        let r = Response::builder(req()).cache_response(cache).build().unwrap();
        assert!(r.is_from_cache());
    }
}
