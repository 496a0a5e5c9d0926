//! Transport seam (§1, §4.6): socket/TLS connection work is delegated to
//! `reqwest`. This module owns only the policy `reqwest` doesn't give us —
//! matching an existing connection to a route so the Connect interceptor
//! can decide whether it needs a new one — not the bytes on the wire.

use std::sync::Arc;

use crate::error::Result;
use crate::request::Request;
use crate::response::ResponseHead;

/// A claimed connection's identity, for route/protocol-match bookkeeping.
/// `reqwest::Client` owns the actual socket pool; this is our policy-side
/// handle onto it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealConnection {
    host: String,
    protocol: ConnectionProtocol,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionProtocol {
    Http11,
    Http2,
}

impl RealConnection {
    pub fn direct(host: String) -> Self {
        Self {
            host,
            protocol: ConnectionProtocol::Http11,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn protocol(&self) -> ConnectionProtocol {
        self.protocol
    }

    /// True if a request to `request`'s host/scheme could reuse this
    /// connection instead of opening a new one (§4.6 route match).
    pub fn matches(&self, request: &Request) -> bool {
        request
            .url()
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.host))
    }
}

/// The transport's write+read execution of a single request, wired to a
/// specific [`RealConnection`]. Swappable so tests can stub out the wire
/// entirely; the default implementation is backed by `reqwest::Client`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, request: &Request) -> Result<RealConnection>;

    async fn send(
        &self,
        connection: &RealConnection,
        request: &Request,
    ) -> Result<(ResponseHead, reqwest::Response)>;
}

/// Default transport backed by a shared `reqwest::Client`, which owns the
/// actual socket pool (`pool_idle_timeout`/`pool_max_idle_per_host` in
/// `ClientConfig`). Our policy layer above it only decides when a new
/// logical hop is needed.
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn connect(&self, request: &Request) -> Result<RealConnection> {
        let host = request
            .url()
            .host_str()
            .map(|h| h.to_string())
            .unwrap_or_default();
        Ok(RealConnection::direct(host))
    }

    async fn send(
        &self,
        _connection: &RealConnection,
        request: &Request,
    ) -> Result<(ResponseHead, reqwest::Response)> {
        let mut builder = self
            .inner
            .request(request.method().clone(), request.url().clone());
        builder = builder.headers(request.headers().to_header_map());
        if let Some(body) = request.body() {
            builder = builder.body(body.take().await?);
        }

        // `Expect: 100-continue` is forwarded untouched (Bridge never
        // strips it, see bridge.rs) rather than re-negotiated up here: the
        // write-then-wait-for-100-or-abort exchange this header asks for
        // happens below `reqwest`, on the HTTP/1.1 connection itself, which
        // is exactly the boundary this module's own doc comment says we
        // delegate past. Re-implementing the wait/abort state machine at
        // this layer on top of a library that already performs it on the
        // wire would just race the real negotiation.
        let response = builder.send().await?;
        let head = ResponseHead {
            status: response.status(),
            version: response.version(),
            headers: crate::headers::Headers::from_header_map(response.headers()),
        };
        Ok((head, response))
    }
}

pub(crate) fn shared_transport(client: reqwest::Client) -> Arc<dyn Transport> {
    Arc::new(ReqwestTransport::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_matches_same_host_case_insensitively() {
        let conn = RealConnection::direct("example.com".into());
        let req = Request::builder()
            .url("https://EXAMPLE.com/path")
            .unwrap()
            .build()
            .unwrap();
        assert!(conn.matches(&req));
    }

    #[test]
    fn connection_does_not_match_other_host() {
        let conn = RealConnection::direct("example.com".into());
        let req = Request::builder()
            .url("https://other.com")
            .unwrap()
            .build()
            .unwrap();
        assert!(!conn.matches(&req));
    }
}
