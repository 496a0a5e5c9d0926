//! CallServer interceptor (§4.7): the terminal pipeline stage. Writes the
//! request to the connection claimed by Connect and reads back the
//! response, enforcing the read-phase invariants (HEAD/204/205 get no
//! body, non-1.1 responses mark their connection unfit for reuse).

use async_trait::async_trait;
use http::Version;

use crate::body::ResponseBody;
use crate::chain::{Chain, Interceptor};
use crate::error::{Error, Result};
use crate::response::Response;

pub struct CallServerInterceptor;

#[async_trait]
impl Interceptor for CallServerInterceptor {
    async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
        let request = chain.request().clone();
        let allocation = chain.stream_allocation().cloned().ok_or_else(|| {
            Error::illegal_state("CallServer reached with no stream allocation from Connect")
        })?;

        // Write phase: headers + body are assembled into the transport
        // call by `ReqwestTransport::send`; a known-length body sends
        // `Content-Length`, an unknown-length one is sent chunked by
        // `reqwest` itself (§4.7 write phase).
        let transport = chain.transport().clone();

        // Race the network call against cancellation so a cancel that
        // arrives while this hop is blocked in the read surfaces as
        // `Error::Canceled` instead of waiting out the read timeout
        // (§8 scenario 6). The connection claimed above is simply
        // dropped, not returned to the pool, on this path.
        let (head, raw_response) = tokio::select! {
            result = transport.send(allocation.connection(), &request) => result?,
            _ = chain.canceled() => return Err(Error::Canceled),
        };

        // Read phase: a response below HTTP/1.1 or carrying an explicit
        // `Connection: close` cannot have its connection recycled.
        if head.version < Version::HTTP_11 || is_connection_close(&head.headers) {
            allocation.no_new_streams();
        }

        let status = head.status.as_u16();
        let is_head = request.method() == http::Method::HEAD;
        let body = if is_head || matches!(status, 204 | 205) {
            ResponseBody::empty()
        } else {
            ResponseBody::from_reqwest(raw_response)
        };

        Response::builder(request)
            .status(head.status)
            .version(head.version)
            .headers(head.headers)
            .body(body)
            .build()
    }
}

fn is_connection_close(headers: &crate::headers::Headers) -> bool {
    headers
        .get("Connection")
        .is_some_and(|v| v.eq_ignore_ascii_case("close"))
}
