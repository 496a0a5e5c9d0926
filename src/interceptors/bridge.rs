//! Bridge interceptor (§4.4): translates between the caller's application
//! request/response and the wire-level request/response — default headers,
//! cookie assembly, and transparent gzip.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::body::ResponseBody;
use crate::chain::{Chain, Interceptor};
use crate::cookie_jar::{Cookie, CookieJar};
use crate::error::{Error, Result};
use crate::response::Response;

/// Header the engine sets itself to request transparent gzip, and the flag
/// name it checks on the way back to decide whether it owns the decode
/// (§4.4: only undo compression this engine itself asked for).
const ACCEPT_ENCODING: &str = "Accept-Encoding";
const CONTENT_ENCODING: &str = "Content-Encoding";

pub struct BridgeInterceptor {
    cookie_jar: Arc<dyn CookieJar>,
    user_agent: String,
    transparent_gzip: bool,
}

impl BridgeInterceptor {
    pub fn new(cookie_jar: Arc<dyn CookieJar>, user_agent: String, transparent_gzip: bool) -> Self {
        Self {
            cookie_jar,
            user_agent,
            transparent_gzip,
        }
    }
}

#[async_trait]
impl Interceptor for BridgeInterceptor {
    async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
        let user_request = chain.request().clone();
        let mut builder = user_request.new_builder();

        if let Some(body) = user_request.body() {
            if !user_request.headers().contains("Content-Type") {
                if let Some(ct) = body.content_type() {
                    builder = builder.set_header("Content-Type", ct)?;
                }
            }
            match body.content_length() {
                Some(len) => {
                    if !user_request.headers().contains("Content-Length") {
                        builder = builder.set_header("Content-Length", len.to_string())?;
                    }
                }
                None => {
                    builder = builder.set_header("Transfer-Encoding", "chunked")?;
                }
            }
        }

        if !user_request.headers().contains("Host") {
            if let Some(host) = user_request.url().host_str() {
                builder = builder.set_header("Host", host)?;
            }
        }

        if !user_request.headers().contains("Connection") {
            builder = builder.set_header("Connection", "Keep-Alive")?;
        }

        // A `Range` request asks for specific bytes; transparently
        // negotiating and then undoing gzip would corrupt those offsets,
        // so such requests are left to state their own encoding (§4.4).
        let added_gzip_request = self.transparent_gzip
            && !user_request.headers().contains(ACCEPT_ENCODING)
            && !user_request.headers().contains("Range");
        if added_gzip_request {
            builder = builder.set_header(ACCEPT_ENCODING, "gzip")?;
        }

        if !user_request.headers().contains("User-Agent") {
            builder = builder.set_header("User-Agent", &self.user_agent)?;
        }

        let cookies = self.cookie_jar.load(user_request.url());
        if !cookies.is_empty() && !user_request.headers().contains("Cookie") {
            let value = cookies
                .iter()
                .map(Cookie::to_header_value)
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.set_header("Cookie", value)?;
        }

        let network_request = builder.build()?;
        let network_response = chain.proceed(network_request).await?;

        let observed_cookies: Vec<Cookie> = network_response
            .headers()
            .get_all("Set-Cookie")
            .into_iter()
            .filter_map(Cookie::parse)
            .collect();
        if !observed_cookies.is_empty() {
            self.cookie_jar.save(user_request.url(), observed_cookies);
        }

        let is_gzip_encoded = network_response
            .header(CONTENT_ENCODING)
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

        // HEAD and 204/205 responses carry no body by definition (CallServer
        // already zeroes it out) even if the origin echoed a gzip
        // `Content-Encoding` — nothing to decode.
        let has_decodable_body = network_response.request().method() != http::Method::HEAD
            && !matches!(network_response.status().as_u16(), 204 | 205);

        if added_gzip_request && is_gzip_encoded && has_decodable_body {
            let compressed = network_response
                .body()
                .ok_or_else(|| Error::illegal_state("gzip response carried no body"))?
                .bytes()
                .await?;
            let decompressed = gunzip(&compressed)?;

            let mut rebuilt = network_response.new_builder();
            let mut headers = network_response.headers().clone();
            headers.remove_all(CONTENT_ENCODING);
            headers.remove_all("Content-Length");
            rebuilt = rebuilt.headers(headers);
            rebuilt.body(ResponseBody::from_bytes(decompressed)).build()
        } else {
            Ok(network_response)
        }
    }
}

fn gunzip(compressed: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::protocol(format!("failed to decode gzip response body: {e}")))?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gunzip_round_trips_a_known_payload() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello, bridge").unwrap();
        let compressed = encoder.finish().unwrap();

        let decompressed = gunzip(&compressed).unwrap();
        assert_eq!(&decompressed[..], b"hello, bridge");
    }

    struct HeadGzipEchoInterceptor;

    #[async_trait]
    impl Interceptor for HeadGzipEchoInterceptor {
        async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
            Response::builder(chain.request().clone())
                .header("Content-Encoding", "gzip")?
                .body(ResponseBody::empty())
                .build()
        }
    }

    #[tokio::test]
    async fn head_response_with_gzip_content_encoding_is_not_decoded() {
        use crate::call::CallState;
        use crate::chain::RealInterceptorChain;
        use crate::request::Request;
        use crate::transport::ReqwestTransport;
        use std::sync::Arc;

        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(BridgeInterceptor::new(
                Arc::new(crate::cookie_jar::NoCookieJar),
                "test-agent".into(),
                true,
            )),
            Arc::new(HeadGzipEchoInterceptor),
        ];
        let request = Request::builder()
            .url("https://example.com")
            .unwrap()
            .head()
            .build()
            .unwrap();
        let chain = RealInterceptorChain::new(
            Arc::new(interceptors),
            request,
            Arc::new(ReqwestTransport::new(reqwest::Client::new())),
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
            Arc::new(CallState::new()),
        );
        let response = chain.execute().await.unwrap();
        assert_eq!(response.header("Content-Encoding"), Some("gzip"));
    }

    struct CapturingInterceptor {
        seen: std::sync::Mutex<Option<crate::request::Request>>,
    }

    #[async_trait]
    impl Interceptor for CapturingInterceptor {
        async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
            *self.seen.lock().unwrap() = Some(chain.request().clone());
            Response::builder(chain.request().clone()).build()
        }
    }

    #[tokio::test]
    async fn expect_continue_header_passes_through_untouched() {
        use crate::call::CallState;
        use crate::chain::RealInterceptorChain;
        use crate::request::Request;
        use crate::transport::ReqwestTransport;
        use std::sync::{Arc, Mutex};

        let capture = Arc::new(CapturingInterceptor { seen: Mutex::new(None) });
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(BridgeInterceptor::new(
                Arc::new(crate::cookie_jar::NoCookieJar),
                "test-agent".into(),
                true,
            )),
            capture.clone(),
        ];
        let request = Request::builder()
            .url("https://example.com")
            .unwrap()
            .header("Expect", "100-continue")
            .unwrap()
            .build()
            .unwrap();
        let chain = RealInterceptorChain::new(
            Arc::new(interceptors),
            request,
            Arc::new(ReqwestTransport::new(reqwest::Client::new())),
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(1),
            Arc::new(CallState::new()),
        );
        chain.execute().await.unwrap();

        let seen = capture.seen.lock().unwrap();
        assert_eq!(seen.as_ref().unwrap().header("Expect"), Some("100-continue"));
    }
}
