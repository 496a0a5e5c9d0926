//! Request and response body value types (§3, §4.1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// An outgoing request body.
///
/// A `Bytes`-backed body is fully buffered and can be re-transmitted as
/// many times as needed (retries, redirects). A `Streaming` body wraps a
/// one-shot source and cannot be replayed once consumed — the can-replay
/// predicate from Design Note §9.
#[derive(Clone)]
pub struct RequestBody {
    kind: BodyKind,
}

#[derive(Clone)]
enum BodyKind {
    Bytes {
        content_type: Option<String>,
        data: Bytes,
    },
    Streaming {
        content_type: Option<String>,
        length: Option<u64>,
        taken: Arc<AtomicBool>,
        body: Arc<Mutex<Option<reqwest::Body>>>,
    },
}

impl RequestBody {
    /// A zero-length body. Used as the DELETE sentinel (Design Note §9,
    /// Open Question: emit `Content-Length: 0` rather than omitting the
    /// header).
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A body backed by in-memory bytes. Always replayable.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            kind: BodyKind::Bytes {
                content_type: None,
                data: data.into(),
            },
        }
    }

    /// A body backed by in-memory bytes with an explicit content type.
    pub fn from_bytes_with_type(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            kind: BodyKind::Bytes {
                content_type: Some(content_type.into()),
                data: data.into(),
            },
        }
    }

    /// A JSON-encoded body with `application/json`.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::illegal_argument(format!("failed to serialize JSON body: {e}")))?;
        Ok(Self::from_bytes_with_type(bytes, "application/json"))
    }

    /// A form-urlencoded body with `application/x-www-form-urlencoded`.
    pub fn form<T: Serialize>(value: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(value)
            .map_err(|e| Error::illegal_argument(format!("failed to encode form body: {e}")))?;
        Ok(Self::from_bytes_with_type(
            encoded,
            "application/x-www-form-urlencoded",
        ))
    }

    /// A one-shot streaming body of unknown or known length. Not
    /// replayable: a retry or redirect that needs to resend this body
    /// will fail (§4.3 retry-on-failure policy checks this first).
    pub fn streaming(body: reqwest::Body, content_type: Option<String>, length: Option<u64>) -> Self {
        Self {
            kind: BodyKind::Streaming {
                content_type,
                length,
                taken: Arc::new(AtomicBool::new(false)),
                body: Arc::new(Mutex::new(Some(body))),
            },
        }
    }

    /// The body's declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        match &self.kind {
            BodyKind::Bytes { content_type, .. } => content_type.as_deref(),
            BodyKind::Streaming { content_type, .. } => content_type.as_deref(),
        }
    }

    /// The body's known length, if any. `None` means the Bridge
    /// interceptor must use `Transfer-Encoding: chunked` (§4.4).
    pub fn content_length(&self) -> Option<u64> {
        match &self.kind {
            BodyKind::Bytes { data, .. } => Some(data.len() as u64),
            BodyKind::Streaming { length, .. } => *length,
        }
    }

    /// True for a zero-length body.
    pub fn is_empty(&self) -> bool {
        self.content_length() == Some(0)
    }

    /// Whether this body can be re-transmitted for a retry or follow-up.
    /// Byte-backed bodies always can; a streaming source cannot once it
    /// has been consumed, and can never be consumed twice regardless.
    pub fn can_replay(&self) -> bool {
        match &self.kind {
            BodyKind::Bytes { .. } => true,
            BodyKind::Streaming { taken, .. } => !taken.load(Ordering::SeqCst),
        }
    }

    /// Take ownership of the underlying `reqwest::Body` for one wire
    /// transmission. Streaming bodies can only be taken once; a second
    /// call returns an illegal-state error.
    pub(crate) async fn take(&self) -> Result<reqwest::Body> {
        match &self.kind {
            BodyKind::Bytes { data, .. } => Ok(reqwest::Body::from(data.clone())),
            BodyKind::Streaming { taken, body, .. } => {
                if taken.swap(true, Ordering::SeqCst) {
                    return Err(Error::illegal_state(
                        "streaming request body already consumed",
                    ));
                }
                body.lock()
                    .await
                    .take()
                    .ok_or_else(|| Error::illegal_state("streaming request body already consumed"))
            }
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("content_type", &self.content_type())
            .field("content_length", &self.content_length())
            .field("can_replay", &self.can_replay())
            .finish()
    }
}

/// A one-shot response body stream (§3: "body is a one-shot stream").
///
/// Once consumed via `bytes()`, `text()`, `json()`, or `bytes_stream()`,
/// a second call returns an illegal-state error — mirroring the
/// single-consumption contract on `Response::body()` in §6.
pub struct ResponseBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    inner: Mutex<Option<BodyInner>>,
}

enum BodyInner {
    Buffered(Bytes),
    Reqwest(reqwest::Response),
}

impl ResponseBody {
    pub(crate) fn from_reqwest(response: reqwest::Response) -> Self {
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_length = response.content_length();
        Self {
            content_type,
            content_length,
            inner: Mutex::new(Some(BodyInner::Reqwest(response))),
        }
    }

    pub(crate) fn from_bytes(bytes: Bytes) -> Self {
        let content_length = Some(bytes.len() as u64);
        Self {
            content_type: None,
            content_length,
            inner: Mutex::new(Some(BodyInner::Buffered(bytes))),
        }
    }

    /// An empty body, used for HEAD responses and 204/205 status codes
    /// (§4.7).
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// The `Content-Type` observed on the response, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `Content-Length` observed on the response, if any. `None`
    /// after transparent gzip decoding, since the decompressed length is
    /// unknown in advance (§4.4).
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Consume the body and return it as bytes.
    pub async fn bytes(&self) -> Result<Bytes> {
        let inner = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::illegal_state("response body already consumed"))?;
        match inner {
            BodyInner::Buffered(b) => Ok(b),
            BodyInner::Reqwest(r) => Ok(r.bytes().await?),
        }
    }

    /// Consume the body and decode it as UTF-8 text.
    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::protocol(format!("response body is not valid UTF-8: {e}")))
    }

    /// Consume the body and parse it as JSON.
    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::protocol(format!("failed to parse JSON body: {e}")))
    }

    /// Consume the body as a stream of chunks, for callers that want to
    /// process it incrementally instead of buffering.
    pub async fn bytes_stream(&self) -> Result<impl Stream<Item = Result<Bytes>>> {
        let inner = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::illegal_state("response body already consumed"))?;
        match inner {
            BodyInner::Buffered(b) => Ok(stream::once(async move { Ok(b) }).boxed()),
            BodyInner::Reqwest(r) => Ok(r.bytes_stream().map(|r| r.map_err(Error::from)).boxed()),
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_has_zero_length() {
        let body = RequestBody::empty();
        assert_eq!(body.content_length(), Some(0));
        assert!(body.is_empty());
    }

    #[test]
    fn bytes_body_can_always_replay() {
        let body = RequestBody::from_bytes(Bytes::from_static(b"hello"));
        assert!(body.can_replay());
    }

    #[tokio::test]
    async fn streaming_body_cannot_replay_after_take() {
        let body = RequestBody::streaming(reqwest::Body::from("x"), None, Some(1));
        assert!(body.can_replay());
        body.take().await.unwrap();
        assert!(!body.can_replay());
        assert!(body.take().await.is_err());
    }

    #[tokio::test]
    async fn response_body_is_single_consumption() {
        let body = ResponseBody::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(body.bytes().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(body.bytes().await.is_err());
    }

    #[tokio::test]
    async fn response_body_text_decodes_utf8() {
        let body = ResponseBody::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(body.text().await.unwrap(), "hello");
    }
}
