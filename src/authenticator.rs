//! Challenge-response authentication collaborator (§4.3, §6).
//!
//! Invoked by the RetryAndFollowUp interceptor on 401/407 responses. An
//! implementation returns a follow-up request carrying credentials, or
//! `None` to give up and let the challenge response be returned as-is.

use async_trait::async_trait;
use base64::Engine;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `response` is the 401 (`Authenticator`) or 407 (`proxy_authenticator`)
    /// challenge. Returning a request equal (by URL and headers) to
    /// `response.request()` signals "no credentials available" and the
    /// RetryAndFollowUp interceptor will not retry.
    async fn authenticate(&self, response: &Response) -> Result<Option<Request>>;
}

/// No credentials configured: challenge responses are returned to the
/// caller unmodified (§6 default).
pub struct NoAuthenticator;

#[async_trait]
impl Authenticator for NoAuthenticator {
    async fn authenticate(&self, _response: &Response) -> Result<Option<Request>> {
        Ok(None)
    }
}

/// HTTP Basic credentials attached unconditionally on every challenge,
/// unless the challenged request already carried an `Authorization` header
/// (to avoid looping on a server that keeps rejecting the same credential).
pub struct BasicAuthenticator {
    header_value: String,
}

impl BasicAuthenticator {
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let raw = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        Self {
            header_value: format!("Basic {encoded}"),
        }
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, response: &Response) -> Result<Option<Request>> {
        let request = response.request();
        if request.header("Authorization") == Some(self.header_value.as_str()) {
            return Ok(None);
        }
        let builder = request
            .new_builder()
            .set_header("Authorization", &self.header_value)?;
        Ok(Some(builder.build()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn challenge() -> Response {
        let request = Request::builder().url("https://example.com").unwrap().build().unwrap();
        Response::builder(request)
            .status(StatusCode::UNAUTHORIZED)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn no_authenticator_never_retries() {
        assert!(NoAuthenticator.authenticate(&challenge()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn basic_authenticator_attaches_header_once() {
        let auth = BasicAuthenticator::new("user", "pass");
        let retried = auth.authenticate(&challenge()).await.unwrap().unwrap();
        assert!(retried.header("Authorization").unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn basic_authenticator_gives_up_if_already_attempted() {
        let auth = BasicAuthenticator::new("user", "pass");
        let first = auth.authenticate(&challenge()).await.unwrap().unwrap();
        let second_challenge = Response::builder(first)
            .status(StatusCode::UNAUTHORIZED)
            .build()
            .unwrap();
        assert!(auth.authenticate(&second_challenge).await.unwrap().is_none());
    }
}
