//! RetryAndFollowUp interceptor (§4.3): the outermost pipeline stage. Owns
//! the retry-on-failure classification, the follow-up policy for
//! redirects/auth challenges, and the 20-hop cap.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};

use crate::authenticator::Authenticator;
use crate::chain::{Chain, Interceptor};
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

const MAX_FOLLOW_UPS: u32 = 20;

pub struct RetryAndFollowUpInterceptor {
    follow_redirects: bool,
    follow_ssl_redirects: bool,
    authenticator: Arc<dyn Authenticator>,
    proxy_authenticator: Arc<dyn Authenticator>,
}

impl RetryAndFollowUpInterceptor {
    pub fn new(
        follow_redirects: bool,
        follow_ssl_redirects: bool,
        authenticator: Arc<dyn Authenticator>,
        proxy_authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            follow_redirects,
            follow_ssl_redirects,
            authenticator,
            proxy_authenticator,
        }
    }

    /// Retry-on-failure classification (§4.3): a request whose body cannot
    /// be replayed is never retried; otherwise a recoverable transport
    /// error gets exactly one more attempt.
    async fn attempt_with_retry(&self, chain: &mut dyn Chain, request: Request) -> Result<Response> {
        match chain.retry_proceed(request.clone()).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_recoverable() && can_retry(&request) => {
                tracing::debug!(error = %err, "retrying request after recoverable transport error");
                chain.retry_proceed(request).await
            }
            Err(err) => Err(err),
        }
    }

    /// Decide the next request for a redirect or auth challenge, or `None`
    /// if `response` should be returned to the caller as-is (§4.3).
    async fn follow_up_request(
        &self,
        chain: &mut dyn Chain,
        response: &Response,
    ) -> Result<Option<Request>> {
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                let candidate = self.authenticator.authenticate(response).await?;
                Ok(candidate.filter(|next| !is_same_request(next, response.request())))
            }
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => {
                let candidate = self.proxy_authenticator.authenticate(response).await?;
                Ok(candidate.filter(|next| !is_same_request(next, response.request())))
            }
            StatusCode::MULTIPLE_CHOICES
            | StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT => {
                if !self.follow_redirects {
                    Ok(None)
                } else {
                    self.redirect_request(response)
                }
            }
            StatusCode::REQUEST_TIMEOUT => {
                let request = response.request();
                // RFC 7231 §6.5.7: don't keep retrying a 408 that's already
                // the result of a previous 408 retry.
                let prior_was_408 = response
                    .prior_response()
                    .is_some_and(|prior| prior.status() == StatusCode::REQUEST_TIMEOUT);
                if prior_was_408 || !can_retry(request) {
                    Ok(None)
                } else {
                    Ok(Some(request.new_builder().build()?))
                }
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                let request = response.request();
                // Only retry a 503 when the server explicitly invited an
                // immediate retry (`Retry-After: 0`); otherwise the outage
                // is presumed ongoing and the response is returned as-is.
                let retry_after_zero = response
                    .header("Retry-After")
                    .is_some_and(|value| value.trim() == "0");
                if !retry_after_zero || !can_retry(request) {
                    Ok(None)
                } else {
                    Ok(Some(request.new_builder().build()?))
                }
            }
            _ if response.status().as_u16() == 421 => {
                // Misdirected Request: same connection can't serve this
                // authority. Force Connect to claim a fresh connection for
                // the retry rather than reusing the one that just rejected
                // the request.
                let request = response.request();
                if can_retry(request) {
                    if let Some(allocation) = chain.stream_allocation() {
                        allocation.no_new_streams();
                    }
                    Ok(Some(request.new_builder().build()?))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    fn redirect_request(&self, response: &Response) -> Result<Option<Request>> {
        let Some(location) = response.header("Location") else {
            return Ok(None);
        };
        let new_url = response
            .request()
            .url()
            .join(location)
            .map_err(Error::from)?;

        let request = response.request();

        // A redirect from https to http is only followed when the caller
        // has explicitly opted in (§4.3); silently downgrading would leak
        // request contents that were only ever meant for an encrypted hop.
        let is_downgrade = request.url().scheme() == "https" && new_url.scheme() == "http";
        if is_downgrade && !self.follow_ssl_redirects {
            return Ok(None);
        }

        let same_host = request.is_same_host(&new_url);
        tracing::debug!(from = %request.url(), to = %new_url, status = response.status().as_u16(), "following redirect");

        let mut builder = request.new_builder().parsed_url(new_url)?;

        let should_drop_body = matches!(
            response.status(),
            StatusCode::MULTIPLE_CHOICES
                | StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
        ) && request.method() != Method::HEAD;

        if should_drop_body {
            builder = builder.get();
        }

        if !same_host {
            builder = builder.remove_header("Authorization");
            builder = builder.remove_header("Cookie");
        }

        Ok(Some(builder.build()?))
    }
}

#[async_trait]
impl Interceptor for RetryAndFollowUpInterceptor {
    async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
        let mut request = chain.request().clone();
        let mut follow_up_count = 0u32;
        let mut prior: Option<Response> = None;

        loop {
            if chain.is_canceled() {
                return Err(Error::Canceled);
            }

            let response = self.attempt_with_retry(chain, request.clone()).await?;

            let response = match prior.take() {
                Some(prior_response) => response.with_prior_response(prior_response),
                None => response,
            };

            let Some(follow_up) = self.follow_up_request(chain, &response).await? else {
                return Ok(response);
            };

            follow_up_count += 1;
            if follow_up_count > MAX_FOLLOW_UPS {
                return Err(Error::protocol(format!(
                    "too many follow-up requests: {follow_up_count}"
                )));
            }

            request = follow_up;
            prior = Some(response);
        }
    }
}

/// Whether `a` and `b` are the same challenge-response attempt by URL and
/// headers (`authenticator.rs`'s documented "give up" signal): an
/// `Authenticator` that can't find credentials may hand back the exact
/// request it was challenged on rather than `None`, and that must not be
/// treated as a fresh follow-up or it loops until the hop cap trips.
fn is_same_request(a: &Request, b: &Request) -> bool {
    a.url() == b.url() && a.headers() == b.headers()
}

/// Whether `request` is eligible for a same-shape retry or redirect replay:
/// no body, or a body that can still be replayed (§4.3, Design Note §9).
fn can_retry(request: &Request) -> bool {
    match request.body() {
        Some(body) => body.can_replay(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_same_request_true_for_identical_url_and_headers() {
        let a = Request::builder().url("https://example.com").unwrap().build().unwrap();
        let b = Request::builder().url("https://example.com").unwrap().build().unwrap();
        assert!(is_same_request(&a, &b));
    }

    #[test]
    fn is_same_request_false_once_a_header_differs() {
        let a = Request::builder().url("https://example.com").unwrap().build().unwrap();
        let b = Request::builder()
            .url("https://example.com")
            .unwrap()
            .header("Authorization", "Basic xyz")
            .unwrap()
            .build()
            .unwrap();
        assert!(!is_same_request(&a, &b));
    }

    #[test]
    fn can_retry_is_true_without_a_body() {
        let request = Request::builder().url("https://example.com").unwrap().build().unwrap();
        assert!(can_retry(&request));
    }

    #[test]
    fn can_retry_is_true_for_byte_backed_body() {
        let request = Request::builder()
            .url("https://example.com")
            .unwrap()
            .post(crate::body::RequestBody::from_bytes("x"))
            .build()
            .unwrap();
        assert!(can_retry(&request));
    }
}
