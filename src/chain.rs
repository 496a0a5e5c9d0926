//! Interceptor pipeline (§4.2).
//!
//! Interceptors are assembled once, in a fixed order, when a `Client` is
//! built. Each call gets its own `InterceptorChain` instance walking that
//! same `Arc<[Arc<dyn Interceptor>]>` list — the list is shared, the
//! position within it is not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::call::CallState;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::stream_allocation::StreamAllocation;
use crate::transport::Transport;

/// A single stage of the request/response pipeline.
///
/// Implementations call `chain.proceed(request)` at most once to hand off to
/// the next stage (or, for the terminal `CallServer` stage, perform the
/// network write/read themselves and return without calling `proceed` at
/// all). Calling `proceed` more than once on the same `Chain` is a
/// programmer error and returns `Error::IllegalState`.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response>;
}

/// The view an [`Interceptor`] has of its position in the pipeline.
#[async_trait]
pub trait Chain: Send + Sync {
    /// The request as it stands when it reaches this interceptor. Earlier
    /// interceptors may have already replaced it via `proceed`.
    fn request(&self) -> &Request;

    /// Hand the (possibly modified) request to the next interceptor in the
    /// pipeline and return its response. May be called at most once per
    /// `Chain` instance.
    async fn proceed(&mut self, request: Request) -> Result<Response>;

    /// Like `proceed`, but starts a fresh pass over the remaining pipeline
    /// instead of enforcing the at-most-once rule. Reserved for the
    /// RetryAndFollowUp stage, which is the one interceptor that legitimately
    /// sends more than one attempt down the same chain position (retries,
    /// redirects, auth challenges). Every other interceptor must use
    /// `proceed`.
    async fn retry_proceed(&mut self, request: Request) -> Result<Response>;

    /// The stream allocation claimed for this call, if the pipeline has
    /// reached the Connect stage yet.
    fn stream_allocation(&self) -> Option<&StreamAllocation>;

    /// Record the stream allocation this hop claimed (or replaced), so
    /// later hops and the `Call` that owns cancellation can see it.
    fn set_stream_allocation(&mut self, allocation: Option<StreamAllocation>);

    /// The transport collaborator used by Connect/CallServer.
    fn transport(&self) -> &Arc<dyn Transport>;

    fn connect_timeout(&self) -> std::time::Duration;
    fn read_timeout(&self) -> std::time::Duration;
    fn write_timeout(&self) -> std::time::Duration;

    /// True if the owning `Call` has been canceled.
    fn is_canceled(&self) -> bool;

    /// Resolves once the owning `Call` is canceled (immediately if it
    /// already is). `CallServer` races this against the in-flight
    /// network read so a cancel during a blocked read surfaces as
    /// `Error::Canceled` instead of waiting out the read timeout.
    async fn canceled(&self);
}

/// Concrete `Chain` implementation: an index into the shared interceptor
/// list plus the mutable-once-per-hop state each interceptor can see.
pub struct RealInterceptorChain {
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
    index: usize,
    request: Request,
    stream_allocation: Option<StreamAllocation>,
    transport: Arc<dyn Transport>,
    connect_timeout: std::time::Duration,
    read_timeout: std::time::Duration,
    write_timeout: std::time::Duration,
    proceeded: AtomicBool,
    calls: Arc<CallState>,
}

impl RealInterceptorChain {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
        request: Request,
        transport: Arc<dyn Transport>,
        connect_timeout: std::time::Duration,
        read_timeout: std::time::Duration,
        write_timeout: std::time::Duration,
        calls: Arc<CallState>,
    ) -> Self {
        Self {
            interceptors,
            index: 0,
            request,
            stream_allocation: None,
            transport,
            connect_timeout,
            read_timeout,
            write_timeout,
            proceeded: AtomicBool::new(false),
            calls,
        }
    }

    /// Run the pipeline from its first stage.
    pub async fn execute(mut self) -> Result<Response> {
        if self.calls.is_canceled() {
            return Err(Error::Canceled);
        }
        self.dispatch().await
    }

    async fn dispatch(&mut self) -> Result<Response> {
        if self.index >= self.interceptors.len() {
            return Err(Error::illegal_state(
                "interceptor chain exhausted with no response produced",
            ));
        }
        if self.calls.is_canceled() {
            return Err(Error::Canceled);
        }
        let interceptor = self.interceptors[self.index].clone();
        let mut next = RealInterceptorChain {
            interceptors: self.interceptors.clone(),
            index: self.index + 1,
            request: self.request.clone(),
            stream_allocation: self.stream_allocation.clone(),
            transport: self.transport.clone(),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            proceeded: AtomicBool::new(false),
            calls: self.calls.clone(),
        };
        let response = interceptor.intercept(&mut next).await?;
        self.stream_allocation = next.stream_allocation;
        Ok(response)
    }
}

#[async_trait]
impl Chain for RealInterceptorChain {
    fn request(&self) -> &Request {
        &self.request
    }

    async fn proceed(&mut self, request: Request) -> Result<Response> {
        if self.proceeded.swap(true, Ordering::SeqCst) {
            return Err(Error::illegal_state(
                "chain.proceed() called more than once on the same interceptor hop",
            ));
        }
        self.request = request;
        self.dispatch().await
    }

    async fn retry_proceed(&mut self, request: Request) -> Result<Response> {
        self.proceeded.store(true, Ordering::SeqCst);
        self.request = request;
        self.dispatch().await
    }

    fn stream_allocation(&self) -> Option<&StreamAllocation> {
        self.stream_allocation.as_ref()
    }

    fn set_stream_allocation(&mut self, allocation: Option<StreamAllocation>) {
        self.stream_allocation = allocation;
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn connect_timeout(&self) -> std::time::Duration {
        self.connect_timeout
    }

    fn read_timeout(&self) -> std::time::Duration {
        self.read_timeout
    }

    fn write_timeout(&self) -> std::time::Duration {
        self.write_timeout
    }

    fn is_canceled(&self) -> bool {
        self.calls.is_canceled()
    }

    async fn canceled(&self) {
        self.calls.canceled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReqwestTransport;

    struct EchoInterceptor;

    #[async_trait]
    impl Interceptor for EchoInterceptor {
        async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
            let request = chain.request().clone();
            Response::builder(request).build()
        }
    }

    struct DoubleProceedInterceptor;

    #[async_trait]
    impl Interceptor for DoubleProceedInterceptor {
        async fn intercept(&self, chain: &mut dyn Chain) -> Result<Response> {
            let request = chain.request().clone();
            let _ = chain.proceed(request.clone()).await?;
            chain.proceed(request).await
        }
    }

    fn test_request() -> Request {
        Request::builder().url("https://example.com").unwrap().build().unwrap()
    }

    fn test_transport() -> Arc<dyn Transport> {
        Arc::new(ReqwestTransport::new(reqwest::Client::new()))
    }

    #[tokio::test]
    async fn terminal_interceptor_produces_response() {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(EchoInterceptor)];
        let chain = RealInterceptorChain::new(
            Arc::new(interceptors),
            test_request(),
            test_transport(),
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(10),
            Arc::new(CallState::new()),
        );
        let response = chain.execute().await.unwrap();
        assert!(response.is_successful());
    }

    #[tokio::test]
    async fn double_proceed_is_illegal_state() {
        let interceptors: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(DoubleProceedInterceptor), Arc::new(EchoInterceptor)];
        let chain = RealInterceptorChain::new(
            Arc::new(interceptors),
            test_request(),
            test_transport(),
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(10),
            Arc::new(CallState::new()),
        );
        let err = chain.execute().await.unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[tokio::test]
    async fn canceled_call_short_circuits() {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(EchoInterceptor)];
        let calls = Arc::new(CallState::new());
        calls.cancel();
        let chain = RealInterceptorChain::new(
            Arc::new(interceptors),
            test_request(),
            test_transport(),
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(10),
            calls,
        );
        let err = chain.execute().await.unwrap_err();
        assert!(err.is_canceled());
    }
}
