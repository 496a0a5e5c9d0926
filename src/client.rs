//! Client: assembles the fixed interceptor pipeline and hands out `Call`s.

use std::sync::Arc;
use std::time::Duration;

use crate::call::{Call, CallState};
use crate::chain::{Interceptor, RealInterceptorChain};
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::interceptors::{
    BridgeInterceptor, CacheInterceptor, CallServerInterceptor, ConnectInterceptor,
    RetryAndFollowUpInterceptor,
};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{shared_transport, Transport};

/// An HTTP client: immutable once built, cheap to clone (an `Arc` around its
/// shared pipeline and dispatcher), and the factory for every [`Call`] it
/// executes.
#[derive(Clone)]
pub struct Client {
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    call_timeout: Duration,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn new(config: ClientConfig) -> Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(crate::error::Error::from)?;

        let mut interceptors: Vec<Arc<dyn Interceptor>> =
            Vec::with_capacity(5 + config.application_interceptors.len() + config.network_interceptors.len());
        interceptors.extend(config.application_interceptors.iter().cloned());
        interceptors.push(Arc::new(RetryAndFollowUpInterceptor::new(
            config.follow_redirects,
            config.follow_ssl_redirects,
            config.authenticator.clone(),
            config.proxy_authenticator.clone(),
        )));
        interceptors.push(Arc::new(BridgeInterceptor::new(
            config.cookie_jar.clone(),
            config.user_agent.clone(),
            config.transparent_gzip,
        )));
        interceptors.push(Arc::new(CacheInterceptor::new(config.cache_store.clone())));
        interceptors.push(Arc::new(ConnectInterceptor));
        interceptors.extend(config.network_interceptors.iter().cloned());
        interceptors.push(Arc::new(CallServerInterceptor));

        Ok(Self {
            interceptors: Arc::new(interceptors),
            transport: shared_transport(reqwest_client),
            dispatcher: Arc::new(Dispatcher::new(config.max_requests, config.max_requests_per_host)),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            call_timeout: config.call_timeout,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Create a new, not-yet-executed [`Call`] for `request`.
    pub fn new_call(&self, request: Request) -> Call {
        Call::new(self.clone(), request)
    }

    /// Run `request` on the synchronous path (`Call::execute`): tracked by
    /// the dispatcher for introspection but never queued or capped by
    /// `max_requests`/`max_requests_per_host` — those caps gate only the
    /// async path (§4.9).
    pub(crate) async fn dispatch_sync(self, request: Request, state: Arc<CallState>) -> Result<Response> {
        let host = request.url().host_str().unwrap_or_default().to_string();
        let _guard = self.dispatcher.acquire_sync(host);
        self.run(request, state).await
    }

    /// Run `request` on the bounded async path (`Call::enqueue`), admitted
    /// through the dispatcher's ready/running queue (§4.9).
    pub(crate) async fn dispatch_async(self, request: Request, state: Arc<CallState>) -> Result<Response> {
        let host = request.url().host_str().unwrap_or_default().to_string();
        let _guard = self.dispatcher.acquire_async(host).await;
        self.run(request, state).await
    }

    async fn run(&self, request: Request, state: Arc<CallState>) -> Result<Response> {
        let call_timeout = self.call_timeout;
        let chain = RealInterceptorChain::new(
            self.interceptors.clone(),
            request,
            self.transport.clone(),
            self.connect_timeout,
            self.read_timeout,
            self.write_timeout,
            state,
        );

        // A zero call_timeout (the default) means no whole-call deadline,
        // mirroring the teacher's own "0 disables" convention (§6).
        if call_timeout.is_zero() {
            chain.execute().await
        } else {
            match tokio::time::timeout(call_timeout, chain.execute()).await {
                Ok(result) => result,
                Err(_) => Err(crate::error::Error::protocol(format!(
                    "call timed out after {call_timeout:?}"
                ))),
            }
        }
    }
}

/// Builds a [`Client`] from a [`ClientConfig`] assembled via the same
/// fluent-builder convention the teacher uses for `HttpClientConfigBuilder`.
#[derive(Default)]
pub struct ClientBuilder {
    config: crate::config::ClientConfigBuilder,
}

impl ClientBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.read_timeout(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.write_timeout(timeout);
        self
    }

    pub fn follow_redirects(mut self, enabled: bool) -> Self {
        self.config = self.config.follow_redirects(enabled);
        self
    }

    pub fn follow_ssl_redirects(mut self, enabled: bool) -> Self {
        self.config = self.config.follow_ssl_redirects(enabled);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.call_timeout(timeout);
        self
    }

    pub fn max_requests(mut self, max: usize) -> Self {
        self.config = self.config.max_requests(max);
        self
    }

    pub fn max_requests_per_host(mut self, max: usize) -> Self {
        self.config = self.config.max_requests_per_host(max);
        self
    }

    pub fn add_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.config = self.config.add_interceptor(interceptor);
        self
    }

    pub fn add_network_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.config = self.config.add_network_interceptor(interceptor);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn crate::cache_store::CacheStore>) -> Self {
        self.config = self.config.cache_store(store);
        self
    }

    pub fn cookie_jar(mut self, jar: Arc<dyn crate::cookie_jar::CookieJar>) -> Self {
        self.config = self.config.cookie_jar(jar);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn crate::authenticator::Authenticator>) -> Self {
        self.config = self.config.authenticator(authenticator);
        self
    }

    pub fn build(self) -> Result<Client> {
        Client::new(self.config.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_config() {
        let client = Client::builder().build().unwrap();
        assert_eq!(client.dispatcher().max_requests(), 64);
    }

    #[tokio::test]
    async fn new_call_is_not_executed_yet() {
        let client = Client::builder().build().unwrap();
        let request = Request::builder().url("https://example.com").unwrap().build().unwrap();
        let call = client.new_call(request);
        assert!(!call.is_executed());
    }
}
