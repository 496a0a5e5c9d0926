//! Client configuration (§6).

use std::sync::Arc;
use std::time::Duration;

use crate::authenticator::{Authenticator, NoAuthenticator};
use crate::cache_store::{CacheStore, InMemoryCacheStore};
use crate::chain::Interceptor;
use crate::cookie_jar::{CookieJar, NoCookieJar};

/// All the knobs a [`crate::client::Client`] is built from (§6). Mirrors the
/// teacher's `HttpClientConfig`/`HttpClientConfigBuilder` shape, widened to
/// the full option set this engine exposes.
#[derive(Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub call_timeout: Duration,
    pub follow_redirects: bool,
    pub follow_ssl_redirects: bool,
    pub transparent_gzip: bool,
    pub user_agent: String,
    pub max_requests: usize,
    pub max_requests_per_host: usize,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub application_interceptors: Vec<Arc<dyn Interceptor>>,
    pub network_interceptors: Vec<Arc<dyn Interceptor>>,
    pub cache_store: Arc<dyn CacheStore>,
    pub cookie_jar: Arc<dyn CookieJar>,
    pub authenticator: Arc<dyn Authenticator>,
    pub proxy_authenticator: Arc<dyn Authenticator>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("follow_redirects", &self.follow_redirects)
            .field("follow_ssl_redirects", &self.follow_ssl_redirects)
            .field("transparent_gzip", &self.transparent_gzip)
            .field("user_agent", &self.user_agent)
            .field("max_requests", &self.max_requests)
            .field("max_requests_per_host", &self.max_requests_per_host)
            .field("application_interceptors", &self.application_interceptors.len())
            .field("network_interceptors", &self.network_interceptors.len())
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(0),
            follow_redirects: true,
            follow_ssl_redirects: false,
            transparent_gzip: true,
            user_agent: format!("reqchain/{}", env!("CARGO_PKG_VERSION")),
            max_requests: 64,
            max_requests_per_host: 5,
            pool_max_idle_per_host: 5,
            pool_idle_timeout: Duration::from_secs(300),
            application_interceptors: Vec::new(),
            network_interceptors: Vec::new(),
            cache_store: Arc::new(InMemoryCacheStore::new()),
            cookie_jar: Arc::new(NoCookieJar),
            authenticator: Arc::new(NoAuthenticator),
            proxy_authenticator: Arc::new(NoAuthenticator),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`], validated at [`build`](ClientConfigBuilder::build).
#[derive(Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// A whole-call deadline spanning every retry/redirect hop. Zero means
    /// no call-level timeout (§6 default).
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, enabled: bool) -> Self {
        self.config.follow_redirects = enabled;
        self
    }

    /// Whether an https→http redirect (a scheme downgrade) is followed.
    /// Off by default (§4.3): silently downgrading would send whatever the
    /// request carries over a connection the caller never asked for.
    pub fn follow_ssl_redirects(mut self, enabled: bool) -> Self {
        self.config.follow_ssl_redirects = enabled;
        self
    }

    pub fn transparent_gzip(mut self, enabled: bool) -> Self {
        self.config.transparent_gzip = enabled;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn max_requests(mut self, max: usize) -> Self {
        self.config.max_requests = max;
        self
    }

    pub fn max_requests_per_host(mut self, max: usize) -> Self {
        self.config.max_requests_per_host = max;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Add an application interceptor (runs before RetryAndFollowUp, sees
    /// exactly one invocation per `Call::execute`/`enqueue`, §4.2).
    pub fn add_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.config.application_interceptors.push(interceptor);
        self
    }

    /// Add a network interceptor (runs between Connect and CallServer,
    /// skipped for calls that never reach the network, §4.2).
    pub fn add_network_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.config.network_interceptors.push(interceptor);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.config.cache_store = store;
        self
    }

    pub fn cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.config.cookie_jar = jar;
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.config.authenticator = authenticator;
        self
    }

    pub fn proxy_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.config.proxy_authenticator = authenticator;
        self
    }

    pub fn build(self) -> crate::error::Result<ClientConfig> {
        if self.config.max_requests == 0 {
            return Err(crate::error::Error::illegal_argument(
                "max_requests must be greater than zero",
            ));
        }
        if self.config.max_requests_per_host == 0 {
            return Err(crate::error::Error::illegal_argument(
                "max_requests_per_host must be greater than zero",
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::builder().build().unwrap();
        assert_eq!(config.max_requests, 64);
        assert_eq!(config.max_requests_per_host, 5);
    }

    #[test]
    fn zero_max_requests_is_rejected() {
        let err = ClientConfig::builder().max_requests(0).build().unwrap_err();
        assert!(matches!(err, crate::error::Error::IllegalArgument(_)));
    }
}
