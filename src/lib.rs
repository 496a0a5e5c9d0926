//! # reqchain
//!
//! A client-side HTTP/1.1 request execution engine built around an
//! immutable request/response model and a composable interceptor pipeline,
//! in the spirit of OkHttp.
//!
//! ## Features
//!
//! - **Immutable values**: `Request`/`Response` are built once and never
//!   mutated; derive a modified copy via `new_builder()`.
//! - **Interceptor pipeline**: application and network interceptor slots
//!   around five built-in stages — retry/follow-up, header bridging,
//!   caching, connection management, and the final network call.
//! - **RFC 7234 caching**: freshness math, conditional revalidation, and a
//!   pluggable `CacheStore`.
//! - **Bounded concurrency**: a `Dispatcher` caps total and per-host
//!   in-flight calls.
//! - **Transparent gzip**: negotiated and undone by the engine, invisible to
//!   callers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reqchain::{Client, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().build()?;
//!
//!     let request = Request::builder().url("https://example.com")?.build()?;
//!     let response = client.new_call(request).execute().await?;
//!
//!     println!("status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## With a Cache and Cookie Jar
//!
//! ```rust,no_run
//! use reqchain::{Client, InMemoryCacheStore, InMemoryCookieJar};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .cache_store(Arc::new(InMemoryCacheStore::new()))
//!         .cookie_jar(Arc::new(InMemoryCookieJar::new()))
//!         .build()?;
//!
//!     let request = reqchain::Request::builder().url("https://example.com")?.build()?;
//!     let _ = client.new_call(request).execute().await?;
//!     Ok(())
//! }
//! ```

mod authenticator;
mod body;
mod cache_control;
mod cache_store;
mod call;
mod chain;
mod client;
mod config;
mod cookie_jar;
mod dispatcher;
mod error;
mod headers;
mod interceptors;
mod request;
mod response;
mod stream_allocation;
mod transport;

pub use authenticator::{Authenticator, BasicAuthenticator, NoAuthenticator};
pub use body::{RequestBody, ResponseBody};
pub use cache_control::CacheControl;
pub use cache_store::{CacheEntry, CacheStore, InMemoryCacheStore};
pub use call::Call;
pub use chain::{Chain, Interceptor};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use cookie_jar::{Cookie, CookieJar, InMemoryCookieJar, NoCookieJar};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use headers::Headers;
pub use interceptors::{
    BridgeInterceptor, CacheInterceptor, CallServerInterceptor, ConnectInterceptor,
    RetryAndFollowUpInterceptor,
};
pub use request::{Request, RequestBuilder, Tag};
pub use response::{Response, ResponseBuilder};
pub use stream_allocation::StreamAllocation;
pub use transport::{ConnectionProtocol, RealConnection, Transport};

// Re-export common wire types callers will need alongside ours.
pub use bytes::Bytes;
pub use http::{HeaderName, HeaderValue, Method, StatusCode, Version};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use reqchain::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Authenticator, Call, CacheControl, CacheStore, Chain, Client, ClientBuilder, ClientConfig,
        ClientConfigBuilder, CookieJar, Error, Headers, InMemoryCacheStore, InMemoryCookieJar,
        Interceptor, Request, RequestBody, RequestBuilder, Response, ResponseBody, Result,
    };
    pub use http::{Method, StatusCode};
}
