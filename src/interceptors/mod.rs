//! The five built-in pipeline stages (§4.3–§4.7), assembled by `Client` in
//! fixed order around the two user-extensible interceptor slots.

mod bridge;
mod call_server;
mod cache;
mod connect;
mod retry_and_follow_up;

pub use bridge::BridgeInterceptor;
pub use call_server::CallServerInterceptor;
pub use cache::CacheInterceptor;
pub use connect::ConnectInterceptor;
pub use retry_and_follow_up::RetryAndFollowUpInterceptor;
