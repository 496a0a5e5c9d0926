//! `Call`: a one-shot handle for executing a single request (§4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

/// Shared executed/canceled flags and the wakeup `Notify` the transport
/// future selects against, so `cancel()` is a one-way latch observable from
/// any clone of the owning `Call` (§5).
pub struct CallState {
    canceled: AtomicBool,
    notify: Notify,
}

impl CallState {
    pub fn new() -> Self {
        Self {
            canceled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CallState {
    fn default() -> Self {
        Self::new()
    }
}

/// Downgrade a successful result to `Canceled` if cancellation was observed
/// by the time the network finished (§4.8): the caller asked to be told
/// "canceled", not handed a response it no longer wants.
fn report_canceled_if_observed(result: Result<Response>, state: &CallState) -> Result<Response> {
    match result {
        Ok(_response) if state.is_canceled() => Err(Error::Canceled),
        other => other,
    }
}

/// A single request's execution lifecycle: created, executed at most once,
/// then terminal. Not reusable — call `request().new_builder()` and create
/// a fresh `Call` (via `Client::new_call`) to run a modified copy, or
/// `clone()` this one to get an identical, not-yet-executed twin.
pub struct Call {
    client: Client,
    request: Request,
    executed: Arc<AtomicBool>,
    state: Arc<CallState>,
}

impl Call {
    pub(crate) fn new(client: Client, request: Request) -> Self {
        Self {
            client,
            request,
            executed: Arc::new(AtomicBool::new(false)),
            state: Arc::new(CallState::new()),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_executed(&self) -> bool {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    /// Cancel this call. Idempotent; safe to call before, during, or after
    /// execution (a cancel after completion is simply a no-op observation).
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Run the call synchronously to completion.
    pub async fn execute(&self) -> Result<Response> {
        if self.executed.swap(true, Ordering::SeqCst) {
            return Err(Error::illegal_state("call already executed"));
        }
        self.client
            .clone()
            .dispatch_sync(self.request.clone(), self.state.clone())
            .await
    }

    /// Run the call asynchronously via the client's [`Dispatcher`](crate::dispatcher::Dispatcher),
    /// invoking `callback` with the outcome once it completes.
    pub fn enqueue<F>(self: Arc<Self>, callback: F)
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        if self.executed.swap(true, Ordering::SeqCst) {
            callback(Err(Error::illegal_state("call already executed")));
            return;
        }
        let call = self.clone();
        tokio::spawn(async move {
            let result = call
                .client
                .clone()
                .dispatch_async(call.request.clone(), call.state.clone())
                .await;
            callback(report_canceled_if_observed(result, &call.state));
        });
    }

    /// A fresh, not-yet-executed twin of this call for the same request
    /// (§4.8: `clone()` resets the executed flag; it does not copy
    /// cancellation state).
    pub fn clone_fresh(&self) -> Call {
        Call::new(self.client.clone(), self.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::response::Response;

    #[test]
    fn cancel_is_idempotent() {
        let state = CallState::new();
        assert!(!state.is_canceled());
        state.cancel();
        state.cancel();
        assert!(state.is_canceled());
    }

    #[tokio::test]
    async fn canceled_future_resolves_immediately_if_already_canceled() {
        let state = CallState::new();
        state.cancel();
        state.canceled().await;
    }

    fn dummy_response() -> Response {
        let request = Request::builder().url("https://example.com").unwrap().build().unwrap();
        Response::builder(request).build().unwrap()
    }

    #[test]
    fn success_is_reported_as_canceled_if_cancel_raced_in_first() {
        let state = CallState::new();
        state.cancel();
        let result = report_canceled_if_observed(Ok(dummy_response()), &state);
        assert!(matches!(result, Err(Error::Canceled)));
    }

    #[test]
    fn success_passes_through_when_never_canceled() {
        let state = CallState::new();
        let result = report_canceled_if_observed(Ok(dummy_response()), &state);
        assert!(result.is_ok());
    }

    #[test]
    fn failure_passes_through_unchanged_even_if_canceled() {
        let state = CallState::new();
        state.cancel();
        let result = report_canceled_if_observed(Err(Error::illegal_state("boom")), &state);
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }
}
