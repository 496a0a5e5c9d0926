//! Per-call connection pool claim (§4.6).
//!
//! A `StreamAllocation` represents one hop's claim against the connection
//! pool: it is acquired by the Connect interceptor, used by CallServer, and
//! released (or marked no-reuse) once that hop's response has been read. A
//! retried or redirected request acquires a fresh allocation unless it is
//! addressed to the same host and can reuse the existing one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::transport::RealConnection;

/// Shared, cloneable handle to a single hop's connection claim.
#[derive(Clone)]
pub struct StreamAllocation {
    inner: Arc<Inner>,
}

struct Inner {
    connection: RealConnection,
    released: AtomicBool,
    no_new_streams: AtomicBool,
}

impl StreamAllocation {
    pub fn new(connection: RealConnection) -> Self {
        Self {
            inner: Arc::new(Inner {
                connection,
                released: AtomicBool::new(false),
                no_new_streams: AtomicBool::new(false),
            }),
        }
    }

    pub fn connection(&self) -> &RealConnection {
        &self.inner.connection
    }

    /// Release this hop's claim back to the pool. Idempotent.
    pub fn release(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Mark the underlying connection unfit for further reuse (non-1.1
    /// response, explicit `Connection: close`, or a mid-stream I/O error),
    /// so the pool evicts it instead of recycling it for the next request.
    pub fn no_new_streams(&self) {
        self.inner.no_new_streams.store(true, Ordering::SeqCst);
    }

    pub fn can_reuse(&self) -> bool {
        !self.inner.no_new_streams.load(Ordering::SeqCst)
    }

    /// True if `self` and `other` are claims against the same connection
    /// (used by the follow-up policy to decide whether a redirect can keep
    /// its allocation rather than acquiring a new one).
    pub fn shares_connection_with(&self, other: &StreamAllocation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RealConnection;

    #[test]
    fn release_is_idempotent() {
        let alloc = StreamAllocation::new(RealConnection::direct("example.com".into()));
        assert!(!alloc.is_released());
        alloc.release();
        alloc.release();
        assert!(alloc.is_released());
    }

    #[test]
    fn no_new_streams_prevents_reuse() {
        let alloc = StreamAllocation::new(RealConnection::direct("example.com".into()));
        assert!(alloc.can_reuse());
        alloc.no_new_streams();
        assert!(!alloc.can_reuse());
    }

    #[test]
    fn clones_share_connection() {
        let alloc = StreamAllocation::new(RealConnection::direct("example.com".into()));
        let clone = alloc.clone();
        assert!(alloc.shares_connection_with(&clone));
    }
}
