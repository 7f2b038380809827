//! Admission tokens bounding how many connections are supervised at once.
//!
//! A token is first withdrawn (reserved, e.g. by a listener waiting in
//! `accept`) and then admitted once a connection owns it. Only admitted
//! tokens count as in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-size pool of admission tokens, fully populated at construction.
#[derive(Clone)]
pub struct AdmissionPool {
    permits: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
    capacity: usize,
}

/// One withdrawn unit of capacity. Dropping it returns it to the pool.
///
/// Ownership guarantees each token is returned exactly once, whichever way
/// the holder finishes.
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
    admitted: Arc<AtomicUsize>,
    is_admitted: bool,
}

impl AdmissionToken {
    /// Marks the token as owned by a live connection. Idempotent.
    pub fn admit(&mut self) {
        if !self.is_admitted {
            self.is_admitted = true;
            self.admitted.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.is_admitted
    }
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        if self.is_admitted {
            self.admitted.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl AdmissionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            admitted: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    fn token(&self, permit: OwnedSemaphorePermit) -> AdmissionToken {
        AdmissionToken {
            _permit: permit,
            admitted: Arc::clone(&self.admitted),
            is_admitted: false,
        }
    }

    /// Waits until a token is available.
    ///
    /// Returns `None` only if the pool has been closed.
    pub async fn withdraw(&self) -> Option<AdmissionToken> {
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        Some(self.token(permit))
    }

    pub fn try_withdraw(&self) -> Option<AdmissionToken> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        Some(self.token(permit))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Tokens withdrawn and not yet returned, admitted or merely reserved.
    pub fn withdrawn(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Tokens held by live connections.
    pub fn in_flight(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }

    /// Wakes every pending `withdraw` with `None`; held tokens stay valid.
    pub fn close(&self) {
        self.permits.close();
    }
}
