//! Expiration Signal Module
//!
//! A cancellable signal attached to each in-process cache entry: one per
//! key, and one per group. An entry stays live only while neither of its
//! signals has fired, so explicit removal and group removal both ride the
//! same mechanism as ttl expiry.
//!
//! Generations are distinguished by `Arc` identity rather than a counter:
//! table cleanup compares pointers before discarding a row, so a stale
//! signal from an evicted generation can never displace a newly created
//! signal under the same key or group name.

use std::sync::atomic::{AtomicBool, Ordering};

// == Expiration Signal ==
/// One-shot cancellation flag.
#[derive(Debug, Default)]
pub struct ExpirationSignal {
    cancelled: AtomicBool,
}

impl ExpirationSignal {
    /// Creates a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
