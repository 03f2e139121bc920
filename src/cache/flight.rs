//! Single-Flight Module
//!
//! Per-key mutual exclusion for cache population. When several callers miss
//! on the same key at once, exactly one runs the retriever; the rest wait on
//! the same ticket and then observe the winner's stored value. Tickets are
//! reference counted and leave the table with their last holder, so the
//! table stays bounded under unbounded key churn.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

// == Ticket ==
/// One in-flight population lock, shared by every concurrent caller of a key.
#[derive(Debug)]
struct Ticket {
    lock: Arc<Mutex<()>>,
    holders: AtomicUsize,
}

impl Ticket {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            holders: AtomicUsize::new(0),
        }
    }
}

// == Single Flight Coordinator ==
/// Table of per-key population tickets.
///
/// Distinct keys share nothing but a map shard; populations for different
/// keys proceed fully in parallel.
#[derive(Debug, Default)]
pub struct SingleFlight {
    tickets: DashMap<String, Arc<Ticket>>,
}

impl SingleFlight {
    // == Constructor ==
    /// Creates a coordinator with no in-flight keys.
    pub fn new() -> Self {
        Self {
            tickets: DashMap::new(),
        }
    }

    // == Acquire ==
    /// Acquires the population lock for `key`, waiting if another caller
    /// holds it.
    ///
    /// The holder count is bumped while the map shard is locked, so a
    /// concurrent release can never observe a stale zero and drop a ticket
    /// a new waiter just joined. The hold is registered before awaiting the
    /// lock; a caller cancelled mid-wait still releases it.
    pub async fn acquire(&self, key: &str) -> FlightPermit<'_> {
        let ticket = {
            let entry = self
                .tickets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Ticket::new()));
            let ticket = Arc::clone(entry.value());
            ticket.holders.fetch_add(1, Ordering::AcqRel);
            ticket
        };

        let holder = HolderGuard {
            coordinator: self,
            key: key.to_string(),
            ticket: Arc::clone(&ticket),
        };
        let guard = Arc::clone(&ticket.lock).lock_owned().await;

        FlightPermit {
            _guard: guard,
            _holder: holder,
        }
    }

    // == In Flight ==
    /// Returns the number of keys with a live ticket.
    pub fn in_flight(&self) -> usize {
        self.tickets.len()
    }
}

// == Holder Guard ==
/// Registered hold on a ticket. Dropping it retires the ticket once no
/// other caller holds or awaits it.
#[derive(Debug)]
struct HolderGuard<'a> {
    coordinator: &'a SingleFlight,
    key: String,
    ticket: Arc<Ticket>,
}

impl Drop for HolderGuard<'_> {
    fn drop(&mut self) {
        if self.ticket.holders.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last holder retires the ticket. The identity check keeps a
            // freshly inserted ticket for the same key from being removed.
            self.coordinator.tickets.remove_if(&self.key, |_, current| {
                Arc::ptr_eq(current, &self.ticket)
                    && current.holders.load(Ordering::Acquire) == 0
            });
        }
    }
}

// == Flight Permit ==
/// Exclusive population right for one key, released on drop.
///
/// Field order matters: the mutex guard is dropped first so the next waiter
/// can proceed, then the hold is released and the ticket retired if idle.
#[derive(Debug)]
pub struct FlightPermit<'a> {
    _guard: OwnedMutexGuard<()>,
    _holder: HolderGuard<'a>,
}
