//! Expiry Sweep Task
//!
//! Background task that periodically reaps dead entries from the in-process
//! store. Lazy reaping on access already keeps lookups correct; the sweep
//! bounds how long a dead entry's memory and index rows can linger when
//! nobody touches its key. The remote store needs no sweep: Redis expires
//! its own keys and the index rows carry their own ttl.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Spawns a background task that periodically sweeps the store.
///
/// # Arguments
/// * `store` - Shared in-process store to sweep
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
pub fn spawn_sweep_task(store: Arc<MemoryStore>, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {} seconds",
            sweep_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.sweep();

            if removed > 0 {
                info!("Expiry sweep: removed {} dead entries", removed);
            } else {
                debug!("Expiry sweep: no dead entries found");
            }
        }
    })
}
