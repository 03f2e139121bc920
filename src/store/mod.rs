//! Store Adapter Module
//!
//! The backing-store contract and its two implementations. Both adapters
//! expose identical observable semantics; only the mechanism differs. The
//! in-process store rides expiration signals and an in-process group index,
//! the remote store rides atomically-executed scripts over an index
//! key-space, because Redis cannot call back into the process on expiry.

mod index;
mod memory;
mod remote;
mod signal;

pub use index::{GroupIndex, KeyRemoval};
pub use memory::MemoryStore;
pub use remote::RedisStore;
pub use signal::ExpirationSignal;

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CachePayload;
use crate::error::Result;

// == Cache Store Contract ==
/// Operation set every backing store implements.
///
/// Keys are plain strings; values are opaque [`CachePayload`] envelopes.
/// Removal operations are idempotent: naming an absent key or group
/// succeeds with no state change.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `payload` under `key` for `ttl`, registering the group
    /// association when `group` is present.
    async fn put(
        &self,
        key: &str,
        group: Option<&str>,
        payload: CachePayload,
        ttl: Duration,
    ) -> Result<()>;

    /// Returns the live payload for `key`, if any.
    async fn fetch(&self, key: &str) -> Result<Option<CachePayload>>;

    /// Returns whether a live entry exists for `key`.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Removes the entry for `key` and its group association.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes every entry associated with `group`, and the group itself.
    async fn remove_group(&self, group: &str) -> Result<()>;

    /// Removes all entries and all index state.
    async fn clear(&self) -> Result<()>;

    /// Number of live cache entries (index rows excluded).
    async fn item_count(&self) -> Result<usize>;

    /// Number of live entries that belong to a group.
    async fn grouped_key_count(&self) -> Result<usize>;

    /// Number of distinct groups with at least one live entry.
    async fn group_count(&self) -> Result<usize>;
}
