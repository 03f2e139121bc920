//! querycache - a keyed query-result cache with group invalidation
//!
//! Provides stampede-proof retrieve-or-populate caching with optional group
//! membership, conditional storage, and two interchangeable backing stores:
//! an in-process expiring map and a remote Redis store.

pub mod cache;
pub mod config;
pub mod error;
pub mod store;
pub mod tasks;

pub use cache::{CachePayload, MemoryQueryCache, QueryCache, RedisQueryCache, SingleFlight};
pub use config::RemoteConfig;
pub use error::{CacheError, Result};
pub use store::{CacheStore, MemoryStore, RedisStore};
pub use tasks::spawn_sweep_task;
