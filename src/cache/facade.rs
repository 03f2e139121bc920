//! Cache Façade Module
//!
//! The public operation set, identical over both store adapters: add,
//! contains, retrieve-or-populate (typed and untyped, with synchronous or
//! asynchronous retrievers), remove, remove-group, clear, and the
//! observable counts.
//!
//! Population is stampede-proof: concurrent misses on one key serialize on
//! a single-flight permit, re-check the store after acquiring it, and only
//! the winner runs the retriever. A conditional-store predicate decides once
//! per population whether the computed value is persisted; the value is
//! returned to the caller either way.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::flight::SingleFlight;
use crate::cache::value::CachePayload;
use crate::cache::MAX_KEY_LENGTH;
use crate::config::RemoteConfig;
use crate::error::{CacheError, Result};
use crate::store::{CacheStore, MemoryStore, RedisStore};

// == Query Cache ==
/// Keyed cache with optional group membership and single-flight population.
#[derive(Debug)]
pub struct QueryCache<S> {
    store: S,
    flight: SingleFlight,
}

/// Cache backed by the in-process store.
pub type MemoryQueryCache = QueryCache<MemoryStore>;

/// Cache backed by the remote store.
pub type RedisQueryCache = QueryCache<RedisStore>;

impl MemoryQueryCache {
    /// Creates a cache over a fresh in-process store.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl RedisQueryCache {
    /// Creates a cache over the remote store described by `config`.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        Ok(Self::new(RedisStore::connect(config).await?))
    }
}

impl<S: CacheStore> QueryCache<S> {
    // == Constructor ==
    /// Wraps a store adapter.
    pub fn new(store: S) -> Self {
        Self {
            store,
            flight: SingleFlight::new(),
        }
    }

    /// The underlying store adapter.
    pub fn store(&self) -> &S {
        &self.store
    }

    // == Add ==
    /// Stores `item` under `key` for `ttl`, registering the key↔group
    /// association when `group` is present.
    pub async fn add<T>(&self, key: &str, group: Option<&str>, item: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + 'static,
    {
        validate_key(key)?;
        let payload = CachePayload::encode(item)?;
        self.store.put(key, group, payload, ttl).await
    }

    // == Contains ==
    /// Whether a live entry exists for `key`. Pure lookup; a store failure
    /// degrades to `false` rather than surfacing from a boolean probe.
    pub async fn contains(&self, key: &str) -> bool {
        match self.store.contains(key).await {
            Ok(present) => present,
            Err(error) => {
                warn!(key, %error, "contains check failed, reporting absent");
                false
            }
        }
    }

    // == Get (typed, synchronous retriever) ==
    /// Returns the cached value for `key`, or computes it with `retriever`,
    /// stores it if `should_cache` approves, and returns it.
    ///
    /// The retriever runs at most once per logical miss, regardless of how
    /// many callers race on the key. A retriever failure propagates
    /// unchanged and nothing is stored.
    pub async fn get_with<T, F, P>(
        &self,
        key: &str,
        group: Option<&str>,
        retriever: F,
        should_cache: P,
        ttl: Duration,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce() -> anyhow::Result<T>,
        P: FnOnce(&T) -> bool,
    {
        self.get_with_async(key, group, || std::future::ready(retriever()), should_cache, ttl)
            .await
    }

    // == Get (typed, asynchronous retriever) ==
    /// Same contract as [`QueryCache::get_with`] with an awaitable retriever.
    pub async fn get_with_async<T, F, Fut, P>(
        &self,
        key: &str,
        group: Option<&str>,
        retriever: F,
        should_cache: P,
        ttl: Duration,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        P: FnOnce(&T) -> bool,
    {
        validate_key(key)?;

        if let Some(hit) = self.typed_hit::<T>(key).await? {
            return Ok(hit);
        }

        let _permit = self.flight.acquire(key).await;

        // A concurrent populator may have finished between the miss check
        // and permit acquisition. Skipping this re-check would run the
        // retriever twice.
        if let Some(hit) = self.typed_hit::<T>(key).await? {
            return Ok(hit);
        }

        let value = retriever().await.map_err(CacheError::Retrieval)?;

        if should_cache(&value) {
            if let Err(error) = self.persist(key, group, &value, ttl).await {
                warn!(key, %error, "failed to store computed value, returning it uncached");
            }
        } else {
            debug!(key, "computed value rejected by store predicate");
        }
        Ok(value)
    }

    // == Get (untyped, synchronous retriever) ==
    /// Untyped variant of [`QueryCache::get_with`]: the value travels as
    /// [`serde_json::Value`] under an explicit `type_tag`. A stored entry
    /// whose tag differs is treated as a miss, not an error.
    pub async fn get_value<F, P>(
        &self,
        key: &str,
        group: Option<&str>,
        type_tag: &str,
        retriever: F,
        should_cache: P,
        ttl: Duration,
    ) -> Result<serde_json::Value>
    where
        F: FnOnce() -> anyhow::Result<serde_json::Value>,
        P: FnOnce(&serde_json::Value) -> bool,
    {
        self.get_value_async(
            key,
            group,
            type_tag,
            || std::future::ready(retriever()),
            should_cache,
            ttl,
        )
        .await
    }

    // == Get (untyped, asynchronous retriever) ==
    /// Same contract as [`QueryCache::get_value`] with an awaitable retriever.
    pub async fn get_value_async<F, Fut, P>(
        &self,
        key: &str,
        group: Option<&str>,
        type_tag: &str,
        retriever: F,
        should_cache: P,
        ttl: Duration,
    ) -> Result<serde_json::Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<serde_json::Value>>,
        P: FnOnce(&serde_json::Value) -> bool,
    {
        validate_key(key)?;

        if let Some(hit) = self.untyped_hit(key, type_tag).await? {
            return Ok(hit);
        }

        let _permit = self.flight.acquire(key).await;

        if let Some(hit) = self.untyped_hit(key, type_tag).await? {
            return Ok(hit);
        }

        let value = retriever().await.map_err(CacheError::Retrieval)?;

        if should_cache(&value) {
            let stored = CachePayload::encode_value(type_tag, &value);
            let outcome = match stored {
                Ok(payload) => self.store.put(key, group, payload, ttl).await,
                Err(error) => Err(error),
            };
            if let Err(error) = outcome {
                warn!(key, %error, "failed to store computed value, returning it uncached");
            }
        } else {
            debug!(key, "computed value rejected by store predicate");
        }
        Ok(value)
    }

    // == Remove ==
    /// Removes the entry and its group association. Idempotent.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }

    // == Remove Group ==
    /// Removes every entry associated with `group`, and the group itself.
    /// Idempotent.
    pub async fn remove_group(&self, group: &str) -> Result<()> {
        self.store.remove_group(group).await
    }

    // == Clear ==
    /// Removes all entries and all index state.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    // == Counts ==
    /// Number of live cache entries.
    pub async fn item_count(&self) -> Result<usize> {
        self.store.item_count().await
    }

    /// Number of live entries that belong to a group.
    pub async fn grouped_key_count(&self) -> Result<usize> {
        self.store.grouped_key_count().await
    }

    /// Number of distinct groups with at least one live entry.
    pub async fn group_count(&self) -> Result<usize> {
        self.store.group_count().await
    }

    // == Internals ==
    /// Fetches and decodes a typed hit; a tag mismatch reads as a miss.
    async fn typed_hit<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + 'static,
    {
        match self.store.fetch(key).await? {
            Some(payload) => payload.decode::<T>(),
            None => Ok(None),
        }
    }

    /// Fetches and decodes an untyped hit under an explicit tag.
    async fn untyped_hit(&self, key: &str, type_tag: &str) -> Result<Option<serde_json::Value>> {
        match self.store.fetch(key).await? {
            Some(payload) => payload.decode_value(type_tag),
            None => Ok(None),
        }
    }

    /// Encodes and stores a freshly computed value.
    async fn persist<T>(&self, key: &str, group: Option<&str>, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + 'static,
    {
        let payload = CachePayload::encode(value)?;
        self.store.put(key, group, payload, ttl).await
    }
}

/// Rejects keys the backing stores cannot represent sanely.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
