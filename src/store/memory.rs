//! In-Process Store Adapter
//!
//! An expiring map with group-aware eviction. Every entry carries an
//! absolute deadline plus cancellation signals for its key and (when
//! grouped) its group; the entry is live only while the deadline has not
//! passed and neither signal has fired. Dead entries are reaped lazily on
//! access and in bulk by [`MemoryStore::sweep`]; either way the same
//! eviction path runs exactly once per entry and keeps the group index and
//! signal tables consistent.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::cache::CachePayload;
use crate::error::Result;
use crate::store::{CacheStore, ExpirationSignal, GroupIndex};

// == Memory Entry ==
/// One stored entry: the payload, its deadline, and the signals that can
/// expire it early.
#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: CachePayload,
    /// Absolute expiry, Unix milliseconds
    expires_at: u64,
    group: Option<String>,
    key_signal: Arc<ExpirationSignal>,
    group_signal: Option<Arc<ExpirationSignal>>,
}

impl MemoryEntry {
    /// Live while the ttl has not elapsed and no attached signal has fired.
    /// Whichever fires first wins.
    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
            && !self.key_signal.is_cancelled()
            && !self
                .group_signal
                .as_ref()
                .is_some_and(|signal| signal.is_cancelled())
    }
}

// == Memory Store ==
/// In-process store adapter.
///
/// The store owns the signal tables; the index owns key↔group
/// relationships. Eviction of the last member of a group drops the group's
/// index row and its signal row together.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    index: GroupIndex,
    key_signals: DashMap<String, Arc<ExpirationSignal>>,
    group_signals: DashMap<String, Arc<ExpirationSignal>>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Stores `payload` under `key` with an absolute deadline of now + `ttl`.
    ///
    /// Overwriting runs the replaced entry's eviction first, then installs
    /// a fresh key signal; a previously cancelled group signal is replaced
    /// by a new generation rather than reused.
    pub fn insert(&self, key: &str, group: Option<&str>, payload: CachePayload, ttl: Duration) {
        if let Some((old_key, old_entry)) = self.entries.remove(key) {
            old_entry.key_signal.cancel();
            self.on_evicted(&old_key, &old_entry);
        }

        let key_signal = Arc::new(ExpirationSignal::new());
        self.key_signals
            .insert(key.to_string(), Arc::clone(&key_signal));

        let group_signal = group.map(|group| {
            self.index.insert(key, group);
            let slot = self
                .group_signals
                .entry(group.to_string())
                .and_modify(|signal| {
                    if signal.is_cancelled() {
                        *signal = Arc::new(ExpirationSignal::new());
                    }
                })
                .or_insert_with(|| Arc::new(ExpirationSignal::new()));
            Arc::clone(slot.value())
        });

        let entry = MemoryEntry {
            payload,
            expires_at: current_timestamp_ms() + ttl.as_millis() as u64,
            group: group.map(str::to_string),
            key_signal,
            group_signal,
        };
        self.entries.insert(key.to_string(), entry);
        trace!(key, ?group, "stored entry");
    }

    // == Lookup ==
    /// Returns the live payload for `key`, reaping it first if dead.
    pub fn lookup(&self, key: &str) -> Option<CachePayload> {
        let now = current_timestamp_ms();
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now) {
                return Some(entry.payload.clone());
            }
        }
        // Dead entry. Whoever wins the removal runs the eviction path.
        if let Some((key, entry)) = self.entries.remove_if(key, |_, entry| !entry.is_live(now)) {
            self.on_evicted(&key, &entry);
        }
        None
    }

    // == Contains ==
    /// Pure liveness check, no side effects.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = current_timestamp_ms();
        self.entries
            .get(key)
            .map(|entry| entry.is_live(now))
            .unwrap_or(false)
    }

    // == Evict ==
    /// Forces the entry out ahead of its ttl by firing its key signal.
    /// Idempotent for absent keys.
    pub fn evict(&self, key: &str) {
        if let Some((key, entry)) = self.entries.remove(key) {
            entry.key_signal.cancel();
            self.on_evicted(&key, &entry);
        }
    }

    // == Evict Group ==
    /// Fires the group's signal and cascades per-key eviction through every
    /// member. No group-wide lock: each member is reaped individually and
    /// the eviction path's idempotency absorbs interleaved adds/removes.
    pub fn evict_group(&self, group: &str) {
        if let Some(signal) = self.group_signals.get(group).map(|s| Arc::clone(&s)) {
            signal.cancel();
        }

        let members = self.index.members(group);
        let member_count = members.len();
        for key in members {
            if let Some((key, entry)) = self
                .entries
                .remove_if(&key, |_, entry| entry.group.as_deref() == Some(group))
            {
                entry.key_signal.cancel();
                self.on_evicted(&key, &entry);
            }
        }

        // Normally the last member's eviction already dropped these rows;
        // this covers a group whose entries all expired beforehand.
        self.group_signals
            .remove_if(group, |_, signal| signal.is_cancelled());
        self.index.remove_group(group);

        debug!(group, member_count, "group evicted");
    }

    // == Clear ==
    /// Drops every entry, signal, and index row.
    pub fn clear_all(&self) {
        for entry in self.entries.iter() {
            entry.value().key_signal.cancel();
        }
        self.entries.clear();
        self.index.clear();
        self.key_signals.clear();
        self.group_signals.clear();
    }

    // == Sweep ==
    /// Reaps all dead entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = current_timestamp_ms();
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in dead {
            if let Some((key, entry)) =
                self.entries.remove_if(&key, |_, entry| !entry.is_live(now))
            {
                self.on_evicted(&key, &entry);
                removed += 1;
            }
        }
        removed
    }

    // == Counts ==
    /// Number of live entries.
    pub fn live_count(&self) -> usize {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    /// Size of the key→group index.
    pub fn grouped_key_count(&self) -> usize {
        self.index.key_count()
    }

    /// Size of the group→keys index.
    pub fn group_count(&self) -> usize {
        self.index.group_count()
    }

    // == Eviction Path ==
    /// Runs once per removed entry, for every removal cause: ttl expiry,
    /// explicit eviction, group cancellation, replacement, clear.
    ///
    /// Signal rows are only dropped when they still belong to this entry's
    /// generation (`Arc` identity), so a late eviction cannot disturb a
    /// newer entry under the same key or a newer group under the same name.
    fn on_evicted(&self, key: &str, entry: &MemoryEntry) {
        self.key_signals
            .remove_if(key, |_, signal| Arc::ptr_eq(signal, &entry.key_signal));

        if let Some(group) = entry.group.as_deref() {
            let emptied = self
                .index
                .remove_key(key)
                .is_some_and(|removal| removal.group_emptied);
            if emptied {
                if let Some(group_signal) = &entry.group_signal {
                    self.group_signals
                        .remove_if(group, |_, signal| Arc::ptr_eq(signal, group_signal));
                }
            }
        }
        trace!(key, "entry evicted");
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        group: Option<&str>,
        payload: CachePayload,
        ttl: Duration,
    ) -> Result<()> {
        self.insert(key, group, payload, ttl);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<CachePayload>> {
        Ok(self.lookup(key))
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.contains_key(key))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.evict(key);
        Ok(())
    }

    async fn remove_group(&self, group: &str) -> Result<()> {
        self.evict_group(group);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clear_all();
        Ok(())
    }

    async fn item_count(&self) -> Result<usize> {
        Ok(self.live_count())
    }

    async fn grouped_key_count(&self) -> Result<usize> {
        Ok(self.grouped_key_count())
    }

    async fn group_count(&self) -> Result<usize> {
        Ok(self.group_count())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn payload(text: &str) -> CachePayload {
        CachePayload::encode(&text.to_string()).unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryStore::new();

        store.insert("k1", None, payload("v1"), TTL);

        let found = store.lookup("k1").unwrap();
        assert_eq!(found.decode::<String>().unwrap(), Some("v1".to_string()));
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.grouped_key_count(), 0);
    }

    #[test]
    fn test_grouped_insert_updates_indices() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), TTL);
        store.insert("k2", Some("g1"), payload("v2"), TTL);
        store.insert("k3", Some("g2"), payload("v3"), TTL);

        assert_eq!(store.live_count(), 3);
        assert_eq!(store.grouped_key_count(), 3);
        assert_eq!(store.group_count(), 2);
    }

    #[test]
    fn test_evict_removes_entry_and_association() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), TTL);
        store.evict("k1");

        assert!(store.lookup("k1").is_none());
        assert_eq!(store.live_count(), 0);
        assert_eq!(store.grouped_key_count(), 0);
        assert_eq!(store.group_count(), 0, "empty group row should be gone");
    }

    #[test]
    fn test_evict_keeps_group_with_remaining_member() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), TTL);
        store.insert("k2", Some("g1"), payload("v2"), TTL);
        store.evict("k1");

        assert_eq!(store.group_count(), 1);
        assert_eq!(store.grouped_key_count(), 1);
    }

    #[test]
    fn test_evict_absent_key_is_noop() {
        let store = MemoryStore::new();
        store.evict("missing");
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_evict_group_cascades() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), TTL);
        store.insert("k2", Some("g1"), payload("v2"), TTL);
        store.insert("solo", None, payload("v3"), TTL);

        store.evict_group("g1");

        assert!(store.lookup("k1").is_none());
        assert!(store.lookup("k2").is_none());
        assert!(store.lookup("solo").is_some());
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.group_count(), 0);
    }

    #[test]
    fn test_evict_absent_group_is_noop() {
        let store = MemoryStore::new();
        store.insert("k1", None, payload("v1"), TTL);

        store.evict_group("missing");

        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_overwrite_replaces_group_association() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), TTL);
        store.insert("k1", Some("g2"), payload("v2"), TTL);

        assert_eq!(store.live_count(), 1);
        assert_eq!(store.grouped_key_count(), 1);
        assert_eq!(store.group_count(), 1);

        store.evict_group("g1");
        assert!(store.lookup("k1").is_some(), "k1 moved to g2");

        store.evict_group("g2");
        assert!(store.lookup("k1").is_none());
    }

    #[test]
    fn test_ttl_expiry_reaps_on_lookup() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), Duration::from_millis(50));
        assert!(store.contains_key("k1"));

        sleep(Duration::from_millis(80));

        assert!(!store.contains_key("k1"));
        assert!(store.lookup("k1").is_none());
        // Lookup reaped the entry, which heals the index.
        assert_eq!(store.grouped_key_count(), 0);
        assert_eq!(store.group_count(), 0);
    }

    #[test]
    fn test_sweep_reaps_expired_entries() {
        let store = MemoryStore::new();

        store.insert("gone", Some("g1"), payload("v1"), Duration::from_millis(50));
        store.insert("kept", Some("g1"), payload("v2"), TTL);

        sleep(Duration::from_millis(80));

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.grouped_key_count(), 1);
        assert_eq!(store.group_count(), 1);
    }

    #[test]
    fn test_regrouped_name_survives_old_generation() {
        let store = MemoryStore::new();

        // First generation of "g" dies entirely.
        store.insert("old", Some("g"), payload("v1"), TTL);
        store.evict_group("g");

        // A new generation under the same group name must be unaffected.
        store.insert("new", Some("g"), payload("v2"), TTL);

        assert!(store.contains_key("new"));
        assert_eq!(store.group_count(), 1);

        store.evict_group("g");
        assert!(!store.contains_key("new"));
    }

    #[test]
    fn test_clear_all() {
        let store = MemoryStore::new();

        store.insert("k1", Some("g1"), payload("v1"), TTL);
        store.insert("k2", None, payload("v2"), TTL);

        store.clear_all();

        assert_eq!(store.live_count(), 0);
        assert_eq!(store.grouped_key_count(), 0);
        assert_eq!(store.group_count(), 0);
        assert!(store.lookup("k1").is_none());
    }
}
