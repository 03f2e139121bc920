//! Integration Tests for the Remote Store
//!
//! These run against a live Redis instance and are ignored by default:
//!
//! ```text
//! CACHE_REDIS_HOST=127.0.0.1 cargo test --test remote_store_tests -- --ignored
//! ```
//!
//! Each test flushes the database it connects to; point the environment at
//! a disposable instance.

use std::time::Duration;

use querycache::{CacheStore, RedisQueryCache, RedisStore, RemoteConfig};

const TTL: Duration = Duration::from_secs(60);

async fn fresh_store() -> RedisStore {
    let store = RedisStore::connect(&RemoteConfig::from_env())
        .await
        .expect("redis must be reachable for ignored tests");
    store.clear().await.unwrap();
    store
}

fn payload(text: &str) -> querycache::CachePayload {
    querycache::CachePayload::encode(&text.to_string()).unwrap()
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_grouped_put_writes_index_rows() {
    let store = fresh_store().await;

    store.put("k1", Some("g1"), payload("v1"), TTL).await.unwrap();
    store.put("k2", Some("g1"), payload("v2"), TTL).await.unwrap();
    store.put("solo", None, payload("v3"), TTL).await.unwrap();

    assert_eq!(store.item_count().await.unwrap(), 3);
    assert_eq!(store.grouped_key_count().await.unwrap(), 2);
    assert_eq!(store.group_count().await.unwrap(), 1);
    assert!(store.contains("k1").await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_remove_updates_membership() {
    let store = fresh_store().await;

    store.put("k1", Some("g1"), payload("v1"), TTL).await.unwrap();
    store.put("k2", Some("g1"), payload("v2"), TTL).await.unwrap();

    store.remove("k1").await.unwrap();
    assert_eq!(store.item_count().await.unwrap(), 1);
    assert_eq!(store.group_count().await.unwrap(), 1, "one member remains");

    store.remove("k2").await.unwrap();
    assert_eq!(store.group_count().await.unwrap(), 0, "empty set deleted");

    // Idempotent on an absent key.
    store.remove("k2").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_remove_group_cascades() {
    let store = fresh_store().await;

    for i in 0..4 {
        let key = format!("member_{i}");
        store.put(&key, Some("doomed"), payload("v"), TTL).await.unwrap();
    }
    store.put("bystander", None, payload("v"), TTL).await.unwrap();

    store.remove_group("doomed").await.unwrap();

    assert_eq!(store.item_count().await.unwrap(), 1);
    assert!(store.contains("bystander").await.unwrap());
    assert!(!store.contains("member_0").await.unwrap());
    assert_eq!(store.grouped_key_count().await.unwrap(), 0);
    assert_eq!(store.group_count().await.unwrap(), 0);

    // Idempotent on an absent group.
    store.remove_group("doomed").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_fetch_roundtrip_and_clear() {
    let store = fresh_store().await;

    store.put("k1", Some("g1"), payload("v1"), TTL).await.unwrap();

    let found = store.fetch("k1").await.unwrap().unwrap();
    assert_eq!(found.decode::<String>().unwrap(), Some("v1".to_string()));
    assert!(store.fetch("missing").await.unwrap().is_none());

    store.clear().await.unwrap();
    assert_eq!(store.item_count().await.unwrap(), 0);
    assert_eq!(store.group_count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_facade_over_remote_store() {
    let cache = RedisQueryCache::connect(&RemoteConfig::from_env())
        .await
        .expect("redis must be reachable for ignored tests");
    cache.clear().await.unwrap();

    let value = cache
        .get_with("answer", Some("g1"), || Ok(42u32), |_| true, TTL)
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert!(cache.contains("answer").await);

    let cached = cache
        .get_with::<u32, _, _>(
            "answer",
            Some("g1"),
            || panic!("hit must not repopulate"),
            |_| true,
            TTL,
        )
        .await
        .unwrap();
    assert_eq!(cached, 42);

    cache.remove_group("g1").await.unwrap();
    assert!(!cache.contains("answer").await);
}
