//! Remote Store Adapter
//!
//! Redis-backed implementation of the store contract. Redis cannot invoke
//! process-local callbacks on expiry, so group membership lives in two
//! auxiliary key namespaces maintained by atomically-executed Lua scripts:
//!
//! - `k2g:<key>`   → the group a key belongs to
//! - `g2k:<group>` → the set of member keys
//!
//! Index rows are written with the same ttl as their data row, so leaked
//! linkage self-expires in lockstep with the entries it describes. Scripts
//! are hashed once at construction and invoked by content handle
//! (`EVALSHA`) on every call; a multi-round-trip client-side sequence could
//! strand the index mid-crash, the scripts cannot.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use tracing::debug;

use crate::cache::CachePayload;
use crate::config::RemoteConfig;
use crate::error::Result;
use crate::store::CacheStore;

// == Index Namespaces ==
/// Prefix of key→group pointer rows.
const KEY_GROUP_PREFIX: &str = "k2g:";
/// Prefix of group→member-set rows.
const GROUP_KEYS_PREFIX: &str = "g2k:";

// == Scripts ==
/// Write the value, the key→group pointer, and the group membership as one
/// atomic unit, all with matching ttl.
const ADD_GROUPED_SCRIPT: &str = r"
local data_key = KEYS[1]
local owner_key = KEYS[2]
local set_key = KEYS[3]
local value = ARGV[1]
local group = ARGV[2]
local ttl = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('SET', data_key, value, 'EX', ttl)
redis.call('SET', owner_key, group, 'EX', ttl)
redis.call('SADD', set_key, member)
redis.call('EXPIRE', set_key, ttl)

return 'OK'
";

/// Delete the value and its key→group pointer, and update the group
/// membership, dropping the set with its last member.
const REMOVE_KEY_SCRIPT: &str = r"
local data_key = KEYS[1]
local owner_key = KEYS[2]
local set_prefix = ARGV[1]
local member = ARGV[2]

local group = redis.call('GET', owner_key)
redis.call('DEL', data_key, owner_key)

if group then
    local set_key = set_prefix .. group
    redis.call('SREM', set_key, member)
    if redis.call('SCARD', set_key) == 0 then
        redis.call('DEL', set_key)
    end
end

return 'OK'
";

/// Enumerate the group's members, delete each value and pointer row, then
/// delete the membership set itself.
const REMOVE_GROUP_SCRIPT: &str = r"
local set_key = KEYS[1]
local owner_prefix = ARGV[1]

local members = redis.call('SMEMBERS', set_key)
for _, member in ipairs(members) do
    redis.call('DEL', member, owner_prefix .. member)
end
redis.call('DEL', set_key)

return #members
";

/// Count the rows of one index namespace with a cursor scan.
const COUNT_ROWS_SCRIPT: &str = r"
local pattern = ARGV[1]
local cursor = '0'
local count = 0

repeat
    local page = redis.call('SCAN', cursor, 'MATCH', pattern, 'COUNT', 500)
    cursor = page[1]
    count = count + #page[2]
until cursor == '0'

return count
";

// == Redis Store ==
/// Remote store adapter over a multiplexed async connection.
pub struct RedisStore {
    conn: MultiplexedConnection,
    add_grouped: Script,
    remove_key: Script,
    remove_group: Script,
    count_rows: Script,
}

impl RedisStore {
    // == Constructor ==
    /// Connects to the Redis instance described by `config`.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let client = Client::open(config.redis_url().as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!(endpoint = %config.connection_string(), "connected to remote store");

        Ok(Self {
            conn,
            add_grouped: Script::new(ADD_GROUPED_SCRIPT),
            remove_key: Script::new(REMOVE_KEY_SCRIPT),
            remove_group: Script::new(REMOVE_GROUP_SCRIPT),
            count_rows: Script::new(COUNT_ROWS_SCRIPT),
        })
    }

    /// Counts the rows of one index namespace.
    async fn namespace_count(&self, prefix: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = self
            .count_rows
            .arg(format!("{prefix}*"))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn put(
        &self,
        key: &str,
        group: Option<&str>,
        payload: CachePayload,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let wire = payload.to_wire()?;
        let ttl_secs = ttl_seconds(ttl);

        match group {
            Some(group) => {
                let _: () = self
                    .add_grouped
                    .key(key)
                    .key(format!("{KEY_GROUP_PREFIX}{key}"))
                    .key(format!("{GROUP_KEYS_PREFIX}{group}"))
                    .arg(wire)
                    .arg(group)
                    .arg(ttl_secs)
                    .arg(key)
                    .invoke_async(&mut conn)
                    .await?;
            }
            None => {
                let _: () = conn.set_ex(key, wire, ttl_secs).await?;
            }
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<CachePayload>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(key).await?;
        match raw {
            Some(bytes) => Ok(Some(CachePayload::from_wire(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = self
            .remove_key
            .key(key)
            .key(format!("{KEY_GROUP_PREFIX}{key}"))
            .arg(GROUP_KEYS_PREFIX)
            .arg(key)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_group(&self, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed: usize = self
            .remove_group
            .key(format!("{GROUP_KEYS_PREFIX}{group}"))
            .arg(KEY_GROUP_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        debug!(group, removed, "group removed");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn item_count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        // Index rows share the keyspace with data rows and must not be
        // counted as cached items.
        let total: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        let pointers = self.namespace_count(KEY_GROUP_PREFIX).await?;
        let sets = self.namespace_count(GROUP_KEYS_PREFIX).await?;
        Ok(total.saturating_sub(pointers + sets))
    }

    async fn grouped_key_count(&self) -> Result<usize> {
        self.namespace_count(KEY_GROUP_PREFIX).await
    }

    async fn group_count(&self) -> Result<usize> {
        self.namespace_count(GROUP_KEYS_PREFIX).await
    }
}

/// Whole seconds for Redis EX, clamped up so short ttls never round to zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
