//! Group Index Module
//!
//! In-process bookkeeping for key↔group associations: a key→group map and
//! the reverse group→member-set map used for cascading group removal.
//!
//! A group row lives only while it has members: the last member removed
//! takes the row with it, so the group count always equals the number of
//! distinct groups with at least one live entry. All operations are
//! idempotent and touch nothing beyond the rows they name.

use std::collections::HashSet;

use dashmap::DashMap;

// == Key Removal Outcome ==
/// Result of unlinking a key from its group.
#[derive(Debug)]
pub struct KeyRemoval {
    /// The group the key belonged to
    pub group: String,
    /// True when the key was the group's last member and the row was dropped
    pub group_emptied: bool,
}

// == Group Index ==
/// Concurrent key↔group index. Mutated on every add, remove, and eviction,
/// so locking stays per-shard rather than index-wide.
#[derive(Debug, Default)]
pub struct GroupIndex {
    key_to_group: DashMap<String, String>,
    group_to_keys: DashMap<String, HashSet<String>>,
}

impl GroupIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Associates `key` with `group` (union insert; re-adding is a no-op).
    ///
    /// A key re-added under a different group moves: the old membership is
    /// discarded before the new one is recorded.
    pub fn insert(&self, key: &str, group: &str) {
        if let Some(previous) = self.key_to_group.insert(key.to_string(), group.to_string()) {
            if previous != group {
                self.discard_member(&previous, key);
            }
        }
        self.group_to_keys
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string());
    }

    // == Remove Key ==
    /// Unlinks `key` from whatever group it belongs to.
    ///
    /// Returns `None` when the key has no group association.
    pub fn remove_key(&self, key: &str) -> Option<KeyRemoval> {
        let (_, group) = self.key_to_group.remove(key)?;
        let group_emptied = self.discard_member(&group, key);
        Some(KeyRemoval {
            group,
            group_emptied,
        })
    }

    // == Members ==
    /// Returns a snapshot of the group's member keys.
    pub fn members(&self, group: &str) -> Vec<String> {
        self.group_to_keys
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    // == Remove Group ==
    /// Drops the group row and every member's key→group link.
    ///
    /// Returns the keys that were members. Empty for an unknown group.
    pub fn remove_group(&self, group: &str) -> Vec<String> {
        let Some((_, members)) = self.group_to_keys.remove(group) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(members.len());
        for key in members {
            self.key_to_group.remove_if(&key, |_, owner| owner == group);
            removed.push(key);
        }
        removed
    }

    // == Clear ==
    /// Drops all associations.
    pub fn clear(&self) {
        self.key_to_group.clear();
        self.group_to_keys.clear();
    }

    /// Number of keys currently associated with a group.
    pub fn key_count(&self) -> usize {
        self.key_to_group.len()
    }

    /// Number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        self.group_to_keys.len()
    }

    /// Removes `key` from `group`'s member set; drops the row if it emptied.
    fn discard_member(&self, group: &str, key: &str) -> bool {
        let emptied = match self.group_to_keys.get_mut(group) {
            Some(mut members) => {
                members.remove(key);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.group_to_keys
                .remove_if(group, |_, members| members.is_empty());
        }
        emptied
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_counts() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");
        index.insert("k2", "g1");
        index.insert("k3", "g2");

        assert_eq!(index.key_count(), 3);
        assert_eq!(index.group_count(), 2);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");
        index.insert("k1", "g1");

        assert_eq!(index.key_count(), 1);
        assert_eq!(index.members("g1"), vec!["k1".to_string()]);
    }

    #[test]
    fn test_reinsert_moves_key_between_groups() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");
        index.insert("k1", "g2");

        assert_eq!(index.key_count(), 1);
        assert_eq!(index.group_count(), 1, "old group row should be gone");
        assert!(index.members("g1").is_empty());
        assert_eq!(index.members("g2"), vec!["k1".to_string()]);
    }

    #[test]
    fn test_remove_key_keeps_populated_group() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");
        index.insert("k2", "g1");

        let removal = index.remove_key("k1").unwrap();
        assert_eq!(removal.group, "g1");
        assert!(!removal.group_emptied);
        assert_eq!(index.group_count(), 1);
    }

    #[test]
    fn test_remove_last_key_drops_group_row() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");

        let removal = index.remove_key("k1").unwrap();
        assert!(removal.group_emptied);
        assert_eq!(index.group_count(), 0);
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn test_remove_key_without_group_is_none() {
        let index = GroupIndex::new();
        assert!(index.remove_key("absent").is_none());
    }

    #[test]
    fn test_remove_group_unlinks_all_members() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");
        index.insert("k2", "g1");
        index.insert("k3", "g2");

        let mut removed = index.remove_group("g1");
        removed.sort();

        assert_eq!(removed, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(index.key_count(), 1);
        assert_eq!(index.group_count(), 1);
    }

    #[test]
    fn test_remove_absent_group_is_empty() {
        let index = GroupIndex::new();
        assert!(index.remove_group("nope").is_empty());
    }

    #[test]
    fn test_clear() {
        let index = GroupIndex::new();

        index.insert("k1", "g1");
        index.insert("k2", "g2");
        index.clear();

        assert_eq!(index.key_count(), 0);
        assert_eq!(index.group_count(), 0);
    }
}
