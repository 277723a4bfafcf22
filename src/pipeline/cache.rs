//! In-memory idempotency cache
//!
//! Two sets of already-processed identifiers, hydrated from the catalog at
//! startup and appended only when a file reaches SUCCESS. A miss is not
//! authoritative: the catalog's uniqueness constraints remain the source of
//! truth, these sets only short-circuit common duplicate re-feeds.

use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct IdempotencyCache {
    hashes: RwLock<HashSet<String>>,
    access_keys: RwLock<HashSet<String>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both sets with the catalog's current contents
    pub fn hydrate(&self, hashes: HashSet<String>, access_keys: HashSet<String>) {
        *self.hashes.write().unwrap() = hashes;
        *self.access_keys.write().unwrap() = access_keys;
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.read().unwrap().contains(hash)
    }

    pub fn contains_access_key(&self, key: &str) -> bool {
        self.access_keys.read().unwrap().contains(key)
    }

    /// Record a successfully archived document
    pub fn insert(&self, hash: &str, access_key: &str) {
        self.hashes.write().unwrap().insert(hash.to_string());
        self.access_keys
            .write()
            .unwrap()
            .insert(access_key.to_string());
    }

    pub fn len(&self) -> usize {
        self.hashes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrate_then_lookup() {
        let cache = IdempotencyCache::new();
        assert!(!cache.contains_hash("h1"));

        cache.hydrate(
            HashSet::from(["h1".to_string()]),
            HashSet::from(["k1".to_string()]),
        );
        assert!(cache.contains_hash("h1"));
        assert!(cache.contains_access_key("k1"));
        assert!(!cache.contains_hash("h2"));
    }

    #[test]
    fn insert_records_both_identifiers() {
        let cache = IdempotencyCache::new();
        cache.insert("h2", "k2");
        assert!(cache.contains_hash("h2"));
        assert!(cache.contains_access_key("k2"));
        assert_eq!(cache.len(), 1);
    }
}
