use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time-expiring cache.
///
/// Entries are invalidated after a fixed TTL. Concurrent recomputation
/// after expiry is allowed: at worst duplicate work is done and the last
/// writer wins, which is safe because recomputation is deterministic for
/// the cached operations.
#[derive(Debug)]
pub(crate) struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().ok()?;
        match entries.get(key) {
            // stale entries stay in place so peek_stale can seed an
            // incremental recomputation
            Some((stored_at, value)) if stored_at.elapsed() <= self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the cached value even when expired. Used for incremental
    /// recomputation that starts from the last known state.
    pub(crate) fn peek_stale(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).map(|(_, value)| value.clone())
    }

    pub(crate) fn insert(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (Instant::now(), value));
        }
    }

    #[cfg(test)]
    pub(crate) fn expire_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            for (stored_at, _) in entries.values_mut() {
                *stored_at = Instant::now() - self.ttl - Duration::from_secs(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entries_are_returned() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), Some(1));
    }

    #[test]
    fn expired_entries_are_hidden_but_peekable() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 1);
        cache.expire_all();
        assert_eq!(cache.peek_stale(&"k"), Some(1));
        assert_eq!(cache.get(&"k"), None);
    }
}
