// # Bounded LRU-ordered map
//
// A small helper used by the LRU eviction policy to track access order
// without re-deriving it from the access tracker's ring buffer on every
// `select_victims` call.

use std::collections::HashMap;
use std::hash::Hash;

/// Tracks insertion/access order for a fixed set of keys. Unlike a cache,
/// this never evicts on its own; `mark_accessed` just moves a key to the
/// most-recently-used end so `oldest` can return eviction candidates.
pub struct BoundedLru<K: Eq + Hash + Clone> {
    order: Vec<K>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> BoundedLru<K> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Move `key` to the most-recently-used position, inserting it if new.
    pub fn mark_accessed(&mut self, key: K) {
        if let Some(&pos) = self.index.get(&key) {
            self.order.remove(pos);
            self.reindex_from(pos);
        }
        self.index.insert(key.clone(), self.order.len());
        self.order.push(key);
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(pos) = self.index.remove(key) {
            self.order.remove(pos);
            self.reindex_from(pos);
        }
    }

    /// Keys ordered oldest (least recently used) first.
    pub fn oldest(&self, count: usize) -> Vec<K> {
        self.order.iter().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, k) in self.order.iter().enumerate().skip(start) {
            self.index.insert(k.clone(), i);
        }
    }
}

impl<K: Eq + Hash + Clone> Default for BoundedLru<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_returns_least_recently_used() {
        let mut lru: BoundedLru<&str> = BoundedLru::new();
        lru.mark_accessed("a");
        lru.mark_accessed("b");
        lru.mark_accessed("c");
        assert_eq!(lru.oldest(2), vec!["a", "b"]);

        lru.mark_accessed("a");
        assert_eq!(lru.oldest(2), vec!["b", "c"]);
    }

    #[test]
    fn remove_drops_key() {
        let mut lru: BoundedLru<&str> = BoundedLru::new();
        lru.mark_accessed("a");
        lru.mark_accessed("b");
        lru.remove(&"a");
        assert_eq!(lru.oldest(5), vec!["b"]);
    }
}
