// LRU eviction policy (spec section 4.8): "sort by lastAccessAt ascending,
// return the oldest `count` keys." Grounded on the teacher's
// `common::BoundedHashMap` ordering discipline, via `common::BoundedLru`,
// which is the actual order this policy evicts from rather than a
// recency re-derived from the caller's feature rows on every call.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::common::BoundedLru;
use crate::eviction::{EvictionPolicy, KeyFeatures};

#[derive(Default)]
pub struct LruPolicy {
    order: Mutex<BoundedLru<String>>,
}

impl LruPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvictionPolicy for LruPolicy {
    async fn select_victims(&self, candidates: &[KeyFeatures], count: usize) -> Vec<String> {
        let order = self.order.lock();
        if order.is_empty() {
            // Nothing tracked yet (e.g. right after restoring from a
            // snapshot, before any key has been touched again): fall back
            // to the caller-supplied recency as the best available ordering.
            let mut ranked = candidates.to_vec();
            ranked.sort_by_key(|f| f.last_access_ms);
            return ranked.into_iter().take(count).map(|f| f.key).collect();
        }

        let live: HashSet<&str> = candidates.iter().map(|f| f.key.as_str()).collect();
        order
            .oldest(order.len())
            .into_iter()
            .filter(|key| live.contains(key.as_str()))
            .take(count)
            .collect()
    }

    fn record_access(&self, key: &str) {
        self.order.lock().mark_accessed(key.to_string());
    }

    fn remove(&self, key: &str) {
        self.order.lock().remove(&key.to_string());
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(key: &str, last_access_ms: u64) -> KeyFeatures {
        KeyFeatures {
            key: key.to_string(),
            total_access_count: 1,
            last_access_ms,
            access_count_hour: 1,
            access_count_day: 1,
            avg_interval_ms: 0,
        }
    }

    #[tokio::test]
    async fn select_victims_returns_oldest_first() {
        let policy = LruPolicy::new();
        let candidates = vec![feature("c", 300), feature("a", 100), feature("b", 200)];
        let victims = policy.select_victims(&candidates, 2).await;
        assert_eq!(victims, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn select_victims_caps_at_candidate_count() {
        let policy = LruPolicy::new();
        let candidates = vec![feature("a", 1)];
        let victims = policy.select_victims(&candidates, 5).await;
        assert_eq!(victims, vec!["a".to_string()]);
    }
}
