// Eviction Policy capability (spec section 2, "Eviction Policy"; section
// 4.8). A pluggable trait the State Machine calls into whenever a PUT would
// grow the cache past `max_cache_size`.

pub mod lru;
pub mod ml;

pub use lru::LruPolicy;
pub use ml::MlPolicy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::access::AccessStats;

/// One key's feature row, computed by the State Machine from its
/// `AccessTracker` just before an eviction decision, and handed to whichever
/// `EvictionPolicy` is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFeatures {
    pub key: String,
    #[serde(rename = "access_count")]
    pub total_access_count: u64,
    pub last_access_ms: u64,
    pub access_count_hour: u64,
    pub access_count_day: u64,
    pub avg_interval_ms: u64,
}

impl KeyFeatures {
    pub fn from_stats(key: &str, stats: &AccessStats) -> Self {
        Self {
            key: key.to_string(),
            total_access_count: stats.total_access_count,
            last_access_ms: stats.last_access_ms,
            access_count_hour: stats.access_count_hour,
            access_count_day: stats.access_count_day,
            avg_interval_ms: stats.avg_interval_ms(),
        }
    }
}

/// Capability interface every eviction strategy implements (spec section
/// 4.8). Kept `async_trait` even though `LruPolicy` never awaits, so the ML
/// policy's network call and the LRU baseline are interchangeable behind one
/// `Arc<dyn EvictionPolicy>` the State Machine holds.
#[async_trait]
pub trait EvictionPolicy: Send + Sync {
    /// Choose `count` keys to evict from `candidates`, the full feature set
    /// for every live key. Returning fewer than `count` keys is allowed (e.g.
    /// `candidates.len() < count`); returning keys outside `candidates` is not.
    async fn select_victims(&self, candidates: &[KeyFeatures], count: usize) -> Vec<String>;

    /// Called by the State Machine after `AccessTracker::record_access`, for
    /// policies that want an immediate hook rather than re-reading
    /// `KeyFeatures` on the next eviction (the baseline LRU policy uses this;
    /// the ML policy is stateless and ignores it).
    fn record_access(&self, key: &str);

    /// Called by the State Machine when a key is deleted, so a policy
    /// tracking its own ordering can stop carrying it. No-op by default.
    fn remove(&self, key: &str) {
        let _ = key;
    }

    fn name(&self) -> &'static str;
}
