// Access Tracker (spec section 2, "Access Tracker"; section 4.8).
//
// Per key, keeps a bounded ring of the last `ACCESS_RING_CAPACITY` access
// timestamps plus decayed hour/day counters that a scheduled worker
// refreshes without touching the ring itself. Grounded on the teacher's
// `common::BoundedHashMap` for the bounded-collection discipline, generalized
// here to a ring rather than an LRU map since the tracker's job is counting,
// not eviction ordering (that lives in `eviction`).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::common::ACCESS_RING_CAPACITY;

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Per-key access history: a bounded ring of raw timestamps plus counters
/// that a decay pass keeps in sync with the ring's current contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessStats {
    ring: VecDeque<u64>,
    pub total_access_count: u64,
    pub last_access_ms: u64,
    pub access_count_hour: u64,
    pub access_count_day: u64,
}

impl Default for AccessStats {
    fn default() -> Self {
        Self {
            ring: VecDeque::with_capacity(ACCESS_RING_CAPACITY),
            total_access_count: 0,
            last_access_ms: 0,
            access_count_hour: 0,
            access_count_day: 0,
        }
    }
}

impl AccessStats {
    /// Record one access at `now_ms`, pushing into the ring and evicting the
    /// oldest timestamp once the ring is full.
    pub fn record(&mut self, now_ms: u64) {
        if self.ring.len() == ACCESS_RING_CAPACITY {
            self.ring.pop_front();
        }
        self.ring.push_back(now_ms);
        self.total_access_count += 1;
        self.last_access_ms = now_ms;
        self.decay(now_ms);
    }

    /// Rewalk the ring to refresh the hour/day windowed counts. Called both
    /// on every access and by the 5-minute scheduled decay worker, so
    /// counters never drift stale even for keys that stop being touched.
    pub fn decay(&mut self, now_ms: u64) {
        self.access_count_hour = self.ring.iter().filter(|&&t| now_ms.saturating_sub(t) < HOUR_MS).count() as u64;
        self.access_count_day = self.ring.iter().filter(|&&t| now_ms.saturating_sub(t) < DAY_MS).count() as u64;
    }

    /// Average gap between consecutive recorded accesses, in milliseconds.
    /// 0 if fewer than two accesses have been recorded.
    pub fn avg_interval_ms(&self) -> u64 {
        if self.ring.len() < 2 {
            return 0;
        }
        let span = self.ring.back().unwrap() - self.ring.front().unwrap();
        span / (self.ring.len() as u64 - 1)
    }
}

/// Tracks `AccessStats` for every live key. Owned by the State Machine;
/// the Eviction Policy only ever reads a snapshot of it via
/// `EvictionPolicy::select_victims`'s caller-supplied feature rows.
#[derive(Debug, Default)]
pub struct AccessTracker {
    stats: HashMap<String, AccessStats>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_access(&mut self, key: &str) {
        let now = now_ms();
        self.stats.entry(key.to_string()).or_default().record(now);
    }

    pub fn remove(&mut self, key: &str) {
        self.stats.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&AccessStats> {
        self.stats.get(key)
    }

    pub fn snapshot(&self) -> HashMap<String, AccessStats> {
        self.stats.clone()
    }

    pub fn restore(&mut self, stats: HashMap<String, AccessStats>) {
        self.stats = stats;
    }

    /// Rewalk every tracked key's ring. Intended to be driven by a
    /// `tokio::time::interval(Duration::from_secs(300))` loop (spec
    /// section 4.8: "a scheduled decay every 5 minutes").
    pub fn decay_all(&mut self) {
        let now = now_ms();
        for stats in self.stats.values_mut() {
            stats.decay(now);
        }
    }
}

pub const DECAY_INTERVAL: Duration = Duration::from_secs(300);

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
