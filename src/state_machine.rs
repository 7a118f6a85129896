// State Machine / KV Store (spec section 2; section 4.5 "Apply Pipeline").
//
// Owns the KV map and the per-client dedup table exclusively (spec section 3
// ownership rule). The apply pipeline is strictly sequential — a single
// applier task drains committed entries one at a time — so linearizability
// never depends on lock ordering between concurrent appliers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::access::AccessTracker;
use crate::common::{fraction_of, ClientId, LogIndex};
use crate::config::RaftConfig;
use crate::error::{RaftCacheError, Result};
use crate::eviction::{EvictionPolicy, KeyFeatures};
use crate::log::entry::{Command, EntryKind, LogEntry, Op};
use crate::snapshot::Snapshot;

/// The replicated key/value map and dedup table, plus the access tracker and
/// eviction policy that guard its size. `kv` is a `DashMap` rather than a
/// plain `RwLock<HashMap>` for the same reason the teacher's hot-path caches
/// use it: reads (GET, EVENTUAL) vastly outnumber writes and a sharded map
/// avoids a single global lock on the read path.
pub struct StateMachine {
    kv: DashMap<String, Vec<u8>>,
    dedup: DashMap<ClientId, u64>,
    access: parking_lot::Mutex<AccessTracker>,
    eviction: Arc<dyn EvictionPolicy>,
    max_cache_size: usize,
    eviction_batch_fraction_pct: u32,
    last_applied: std::sync::atomic::AtomicU64,
}

impl StateMachine {
    pub fn new(config: &RaftConfig, eviction: Arc<dyn EvictionPolicy>) -> Self {
        Self {
            kv: DashMap::new(),
            dedup: DashMap::new(),
            access: parking_lot::Mutex::new(AccessTracker::new()),
            eviction,
            max_cache_size: config.max_cache_size,
            eviction_batch_fraction_pct: config.eviction_batch_fraction_pct,
            last_applied: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Apply one committed entry. Advances `last_applied` unconditionally —
    /// even a duplicate or a NO_OP still moves the apply cursor forward, per
    /// spec section 4.5: "NO_OP: advance lastApplied only."
    pub async fn apply(&self, entry: &LogEntry) -> Result<()> {
        if entry.kind == EntryKind::Command {
            let command = Command::decode(&entry.payload)?;
            self.apply_command(&command).await?;
        }
        self.last_applied.store(entry.index, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    async fn apply_command(&self, command: &Command) -> Result<()> {
        let already_applied = self
            .dedup
            .get(&command.client_id)
            .map(|seq| *seq >= command.seq)
            .unwrap_or(false);
        if already_applied {
            return Ok(());
        }

        match &command.op {
            Op::Put { key, value } => {
                self.put(key.clone(), value.clone()).await;
            }
            Op::Delete { key } => {
                self.kv.remove(key);
                self.access.lock().remove(key);
                self.eviction.remove(key);
            }
        }

        self.dedup.insert(command.client_id.clone(), command.seq);
        Ok(())
    }

    async fn put(&self, key: String, value: Vec<u8>) {
        if !self.kv.contains_key(&key) && self.kv.len() + 1 > self.max_cache_size {
            self.evict_batch().await;
        }
        self.kv.insert(key.clone(), value);
        self.record_access(&key);
    }

    fn record_access(&self, key: &str) {
        self.access.lock().record_access(key);
        self.eviction.record_access(key);
    }

    /// Evict `eviction_batch_fraction_pct`% of capacity in one batch to
    /// amortize overhead (spec section 4.8).
    async fn evict_batch(&self) {
        let batch = fraction_of(self.max_cache_size, self.eviction_batch_fraction_pct, 100).max(1);
        let candidates: Vec<KeyFeatures> = {
            let access = self.access.lock();
            self.kv
                .iter()
                .filter_map(|entry| access.get(entry.key()).map(|stats| KeyFeatures::from_stats(entry.key(), stats)))
                .collect()
        };
        let victims = self.eviction.select_victims(&candidates, batch).await;
        let mut access = self.access.lock();
        for key in victims {
            self.kv.remove(&key);
            access.remove(&key);
            self.eviction.remove(&key);
        }
    }

    /// Read a value for GET. Callers are responsible for consistency-level
    /// gating (STRONG/LEASE/EVENTUAL) before reaching here; this is the
    /// uniform local read once that gate has passed.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let value = self
            .kv
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RaftCacheError::KeyNotFound(key.to_string()))?;
        self.record_access(key);
        Ok(value)
    }

    /// The highest sequence number applied for `client_id`, if any command
    /// from it has ever been applied (spec section 3 dedup table).
    pub fn last_applied_seq(&self, client_id: &str) -> Option<u64> {
        self.dedup.get(client_id).map(|seq| *seq)
    }

    pub fn len(&self) -> usize {
        self.kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }

    /// Decay every tracked key's access window. Intended to be driven by the
    /// 5-minute scheduled worker (spec section 4.8).
    pub fn decay_access_stats(&self) {
        self.access.lock().decay_all();
    }

    /// Materialize a full snapshot image for the Snapshot Store.
    pub fn to_snapshot(&self, last_included_index: LogIndex, last_included_term: crate::common::Term) -> Snapshot {
        let kv: HashMap<String, Vec<u8>> = self.kv.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        let dedup: HashMap<ClientId, u64> = self.dedup.iter().map(|e| (e.key().clone(), *e.value())).collect();
        let access_stats = self.access.lock().snapshot();
        Snapshot::new(last_included_index, last_included_term, kv, dedup, access_stats)
    }

    /// Replace the entire state machine with a restored snapshot image,
    /// discarding whatever state was held before (spec section 4.7 "Install").
    pub fn restore_snapshot(&self, snapshot: Snapshot) {
        self.kv.clear();
        for (k, v) in snapshot.kv {
            self.kv.insert(k, v);
        }
        self.dedup.clear();
        for (k, v) in snapshot.dedup {
            self.dedup.insert(k, v);
        }
        self.access.lock().restore(snapshot.access_stats);
        self.last_applied
            .store(snapshot.last_included_index, std::sync::atomic::Ordering::Release);
    }

    pub fn should_snapshot(&self, log_len: u64, threshold: u64) -> bool {
        log_len >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::LruPolicy;

    fn machine(max_cache_size: usize) -> StateMachine {
        let mut config = RaftConfig::default();
        config.max_cache_size = max_cache_size;
        StateMachine::new(&config, Arc::new(LruPolicy::new()))
    }

    fn put_entry(index: u64, client_id: &str, seq: u64, key: &str, value: &[u8]) -> LogEntry {
        let command = Command {
            client_id: client_id.to_string(),
            seq,
            op: Op::Put {
                key: key.to_string(),
                value: value.to_vec(),
            },
        };
        LogEntry::command(index, 1, command.encode())
    }

    #[tokio::test]
    async fn apply_put_then_get_roundtrips() {
        let sm = machine(10);
        sm.apply(&put_entry(1, "c1", 1, "k", b"v")).await.unwrap();
        assert_eq!(sm.get("k").unwrap(), b"v");
        assert_eq!(sm.last_applied(), 1);
    }

    #[tokio::test]
    async fn duplicate_sequence_is_a_no_op() {
        let sm = machine(10);
        sm.apply(&put_entry(1, "c1", 5, "k", b"v1")).await.unwrap();
        sm.apply(&put_entry(2, "c1", 5, "k", b"v2")).await.unwrap();
        assert_eq!(sm.get("k").unwrap(), b"v1");
        assert_eq!(sm.last_applied(), 2);
    }

    #[tokio::test]
    async fn no_op_entry_advances_last_applied_without_mutating_kv() {
        let sm = machine(10);
        sm.apply(&LogEntry::no_op(1, 1)).await.unwrap();
        assert_eq!(sm.last_applied(), 1);
        assert!(sm.is_empty());
    }

    #[tokio::test]
    async fn put_beyond_capacity_triggers_eviction() {
        let sm = machine(2);
        sm.apply(&put_entry(1, "c1", 1, "a", b"1")).await.unwrap();
        sm.apply(&put_entry(2, "c1", 2, "b", b"2")).await.unwrap();
        sm.apply(&put_entry(3, "c1", 3, "c", b"3")).await.unwrap();
        assert!(sm.len() <= 2);
        assert!(sm.get("c").is_ok());
    }

    #[tokio::test]
    async fn snapshot_roundtrips_kv_and_dedup() {
        let sm = machine(10);
        sm.apply(&put_entry(1, "c1", 1, "k", b"v")).await.unwrap();
        let snap = sm.to_snapshot(1, 1);

        let restored = machine(10);
        restored.restore_snapshot(snap);
        assert_eq!(restored.get("k").unwrap(), b"v");
        assert_eq!(restored.last_applied(), 1);
    }
}
