// Snapshot Store (spec section 2, "Snapshot Store"; section 4.7).
//
// Serializes a point-in-time image of the state machine — the KV map, the
// per-client dedup table, and access stats — to a single file under the
// node's data directory, written via the same atomic temp-file-then-rename
// discipline as the log store's `state.props` (`log::store::write_file_atomic`,
// grounded on the teacher's `metadata.rs`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::access::AccessStats;
use crate::common::{ClientId, LogIndex, Term};
use crate::error::{RaftCacheError, Result};
use crate::log::store::write_file_atomic;

/// On-disk snapshot image: enough to fully reconstruct the state machine
/// without replaying any log entry with index <= `last_included_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub kv: HashMap<String, Vec<u8>>,
    pub dedup: HashMap<ClientId, u64>,
    pub access_stats: HashMap<String, AccessStats>,
}

impl Snapshot {
    pub fn new(
        last_included_index: LogIndex,
        last_included_term: Term,
        kv: HashMap<String, Vec<u8>>,
        dedup: HashMap<ClientId, u64>,
        access_stats: HashMap<String, AccessStats>,
    ) -> Self {
        Self {
            last_included_index,
            last_included_term,
            kv,
            dedup,
            access_stats,
        }
    }
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("snapshot"),
        }
    }

    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| RaftCacheError::Persistence(format!("corrupt snapshot: {e}")))?;
        Ok(Some(snapshot))
    }

    /// Write `snapshot` atomically. Callers must follow up with
    /// `RaftLog::compact_up_to` once this returns, per the trigger rule in
    /// spec section 4.7: stage, rename, then compact the log prefix.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        write_file_atomic(&self.path, &bytes).map_err(|e| RaftCacheError::Persistence(e.to_string()))
    }
}
