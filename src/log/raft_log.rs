// In-memory Raft Log index (spec section 2, "Raft Log"; section 4.2).
//
// Generalizes the teacher's `networking::membership::raft::log::RaftLog`: an
// in-memory `Vec<LogEntry>` that owns the index-arithmetic invariants, with
// every mutating operation delegating the actual bytes-on-disk write to a
// `LogStore`. The log is dense and 1-based starting at
// `snapshot_last_index + 1`; index 0 never appears as a real entry.

use crate::common::{LogIndex, Term};
use crate::error::Result;
use crate::log::entry::LogEntry;
use crate::log::store::LogStore;

pub struct RaftLog {
    store: LogStore,
    /// Entries with index > snapshot_last_index, in ascending order.
    entries: Vec<LogEntry>,
    /// Index of the last entry folded into the most recent snapshot. 0 if no
    /// snapshot has ever been taken.
    snapshot_last_index: LogIndex,
    snapshot_last_term: Term,
}

impl RaftLog {
    /// Recover the log from disk. `snapshot_last_index`/`snapshot_last_term`
    /// come from the Snapshot Store and anchor the dense-index invariant:
    /// any persisted entry with index <= snapshot_last_index is stale and
    /// dropped here rather than trusted blindly.
    pub fn open(store: LogStore, snapshot_last_index: LogIndex, snapshot_last_term: Term) -> Result<Self> {
        let mut entries = store.load_all()?;
        entries.retain(|e| e.index > snapshot_last_index);
        Ok(Self {
            store,
            entries,
            snapshot_last_index,
            snapshot_last_term,
        })
    }

    /// Index of the most recent entry, or the last snapshotted index if the
    /// in-memory tail is empty.
    pub fn last_index(&self) -> LogIndex {
        self.entries.last().map(|e| e.index).unwrap_or(self.snapshot_last_index)
    }

    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(self.snapshot_last_term)
    }

    pub fn snapshot_last_index(&self) -> LogIndex {
        self.snapshot_last_index
    }

    /// Append a brand-new entry at `last_index() + 1`, durably, then hold it
    /// in memory. Used by the leader when accepting a client command.
    pub fn append(&mut self, term: Term, kind_payload: EntryPayload) -> Result<LogIndex> {
        let index = self.last_index() + 1;
        let entry = match kind_payload {
            EntryPayload::Command(payload) => LogEntry::command(index, term, payload),
            EntryPayload::NoOp => LogEntry::no_op(index, term),
        };
        self.store.append(&entry)?;
        self.entries.push(entry);
        Ok(index)
    }

    /// Append entries replicated from a leader, overwriting any conflicting
    /// suffix first (spec section 4.4: "on a term mismatch at some index,
    /// the follower discards its entry at that index and everything after
    /// it before appending the leader's entries").
    pub fn append_replicated(&mut self, new_entries: &[LogEntry]) -> Result<()> {
        for entry in new_entries {
            if let Some(existing) = self.entry_at(entry.index) {
                if existing.term == entry.term {
                    continue;
                }
                self.truncate_suffix_from(entry.index)?;
            }
            self.store.append(entry)?;
            self.entries.push(entry.clone());
        }
        Ok(())
    }

    /// Returns the entry at `index`, or `None` if it has been compacted into
    /// a snapshot or does not exist yet.
    pub fn entry_at(&self, index: LogIndex) -> Option<&LogEntry> {
        if index <= self.snapshot_last_index {
            return None;
        }
        self.entries.iter().find(|e| e.index == index)
    }

    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == self.snapshot_last_index {
            return Some(self.snapshot_last_term);
        }
        self.entry_at(index).map(|e| e.term)
    }

    /// Entries with index >= `from`, in order, capped at `limit` entries
    /// (spec section 6, `maxEntriesPerAppend`).
    pub fn entries_from(&self, from: LogIndex, limit: usize) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.index >= from)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Discard every entry with index >= `from`, on disk and in memory
    /// (spec section 4.2 `truncateSuffixFrom`).
    pub fn truncate_suffix_from(&mut self, from: LogIndex) -> Result<()> {
        let last = self.last_index();
        if from > last {
            return Ok(());
        }
        self.store.truncate_suffix_from(from, last)?;
        self.entries.retain(|e| e.index < from);
        Ok(())
    }

    /// Drop everything up to and including `up_to` after it has been folded
    /// into a snapshot (spec section 4.2 `deletePrefixUpTo`).
    pub fn compact_up_to(&mut self, up_to: LogIndex, up_to_term: Term) -> Result<()> {
        if up_to <= self.snapshot_last_index {
            return Ok(());
        }
        self.store.delete_prefix_up_to(up_to)?;
        self.entries.retain(|e| e.index > up_to);
        self.snapshot_last_index = up_to;
        self.snapshot_last_term = up_to_term;
        Ok(())
    }

    /// The election restriction from spec section 4.1: candidate's log must
    /// be at least as up to date as ours, comparing term first, then length.
    pub fn is_up_to_date(&self, candidate_last_term: Term, candidate_last_index: LogIndex) -> bool {
        let (our_term, our_index) = (self.last_term(), self.last_index());
        candidate_last_term > our_term || (candidate_last_term == our_term && candidate_last_index >= our_index)
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }
}

pub enum EntryPayload {
    Command(Vec<u8>),
    NoOp,
}

impl RaftLog {
    /// Guard used before accepting an `AppendEntries` RPC: the leader's
    /// `prev_log_index`/`prev_log_term` must match what we hold, or 0/0 for
    /// the very first entry after a snapshot.
    pub fn matches_prev(&self, prev_log_index: LogIndex, prev_log_term: Term) -> bool {
        if prev_log_index == 0 {
            return true;
        }
        if prev_log_index == self.snapshot_last_index {
            return prev_log_term == self.snapshot_last_term;
        }
        self.term_at(prev_log_index) == Some(prev_log_term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_log() -> RaftLog {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        RaftLog::open(store, 0, 0).unwrap()
    }

    #[test]
    fn append_advances_last_index_and_term() {
        let mut log = open_log();
        let idx = log.append(1, EntryPayload::NoOp).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(log.last_index(), 1);
        assert_eq!(log.last_term(), 1);
    }

    #[test]
    fn conflicting_suffix_is_discarded_on_replicated_append() {
        let mut log = open_log();
        log.append(1, EntryPayload::NoOp).unwrap();
        log.append(1, EntryPayload::Command(vec![1])).unwrap();

        let replicated = vec![LogEntry::no_op(2, 2)];
        log.append_replicated(&replicated).unwrap();

        assert_eq!(log.last_index(), 2);
        assert_eq!(log.term_at(2), Some(2));
    }

    #[test]
    fn is_up_to_date_compares_term_then_index() {
        let mut log = open_log();
        log.append(1, EntryPayload::NoOp).unwrap();
        log.append(1, EntryPayload::NoOp).unwrap();

        assert!(log.is_up_to_date(2, 1));
        assert!(log.is_up_to_date(1, 2));
        assert!(!log.is_up_to_date(1, 1));
    }

    #[test]
    fn compact_up_to_drops_prefix_and_anchors_snapshot_term() {
        let mut log = open_log();
        for _ in 0..3 {
            log.append(1, EntryPayload::NoOp).unwrap();
        }
        log.compact_up_to(2, 1).unwrap();
        assert_eq!(log.snapshot_last_index(), 2);
        assert!(log.entry_at(1).is_none());
        assert!(log.entry_at(3).is_some());
    }
}
