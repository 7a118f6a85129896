// Log subsystem: entry/command types, the durable on-disk store, and the
// in-memory index that owns Raft's log invariants.

pub mod entry;
pub mod raft_log;
pub mod store;

pub use entry::{Command, EntryKind, LogEntry, Op};
pub use raft_log::{EntryPayload, RaftLog};
pub use store::{LogStore, PersistentState};
