// raft-cache - a replicated, in-memory key/value cache backed by Raft.

pub mod access;
pub mod common;
pub mod config;
pub mod election;
pub mod error;
pub mod eviction;
pub mod interfaces;
pub mod log;
pub mod node;
pub mod read_path;
pub mod replication;
pub mod rpc;
pub mod snapshot;
pub mod state_machine;
pub mod transport;

pub use config::RaftConfig;
pub use error::{RaftCacheError, Result};
pub use interfaces::CacheClient;
pub use node::RaftNode;
pub use read_path::Consistency;
