//! Error kinds for the raft-cache core.
//!
//! Mirrors spec section 7: a small, stable set of client-visible variants
//! (`NotLeader`, `Timeout`, `KeyNotFound`, `Shutdown`), two internal-only
//! variants absorbed by the consensus state machine (`StaleTerm`,
//! `LogMismatch`), and one fatal variant (`Persistence`) that should only
//! ever propagate up to a process exit.

use thiserror::Error;

use crate::common::NodeId;

#[derive(Error, Debug)]
pub enum RaftCacheError {
    /// A write or STRONG/LEASE read was attempted on a non-leader node.
    #[error("not leader (hint: {0:?})")]
    NotLeader(Option<NodeId>),

    /// A submit or read did not complete within its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// GET found no mapping for the requested key.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// In-flight operation cancelled by teardown.
    #[error("shutdown in progress")]
    Shutdown,

    /// RPC rejected because the sender's term is obsolete. Never surfaced
    /// to clients; absorbed by the election/replication state machines.
    #[error("stale term: {0}")]
    StaleTerm(u64),

    /// AppendEntries consistency check failed. Drives leader backoff; never
    /// surfaced to clients.
    #[error("log mismatch at index {0}")]
    LogMismatch(u64),

    /// A durable write failed. Fatal: the node must fail-stop rather than
    /// continue running with an uncertain on-disk state.
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RaftCacheError>;

impl From<serde_json::Error> for RaftCacheError {
    fn from(e: serde_json::Error) -> Self {
        RaftCacheError::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for RaftCacheError {
    fn from(e: bincode::error::EncodeError) -> Self {
        RaftCacheError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for RaftCacheError {
    fn from(e: bincode::error::DecodeError) -> Self {
        RaftCacheError::Serialization(e.to_string())
    }
}

impl RaftCacheError {
    /// True for the small set of errors a client is ever expected to see.
    pub fn is_client_visible(&self) -> bool {
        matches!(
            self,
            RaftCacheError::NotLeader(_)
                | RaftCacheError::Timeout(_)
                | RaftCacheError::KeyNotFound(_)
                | RaftCacheError::Shutdown
        )
    }
}
