// Wire message envelope (spec section 6, "External Interfaces"). Grounded on
// the teacher's `VoteRequest`/`VoteResponse` (election.rs) and
// `AppendEntriesRequest`/`AppendEntriesResponse`/`InstallSnapshotRequest`/
// `InstallSnapshotResponse` (replication.rs), generalized into one envelope
// enum so the transport layer only has to frame and dispatch a single type.

use serde::{Deserialize, Serialize};

use crate::common::{LogIndex, NodeId, Term};
use crate::log::entry::LogEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    pub match_index: LogIndex,
    pub follower_id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: Term,
}

/// Every message that can cross the wire between two nodes. The framed
/// transport (`transport::tcp`) only ever moves one of these at a time;
/// request/response correlation is handled by the caller awaiting the
/// connection's next frame rather than by an explicit request id, since each
/// RPC round trip owns its connection for the duration of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcMessage {
    RequestVote(RequestVoteRequest),
    RequestVoteReply(RequestVoteResponse),
    AppendEntries(AppendEntriesRequest),
    AppendEntriesReply(AppendEntriesResponse),
    InstallSnapshot(InstallSnapshotRequest),
    InstallSnapshotReply(InstallSnapshotResponse),
}
