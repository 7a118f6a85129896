// Read Path: ReadIndex and lease reads (spec section 4.6). No direct teacher
// analog — the teacher's membership raft never serves client reads at all —
// so this module is grounded on the spec's own read-path description,
// implemented with the coordinator/replication primitives the teacher's
// `RaftStateData` pattern already established (role/term checks, commit
// index, peer acks).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::node::{RaftNode, RaftRole};
use crate::rpc::{AppendEntriesRequest, RpcMessage};
use crate::error::{RaftCacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    Strong,
    Lease,
    Eventual,
}

/// Authorization window for serving reads without a heartbeat round
/// (spec section 4.6). `granted_at` anchors the lease at the *start* of the
/// replication round that earned it, not at ack receipt, per the spec's
/// explicit clock-drift note.
#[derive(Debug, Clone, Copy)]
pub struct Lease {
    granted_at: Instant,
    valid_for: Duration,
    term: u64,
}

impl Lease {
    pub fn new(granted_at: Instant, valid_for: Duration, term: u64) -> Self {
        Self { granted_at, valid_for, term }
    }

    pub fn is_valid(&self, current_term: u64) -> bool {
        self.term == current_term && self.granted_at.elapsed() < self.valid_for
    }

    pub fn remaining(&self) -> Duration {
        self.valid_for.saturating_sub(self.granted_at.elapsed())
    }
}

/// Metadata returned alongside a GET so a client can tell how the read was
/// served (spec section 6: "observed consistency level and remaining lease
/// milliseconds").
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub value: Vec<u8>,
    pub served_by: String,
    pub consistency: Consistency,
    pub lease_remaining_ms: Option<u64>,
}

pub async fn read(node: &Arc<RaftNode>, key: &str, consistency: Consistency) -> Result<ReadResult> {
    match consistency {
        Consistency::Eventual => {
            let value = node.state_machine.get(key)?;
            Ok(ReadResult {
                value,
                served_by: node.node_id.clone(),
                consistency: Consistency::Eventual,
                lease_remaining_ms: None,
            })
        }
        Consistency::Lease => match try_lease_read(node, key).await {
            Some(result) => Ok(result),
            None => {
                let mut result = strong_read(node, key).await?;
                result.consistency = Consistency::Lease;
                Ok(result)
            }
        },
        Consistency::Strong => strong_read(node, key).await,
    }
}

/// Serve locally if the leader holds a valid lease in the current term and
/// that term's NO_OP has committed; otherwise degrade to STRONG (spec
/// section 4.6).
async fn try_lease_read(node: &Arc<RaftNode>, key: &str) -> Option<ReadResult> {
    let core = node.core.read().await;
    if core.role != RaftRole::Leader {
        return None;
    }
    let current_term = core.current_term;
    let commit_index = core.commit_index;
    drop(core);

    let lease = *node.lease.read().await.as_ref()?;
    if !lease.is_valid(current_term) {
        return None;
    }
    if node.log.read().await.term_at(commit_index) != Some(current_term) {
        return None;
    }

    let value = node.state_machine.get(key).ok()?;
    Some(ReadResult {
        value,
        served_by: node.node_id.clone(),
        consistency: Consistency::Lease,
        lease_remaining_ms: Some(lease.remaining().as_millis() as u64),
    })
}

/// STRONG: record `read_index = commit_index`, confirm leadership with a
/// heartbeat round, wait for `last_applied >= read_index`, then read locally
/// (spec section 4.6).
async fn strong_read(node: &Arc<RaftNode>, key: &str) -> Result<ReadResult> {
    let (current_term, read_index, leader_id) = {
        let core = node.core.read().await;
        if core.role != RaftRole::Leader {
            return Err(RaftCacheError::NotLeader(core.leader_id.clone()));
        }
        (core.current_term, core.commit_index, core.leader_id.clone())
    };

    if !confirm_leadership(node, current_term).await {
        return Err(RaftCacheError::NotLeader(leader_id));
    }

    let deadline = node.config.request_timeout();
    let waited = tokio::time::timeout(deadline, async {
        loop {
            if node.state_machine.last_applied() >= read_index {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;

    if waited.is_err() {
        return Err(RaftCacheError::Timeout(format!("read index {read_index}")));
    }

    let value = node.state_machine.get(key)?;
    Ok(ReadResult {
        value,
        served_by: node.node_id.clone(),
        consistency: Consistency::Strong,
        lease_remaining_ms: None,
    })
}

/// Broadcast a heartbeat round and require acks from a majority in the
/// current term, confirming this node is still leader before serving a
/// STRONG read.
async fn confirm_leadership(node: &Arc<RaftNode>, current_term: u64) -> bool {
    if node.peers.is_empty() {
        return true;
    }

    let (prev_index, prev_term, commit_index) = {
        let log = node.log.read().await;
        (log.last_index(), log.last_term(), node.core.read().await.commit_index)
    };

    let mut handles = Vec::new();
    for (peer_id, addr) in node.peers.iter() {
        let transport = node.transport.clone();
        let peer_id = peer_id.clone();
        let addr = *addr;
        let request = AppendEntriesRequest {
            term: current_term,
            leader_id: node.node_id.clone(),
            prev_log_index: prev_index,
            prev_log_term: prev_term,
            entries: Vec::new(),
            leader_commit: commit_index,
        };
        handles.push(tokio::spawn(async move {
            transport.send_request(&peer_id, addr, &RpcMessage::AppendEntries(request)).await
        }));
    }

    let mut acks = 1; // self
    for handle in handles {
        if let Ok(Ok(RpcMessage::AppendEntriesReply(resp))) = handle.await {
            if resp.term == current_term && resp.success {
                acks += 1;
            }
        }
    }

    let cluster_size = node.peers.len() + 1;
    acks >= cluster_size / 2 + 1
}
