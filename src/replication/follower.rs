// Follower Replicator (spec section 4.4). Grounded on the teacher's
// `ReplicationManager::handle_append_entries`/`handle_install_snapshot`
// (`networking::membership::raft::replication`), which already implements
// almost exactly this state machine — the main change here is applying
// newly committed entries immediately rather than leaving `commit_index`
// to be drained by a separate poller, and running it over a real RPC
// instead of an in-process call.

use std::sync::Arc;

use crate::common::LogIndex;
use crate::node::{RaftNode, RaftRole};
use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse};
use crate::snapshot::Snapshot;
use crate::error::Result;

/// Handle an inbound AppendEntries RPC (spec section 4.4).
pub async fn handle_append_entries(node: &Arc<RaftNode>, request: AppendEntriesRequest) -> Result<AppendEntriesResponse> {
    let mut core = node.core.write().await;

    if request.term < core.current_term {
        return Ok(AppendEntriesResponse {
            term: core.current_term,
            success: false,
            match_index: 0,
            follower_id: node.node_id.clone(),
        });
    }

    if request.term > core.current_term {
        core.current_term = request.term;
        core.voted_for = None;
        node.persist_core(&core).await?;
    }
    core.role = RaftRole::Follower;
    core.leader_id = Some(request.leader_id.clone());
    let term = core.current_term;
    drop(core);

    node.reset_election_timeout().await;

    let mut log = node.log.write().await;
    if !log.matches_prev(request.prev_log_index, request.prev_log_term) {
        return Ok(AppendEntriesResponse {
            term,
            success: false,
            match_index: log.last_index(),
            follower_id: node.node_id.clone(),
        });
    }

    log.append_replicated(&request.entries)?;
    let match_index = request.entries.last().map(|e| e.index).unwrap_or(request.prev_log_index);
    let last_index = log.last_index();
    drop(log);

    if request.leader_commit > node.core.read().await.commit_index {
        let new_commit = request.leader_commit.min(last_index);
        let mut core = node.core.write().await;
        core.commit_index = core.commit_index.max(new_commit);
        drop(core);
        apply_up_to(node, new_commit).await;
    }

    Ok(AppendEntriesResponse {
        term,
        success: true,
        match_index,
        follower_id: node.node_id.clone(),
    })
}

async fn apply_up_to(node: &Arc<RaftNode>, commit_index: LogIndex) {
    let last_applied = node.state_machine.last_applied();
    let entries = {
        let log = node.log.read().await;
        ((last_applied + 1)..=commit_index)
            .filter_map(|i| log.entry_at(i).cloned())
            .collect::<Vec<_>>()
    };
    for entry in entries {
        let _ = node.state_machine.apply(&entry).await;
    }
    if let Err(err) = node.maybe_snapshot().await {
        tracing::warn!(error = %err, "snapshot attempt failed");
    }
}

/// Install a leader-sent snapshot (spec section 4.7 "Install"): replace the
/// state machine and log prefix atomically, then resume AppendEntries from
/// `last_included_index + 1`.
pub async fn handle_install_snapshot(
    node: &Arc<RaftNode>,
    request: InstallSnapshotRequest,
) -> Result<InstallSnapshotResponse> {
    let mut core = node.core.write().await;
    if request.term < core.current_term {
        return Ok(InstallSnapshotResponse { term: core.current_term });
    }
    if request.term > core.current_term {
        core.current_term = request.term;
        core.voted_for = None;
        node.persist_core(&core).await?;
    }
    core.role = RaftRole::Follower;
    core.leader_id = Some(request.leader_id.clone());
    let term = core.current_term;
    core.commit_index = core.commit_index.max(request.last_included_index);
    drop(core);

    let snapshot: Snapshot = serde_json::from_slice(&request.data)?;
    node.snapshot_store.save(&snapshot)?;
    node.state_machine.restore_snapshot(snapshot);

    let mut log = node.log.write().await;
    log.compact_up_to(request.last_included_index, request.last_included_term)?;

    Ok(InstallSnapshotResponse { term })
}
