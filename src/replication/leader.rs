// Leader Replicator (spec section 4.3). Generalizes the teacher's
// `ReplicationManager::send_heartbeats`/`replicate_logs`
// (`networking::membership::raft::replication`) from a log-only stub into
// an actual networked replication cycle: real AppendEntries RPCs, real
// nextIndex/matchIndex convergence, and the spec's aggressive halving
// backoff in place of the teacher's decrement-by-one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::node::{PeerState, RaftNode, RaftRole};
use crate::rpc::{AppendEntriesRequest, RpcMessage};

/// Background replication loop: fires every `heartbeat_interval` while this
/// node is leader, replicating to every peer concurrently (spec section 5,
/// "per-peer replication worker").
pub async fn run(node: Arc<RaftNode>) {
    let mut interval = tokio::time::interval(node.config.heartbeat_interval);
    loop {
        interval.tick().await;
        if node.is_shutting_down() {
            return;
        }
        if node.core.read().await.role != RaftRole::Leader {
            continue;
        }
        replicate_once(&node).await;
    }
}

async fn replicate_once(node: &Arc<RaftNode>) {
    let round_start = Instant::now();

    let mut handles = Vec::new();
    for peer_id in node.peers.keys().cloned() {
        let node = node.clone();
        handles.push(tokio::spawn(async move {
            replicate_to_peer(&node, &peer_id).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
    advance_commit_index(node).await;
    maybe_extend_lease(node, round_start).await;
}

async fn replicate_to_peer(node: &Arc<RaftNode>, peer_id: &str) {
    let Some(&addr) = node.peers.get(peer_id) else { return };

    let (term, leader_commit) = {
        let core = node.core.read().await;
        if core.role != RaftRole::Leader {
            return;
        }
        (core.current_term, core.commit_index)
    };

    let next_index = node
        .peer_state
        .read()
        .await
        .get(peer_id)
        .map(|p| p.next_index)
        .unwrap_or(1);

    let (prev_index, prev_term, entries) = {
        let log = node.log.read().await;
        let prev_index = next_index.saturating_sub(1);
        let prev_term = log.term_at(prev_index).unwrap_or(0);
        let entries = log.entries_from(next_index, node.config.max_entries_per_append);
        (prev_index, prev_term, entries)
    };
    let sent_through = entries.last().map(|e| e.index).unwrap_or(prev_index);

    let request = AppendEntriesRequest {
        term,
        leader_id: node.node_id.clone(),
        prev_log_index: prev_index,
        prev_log_term: prev_term,
        entries,
        leader_commit,
    };

    let reply = node
        .transport
        .send_request(&peer_id.to_string(), addr, &RpcMessage::AppendEntries(request))
        .await;

    let response = match reply {
        Ok(RpcMessage::AppendEntriesReply(resp)) => resp,
        Ok(_) | Err(_) => return,
    };

    if node.maybe_step_down(response.term).await {
        return;
    }

    let mut peer_state = node.peer_state.write().await;
    let entry = peer_state.entry(peer_id.to_string()).or_insert(PeerState {
        next_index,
        match_index: 0,
        last_ack_at: None,
    });

    if response.success {
        entry.match_index = entry.match_index.max(sent_through);
        entry.next_index = entry.match_index + 1;
        entry.last_ack_at = Some(Instant::now());
    } else {
        // Aggressive backoff (spec section 4.3, REDESIGN from the teacher's
        // plain decrement-by-one): halve the conflict window each round
        // instead of retreating one index at a time.
        let current = entry.next_index;
        let step = (current.saturating_sub(1)).div_ceil(2);
        entry.next_index = current.saturating_sub(step).max(1);
    }
}

/// Commit rule (spec section 4.3): advance `commit_index` to the largest N
/// such that a majority of `{matchIndex} ∪ {leader.lastIndex}` has replicated
/// it AND `log[N].term == currentTerm` — entries from prior terms only
/// commit transitively, via a current-term entry (the NO_OP) covering them.
async fn advance_commit_index(node: &Arc<RaftNode>) {
    let (current_term, old_commit) = {
        let core = node.core.read().await;
        if core.role != RaftRole::Leader {
            return;
        }
        (core.current_term, core.commit_index)
    };

    let last_index = node.log.read().await.last_index();
    let match_indices: Vec<u64> = node.peer_state.read().await.values().map(|p| p.match_index).collect();
    let cluster_size = node.peers.len() + 1;
    let majority = cluster_size / 2 + 1;

    let mut new_commit = old_commit;
    for n in (old_commit + 1)..=last_index {
        let mut count = 1; // leader itself always has its own last_index
        for &match_index in &match_indices {
            if match_index >= n {
                count += 1;
            }
        }
        if count >= majority {
            let log = node.log.read().await;
            if log.term_at(n) == Some(current_term) {
                new_commit = n;
            }
        }
    }

    if new_commit > old_commit {
        let mut core = node.core.write().await;
        core.commit_index = core.commit_index.max(new_commit);
        drop(core);
        apply_up_to(node, new_commit).await;
    }
}

async fn apply_up_to(node: &Arc<RaftNode>, commit_index: u64) {
    let last_applied = node.state_machine.last_applied();
    let entries = {
        let log = node.log.read().await;
        ((last_applied + 1)..=commit_index)
            .filter_map(|i| log.entry_at(i).cloned())
            .collect::<Vec<_>>()
    };
    for entry in entries {
        if node.state_machine.apply(&entry).await.is_ok() {
            node.notify_applied(entry.index).await;
        }
    }
    if let Err(err) = node.maybe_snapshot().await {
        tracing::warn!(error = %err, "snapshot attempt failed");
    }
}

/// Lease renewal hook (spec section 4.3): once a strict majority of peers
/// have acknowledged within the last 100 ms, extend the lease. The lease
/// begins at `round_start`, the instant this heartbeat round started
/// sending, not whenever the round finishes acknowledging (spec section
/// 4.6): anchoring it later would claim validity for time that already
/// elapsed while peers were being contacted.
async fn maybe_extend_lease(node: &Arc<RaftNode>, round_start: Instant) {
    let core = node.core.read().await;
    if core.role != RaftRole::Leader {
        return;
    }
    let current_term = core.current_term;
    drop(core);

    let peer_state = node.peer_state.read().await;
    let recent_acks = peer_state
        .values()
        .filter(|p| p.last_ack_at.map(|t| t.elapsed() < Duration::from_millis(100)).unwrap_or(false))
        .count();
    let cluster_size = node.peers.len() + 1;
    let majority = cluster_size / 2 + 1;

    if recent_acks + 1 >= majority {
        let mut lease = node.lease.write().await;
        *lease = Some(crate::read_path::Lease::new(round_start, node.config.lease_duration(), current_term));
    }
}
