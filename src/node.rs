// Core Coordinator (spec section 4.1, "RaftNode"). Owns role/term/votedFor/
// leaderId and the election timer, and dispatches RPCs and client requests
// to the log, state machine, and replication/election sub-modules. Resolves
// the cyclic-ownership concern in spec section 9 by holding every
// sub-component behind its own lock rather than letting election/replication
// hold back-references to each other: everything routes through `RaftNode`.
//
// Grounded on the teacher's `RaftStateData`/`RaftMembership`
// (`networking::membership::raft::mod`), generalized from a membership
// gossip overlay into a dedicated single-purpose coordinator for one
// replicated cache.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{oneshot, Mutex, RwLock};

use crate::access::DECAY_INTERVAL;
use crate::common::{LogIndex, NodeId, Term};
use crate::config::RaftConfig;
use crate::election;
use crate::eviction::EvictionPolicy;
use crate::log::entry::Command;
use crate::log::store::{LogStore, PersistentState};
use crate::log::{EntryPayload, RaftLog};
use crate::read_path::Lease;
use crate::replication::{follower, leader};
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse, RequestVoteRequest,
    RequestVoteResponse, RpcMessage,
};
use crate::snapshot::SnapshotStore;
use crate::state_machine::StateMachine;
use crate::transport::TcpTransport;
use crate::error::{RaftCacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

/// Leader-only bookkeeping per peer (spec section 3, `PeerState`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerState {
    pub next_index: LogIndex,
    pub match_index: LogIndex,
    pub last_ack_at: Option<Instant>,
}

pub struct CoreState {
    pub role: RaftRole,
    pub current_term: Term,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub commit_index: LogIndex,
}

pub struct RaftNode {
    pub node_id: NodeId,
    pub config: RaftConfig,
    pub peers: HashMap<NodeId, SocketAddr>,

    pub core: RwLock<CoreState>,
    pub log: RwLock<RaftLog>,
    pub peer_state: RwLock<HashMap<NodeId, PeerState>>,
    pub lease: RwLock<Option<Lease>>,

    pub state_machine: Arc<StateMachine>,
    pub snapshot_store: SnapshotStore,
    pub transport: Arc<TcpTransport>,

    pub last_activity: RwLock<Instant>,
    pub election_timeout: RwLock<Duration>,

    /// Notified by the applier once `last_applied` reaches an index a
    /// `submit()` caller is waiting on.
    waiters: Mutex<HashMap<LogIndex, Vec<oneshot::Sender<()>>>>,
    shutdown: AtomicBool,
}

impl RaftNode {
    pub async fn new(
        config: RaftConfig,
        transport: Arc<TcpTransport>,
        eviction: Arc<dyn EvictionPolicy>,
    ) -> Result<Arc<Self>> {
        let store = LogStore::open(&config.data_dir)?;
        let persistent = store.load_persistent_state()?;
        let snapshot_store = SnapshotStore::open(&config.data_dir);
        let snapshot = snapshot_store.load()?;

        let (snapshot_last_index, snapshot_last_term) = snapshot
            .as_ref()
            .map(|s| (s.last_included_index, s.last_included_term))
            .unwrap_or((0, 0));
        let log = RaftLog::open(store, snapshot_last_index, snapshot_last_term)?;

        let state_machine = Arc::new(StateMachine::new(&config, eviction));
        if let Some(snapshot) = snapshot {
            let last_applied = snapshot.last_included_index;
            state_machine.restore_snapshot(snapshot);
            tracing::info!(node_id = %config.node_id, last_applied, "restored state machine from snapshot");
        }

        let election_timeout = random_election_timeout(&config);
        let peers = config.peers.clone();

        let node = Arc::new(Self {
            node_id: config.node_id.clone(),
            peers,
            core: RwLock::new(CoreState {
                role: RaftRole::Follower,
                current_term: persistent.current_term,
                voted_for: persistent.voted_for,
                leader_id: None,
                commit_index: snapshot_last_index,
            }),
            log: RwLock::new(log),
            peer_state: RwLock::new(HashMap::new()),
            lease: RwLock::new(None),
            state_machine,
            snapshot_store,
            transport,
            last_activity: RwLock::new(Instant::now()),
            election_timeout: RwLock::new(election_timeout),
            waiters: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            config,
        });

        // Replay everything already committed-but-unapplied, per the
        // recovery order in spec section 4.7: snapshot first, then log
        // suffix up to commit_index.
        node.replay_committed().await?;

        Ok(node)
    }

    async fn replay_committed(self: &Arc<Self>) -> Result<()> {
        let commit_index = self.core.read().await.commit_index;
        let last_applied = self.state_machine.last_applied();
        let log = self.log.read().await;
        for index in (last_applied + 1)..=commit_index {
            if let Some(entry) = log.entry_at(index) {
                self.state_machine.apply(entry).await?;
            }
        }
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Spawn every background worker loop (spec section 5): election timer,
    /// leader replication, apply pipeline, access-stats decay, and the RPC
    /// listener. Returns immediately; workers run until shutdown. Returns
    /// the tasks' handles so a caller that needs a hard stop (a test
    /// harness simulating a crash, say) can abort them directly rather than
    /// waiting on `request_shutdown`'s cooperative check, which a worker
    /// blocked in `accept().await` would never observe.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(election::run(self.clone())),
            tokio::spawn(leader::run(self.clone())),
            tokio::spawn(run_decay_loop(self.clone())),
            tokio::spawn(run_rpc_listener(self.clone())),
        ]
    }

    pub async fn reset_election_timeout(&self) {
        *self.election_timeout.write().await = random_election_timeout(&self.config);
        *self.last_activity.write().await = Instant::now();
    }

    pub(crate) async fn persist_core(&self, core: &CoreState) -> Result<()> {
        self.log
            .read()
            .await
            .store()
            .save_persistent_state(&PersistentState {
                current_term: core.current_term,
                voted_for: core.voted_for.clone(),
            })
    }

    /// Only valid on the leader: append a COMMAND entry and wait for it to
    /// be committed and applied (spec section 4.1 `submit`).
    pub async fn submit(self: &Arc<Self>, command: Command) -> Result<()> {
        let index = {
            let core = self.core.read().await;
            if core.role != RaftRole::Leader {
                return Err(RaftCacheError::NotLeader(core.leader_id.clone()));
            }
            let term = core.current_term;
            drop(core);

            let mut log = self.log.write().await;
            log.append(term, EntryPayload::Command(command.encode()))?
        };

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.entry(index).or_default().push(tx);

        tokio::time::timeout(self.config.request_timeout(), rx)
            .await
            .map_err(|_| RaftCacheError::Timeout(format!("submit index {index}")))?
            .map_err(|_| RaftCacheError::Shutdown)?;
        Ok(())
    }

    /// Called by the apply pipeline after each entry is applied, to wake any
    /// `submit()` caller waiting on that index.
    pub async fn notify_applied(&self, index: LogIndex) {
        if let Some(senders) = self.waiters.lock().await.remove(&index) {
            for tx in senders {
                let _ = tx.send(());
            }
        }
    }

    /// Snapshot trigger (spec section 4.7): once the log has grown past
    /// `snapshot_threshold`, serialize the state machine, rename it into
    /// place, then compact the log prefix it covers.
    pub async fn maybe_snapshot(&self) -> Result<()> {
        let last_applied = self.state_machine.last_applied();
        let log_len = {
            let log = self.log.read().await;
            last_applied.saturating_sub(log.snapshot_last_index())
        };
        if log_len < self.config.snapshot_threshold {
            return Ok(());
        }

        let last_included_term = self
            .log
            .read()
            .await
            .term_at(last_applied)
            .unwrap_or(0);
        let snapshot = self.state_machine.to_snapshot(last_applied, last_included_term);
        self.snapshot_store.save(&snapshot)?;

        let mut log = self.log.write().await;
        log.compact_up_to(last_applied, last_included_term)?;
        tracing::info!(node_id = %self.node_id, last_applied, "snapshot taken");
        Ok(())
    }

    pub async fn on_request_vote(self: &Arc<Self>, request: RequestVoteRequest) -> Result<RequestVoteResponse> {
        election::handle_request_vote(self, request).await
    }

    pub async fn on_append_entries(self: &Arc<Self>, request: AppendEntriesRequest) -> Result<AppendEntriesResponse> {
        follower::handle_append_entries(self, request).await
    }

    pub async fn on_install_snapshot(
        self: &Arc<Self>,
        request: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse> {
        follower::handle_install_snapshot(self, request).await
    }

    /// Step down to follower if `term` is newer than ours. Returns true if a
    /// step-down occurred.
    pub async fn maybe_step_down(&self, term: Term) -> bool {
        let mut core = self.core.write().await;
        if term > core.current_term {
            core.current_term = term;
            core.role = RaftRole::Follower;
            core.voted_for = None;
            let _ = self.persist_core(&core).await;
            true
        } else {
            false
        }
    }
}

fn random_election_timeout(config: &RaftConfig) -> Duration {
    let min = config.election_timeout_min.as_millis() as u64;
    let max = config.election_timeout_max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

async fn run_decay_loop(node: Arc<RaftNode>) {
    let mut interval = tokio::time::interval(DECAY_INTERVAL);
    loop {
        interval.tick().await;
        if node.is_shutting_down() {
            return;
        }
        node.state_machine.decay_access_stats();
    }
}

/// Accept loop: every inbound connection carries exactly one RPC frame,
/// dispatched to the matching coordinator handler, with the reply written
/// back on the same stream.
async fn run_rpc_listener(node: Arc<RaftNode>) {
    loop {
        if node.is_shutting_down() {
            return;
        }
        let (mut stream, message) = match node.transport.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "rpc accept failed");
                continue;
            }
        };

        let node = node.clone();
        tokio::spawn(async move {
            let reply = match message {
                RpcMessage::RequestVote(req) => node
                    .on_request_vote(req)
                    .await
                    .map(RpcMessage::RequestVoteReply),
                RpcMessage::AppendEntries(req) => node
                    .on_append_entries(req)
                    .await
                    .map(RpcMessage::AppendEntriesReply),
                RpcMessage::InstallSnapshot(req) => node
                    .on_install_snapshot(req)
                    .await
                    .map(RpcMessage::InstallSnapshotReply),
                other => {
                    tracing::warn!(?other, "unexpected message on rpc listener");
                    return;
                }
            };
            if let Ok(reply) = reply {
                if let Err(err) = crate::transport::write_frame(&mut stream, &reply).await {
                    tracing::warn!(error = %err, "failed writing rpc reply");
                }
            }
        });
    }
}
