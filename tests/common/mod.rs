// Shared multi-node test harness (spec section 8, "Concrete scenarios").
//
// Boots real `RaftNode`s wired together over loopback TCP, the same
// `TcpTransport` the production binaries use, rather than an in-process
// fake. Grounded on the teacher's `ClusterTestHarness`
// (`tests/cluster_10_node_test.rs`), adapted from a simulated/assertion-only
// harness to one that drives genuine election and replication traffic.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use raft_cache::config::RaftConfig;
use raft_cache::eviction::{EvictionPolicy, LruPolicy};
use raft_cache::interfaces::CacheClient;
use raft_cache::node::{RaftNode, RaftRole};
use raft_cache::read_path::Consistency;
use raft_cache::transport::{TcpConfig, TcpTransport};
use raft_cache::Result;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Fast timing profile so elections and heartbeats resolve in tens of
/// milliseconds rather than the production defaults, without weakening any
/// invariant under test (`heartbeat * 3 <= election_timeout_min` and
/// `lease_duration_ms <= election_timeout_min / 2` both still hold).
pub fn fast_config(node_id: &str, data_dir: &std::path::Path, peers: HashMap<String, SocketAddr>) -> RaftConfig {
    let mut config = RaftConfig::default();
    config.node_id = node_id.to_string();
    config.data_dir = data_dir.to_path_buf();
    config.peers = peers;
    config.heartbeat_interval = Duration::from_millis(20);
    config.election_timeout_min = Duration::from_millis(100);
    config.election_timeout_max = Duration::from_millis(200);
    config.lease_duration_ms = 40;
    config.request_timeout_ms = 2_000;
    config.snapshot_threshold = 10_000;
    config
}

/// What's needed to bring a stopped node back in `ClusterHarness::restart_node`.
pub struct StoppedNode {
    addr: SocketAddr,
    node_id: String,
    peers: HashMap<String, SocketAddr>,
}

pub struct ClusterHarness {
    pub nodes: Vec<Arc<RaftNode>>,
    dirs: Vec<TempDir>,
    handles: Vec<Vec<JoinHandle<()>>>,
}

impl ClusterHarness {
    /// Boot `n` nodes, each bound to an ephemeral loopback port, fully
    /// peered with one another, and already running their background
    /// workers. Returns once every transport is bound; callers still need to
    /// wait for an election to complete via `wait_for_leader`.
    pub async fn start(n: usize) -> Self {
        Self::start_with_policy(n, |_| Arc::new(LruPolicy::new())).await
    }

    pub async fn start_with_policy(n: usize, make_policy: impl Fn(usize) -> Arc<dyn EvictionPolicy>) -> Self {
        let mut transports = Vec::with_capacity(n);
        let mut addrs = Vec::with_capacity(n);
        for _ in 0..n {
            let mut tcp_config = TcpConfig::default();
            tcp_config.bind_addr = "127.0.0.1:0".parse().unwrap();
            let mut transport = TcpTransport::new(tcp_config);
            transport.bind().await.unwrap();
            addrs.push(transport.local_addr().unwrap());
            transports.push(transport);
        }

        let ids: Vec<String> = (0..n).map(|i| format!("n{i}")).collect();

        let mut nodes = Vec::with_capacity(n);
        let mut dirs = Vec::with_capacity(n);
        let mut handles = Vec::with_capacity(n);
        for (i, transport) in transports.into_iter().enumerate() {
            let peers: HashMap<String, SocketAddr> = ids
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, id)| (id.clone(), addrs[j]))
                .collect();

            let dir = tempfile::tempdir().unwrap();
            let config = fast_config(&ids[i], dir.path(), peers);
            let node = RaftNode::new(config, Arc::new(transport), make_policy(i)).await.unwrap();
            let worker_handles = node.spawn_workers();

            nodes.push(node);
            dirs.push(dir);
            handles.push(worker_handles);
        }

        Self { nodes, dirs, handles }
    }

    /// Stop node `idx` as if it crashed: abort its worker tasks (dropping
    /// the listening socket, since `request_shutdown` alone can't unblock a
    /// task parked in `accept().await`) and remove it from `self.nodes`, so
    /// the rest of the cluster can keep running and writing without it.
    /// Returns the bits `restart_node` needs to bring it back on the exact
    /// same address, so surviving peers' address maps never need to change.
    pub async fn stop_node(&mut self, idx: usize) -> StoppedNode {
        // `remove` (rather than `clone`) takes the harness's own strong
        // reference out of `self.nodes`, so once this local `old` drops
        // below, nothing keeps the old listener's socket open.
        let old = self.nodes.remove(idx);
        let addr = old.transport.local_addr().unwrap();
        let node_id = old.node_id.clone();
        let peers = old.peers.clone();
        old.request_shutdown();
        for handle in self.handles[idx].drain(..) {
            handle.abort();
        }
        drop(old);
        StoppedNode { addr, node_id, peers }
    }

    /// Rebuild node `idx` from what `stop_node` returned, against the same
    /// data directory and the same bound address it used before.
    pub async fn restart_node(&mut self, idx: usize, stopped: StoppedNode) -> Arc<RaftNode> {
        let StoppedNode { addr, node_id, peers } = stopped;

        let mut tcp_config = TcpConfig::default();
        tcp_config.bind_addr = addr;
        let mut transport = TcpTransport::new(tcp_config);

        // The old listener frees the port as soon as its last Arc clone
        // drops, which can lag slightly behind `stop_node`'s abort() calls.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            match transport.bind().await {
                Ok(()) => break,
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(err) => panic!("could not rebind {addr} for restarted node {node_id}: {err}"),
            }
        }

        let config = fast_config(&node_id, self.dirs[idx].path(), peers);
        let node = RaftNode::new(config, Arc::new(transport), Arc::new(LruPolicy::new())).await.unwrap();
        let worker_handles = node.spawn_workers();

        self.nodes.insert(idx, node.clone());
        self.handles[idx] = worker_handles;
        node
    }

    /// Poll every node's role until exactly one reports `Leader`, or panic
    /// once `timeout` elapses. Mirrors the "within O(electionTimeoutMax)"
    /// boundary behavior in spec section 8.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Arc<RaftNode> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for node in &self.nodes {
                if node.core.read().await.role == RaftRole::Leader {
                    return node.clone();
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no leader elected within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until every node's `last_applied` reaches at least `index`.
    pub async fn wait_for_apply(&self, index: u64, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.nodes.iter().all(|n| n.state_machine.last_applied() >= index) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("not all nodes reached last_applied >= {index} within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_match_index(&self, leader: &Arc<RaftNode>, target: u64, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let converged = leader
                .peer_state
                .read()
                .await
                .values()
                .all(|p| p.match_index >= target);
            if converged {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("followers did not reach match_index >= {target} within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn put(node: &Arc<RaftNode>, key: &str, value: &[u8], client_id: &str, seq: u64) -> Result<()> {
    CacheClient::new(node.clone())
        .put(key.to_string(), value.to_vec(), client_id.to_string(), seq)
        .await
}

pub async fn strong_get(node: &Arc<RaftNode>, key: &str) -> Result<Vec<u8>> {
    CacheClient::new(node.clone()).get(key, Consistency::Strong).await.map(|r| r.value)
}

pub async fn eventual_get(node: &Arc<RaftNode>, key: &str) -> Result<Vec<u8>> {
    CacheClient::new(node.clone()).get(key, Consistency::Eventual).await.map(|r| r.value)
}
