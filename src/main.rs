// raft-cache node process: loads configuration, acquires the data
// directory lock, constructs a `RaftNode`, and runs until signalled to stop.

use std::path::PathBuf;
use std::sync::Arc;

use raft_cache::config::RaftConfig;
use raft_cache::eviction::{EvictionPolicy, LruPolicy, MlPolicy};
use raft_cache::node::RaftNode;
use raft_cache::transport::{TcpConfig, TcpTransport};
use raft_cache::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("raftcache.conf"));

    let config = if config_path.exists() {
        RaftConfig::from_file(&config_path)?
    } else {
        tracing::warn!(path = ?config_path, "no config file found, using defaults");
        RaftConfig::default()
    };

    std::fs::create_dir_all(&config.data_dir)?;
    let _lock = acquire_data_dir_lock(&config.data_dir)?;

    tracing::info!(node_id = %config.node_id, data_dir = ?config.data_dir, "starting raft-cache node");

    let bind_addr = config
        .peers
        .get(&config.node_id)
        .copied()
        .unwrap_or_else(|| "0.0.0.0:9000".parse().unwrap());
    let mut tcp_config = TcpConfig::default();
    tcp_config.bind_addr = bind_addr;
    tcp_config.request_timeout = config.request_timeout();
    let mut transport = TcpTransport::new(tcp_config);
    transport.bind().await?;
    let transport = Arc::new(transport);

    let eviction: Arc<dyn EvictionPolicy> = match &config.ml_base_url {
        Some(url) => Arc::new(MlPolicy::new(url.clone(), config.request_timeout())),
        None => Arc::new(LruPolicy::new()),
    };

    let node = RaftNode::new(config, transport, eviction).await?;
    node.spawn_workers();

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");
    node.request_shutdown();

    Ok(())
}

/// Enforce "at most one node instance per data directory" (spec's
/// design-notes re-architecture note) with a PID file created exclusively;
/// dropped on clean process exit.
struct DataDirLock {
    path: PathBuf,
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn acquire_data_dir_lock(data_dir: &std::path::Path) -> Result<DataDirLock> {
    let path = data_dir.join("node.lock");
    let mut open_opts = std::fs::OpenOptions::new();
    open_opts.write(true).create_new(true);
    match open_opts.open(&path) {
        Ok(mut file) => {
            use std::io::Write as _;
            write!(file, "{}", std::process::id())?;
            Ok(DataDirLock { path })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(raft_cache::RaftCacheError::Configuration(
            format!("data directory {data_dir:?} is already locked by another node process"),
        )),
        Err(e) => Err(e.into()),
    }
}
