// Runtime configuration for a raft-cache node.
//
// Grounded on the teacher's `RaftConfig` (networking::membership raft module)
// and `CacheConfig` defaulting/validation pattern (cache::query_cache). The
// spec's non-goal excludes a YAML loader; this module keeps the *loader*
// intentionally thin (a flat `key = value` file) while the typed surface the
// Raft core consumes is complete.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::NodeId;
use crate::error::{RaftCacheError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub data_dir: PathBuf,
    pub peers: HashMap<NodeId, SocketAddr>,

    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    pub lease_duration_ms: u64,

    pub max_cache_size: usize,
    pub eviction_batch_fraction_pct: u32,

    pub snapshot_threshold: u64,
    pub max_entries_per_append: usize,

    pub request_timeout_ms: u64,
    pub ml_base_url: Option<String>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_millis(50);
        Self {
            node_id: "node1".to_string(),
            data_dir: PathBuf::from("./data"),
            peers: HashMap::new(),
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval,
            lease_duration_ms: 9 * heartbeat_interval.as_millis() as u64,
            max_cache_size: 1000,
            eviction_batch_fraction_pct: 10,
            snapshot_threshold: 1000,
            max_entries_per_append: 100,
            request_timeout_ms: 5_000,
            ml_base_url: None,
        }
    }
}

impl RaftConfig {
    /// Validate the invariants spec.md section 6 calls out explicitly
    /// (`heartbeat * 3 <= electionTimeoutMin`) plus the obvious sanity checks.
    pub fn validate(&self) -> Result<()> {
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftCacheError::Configuration(
                "election_timeout_min must be < election_timeout_max".to_string(),
            ));
        }
        if self.heartbeat_interval * 3 > self.election_timeout_min {
            return Err(RaftCacheError::Configuration(
                "heartbeat_interval * 3 must be <= election_timeout_min".to_string(),
            ));
        }
        if self.max_cache_size == 0 {
            return Err(RaftCacheError::Configuration(
                "max_cache_size must be > 0".to_string(),
            ));
        }
        if self.eviction_batch_fraction_pct == 0 || self.eviction_batch_fraction_pct > 100 {
            return Err(RaftCacheError::Configuration(
                "eviction_batch_fraction_pct must be in 1..=100".to_string(),
            ));
        }
        if self.snapshot_threshold == 0 {
            return Err(RaftCacheError::Configuration(
                "snapshot_threshold must be > 0".to_string(),
            ));
        }
        // Clamp-worthy, not fatal: lease duration should never exceed half
        // the minimum election timeout, per the drift-bound decision in
        // DESIGN.md. Reject instead of silently clamping so misconfiguration
        // is visible at startup.
        if self.lease_duration_ms > self.election_timeout_min.as_millis() as u64 / 2 {
            return Err(RaftCacheError::Configuration(format!(
                "lease_duration_ms ({}) must be <= election_timeout_min/2 ({})",
                self.lease_duration_ms,
                self.election_timeout_min.as_millis() / 2
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Load a flat `key = value` configuration file, one setting per line,
    /// `#`-prefixed comments allowed. Unknown keys are ignored so a config
    /// file can be shared loosely across node versions.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config = RaftConfig::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "node_id" => config.node_id = value.to_string(),
                "data_dir" => config.data_dir = PathBuf::from(value),
                "election_timeout_min_ms" => {
                    config.election_timeout_min = Duration::from_millis(parse_u64(value)?)
                }
                "election_timeout_max_ms" => {
                    config.election_timeout_max = Duration::from_millis(parse_u64(value)?)
                }
                "heartbeat_interval_ms" => {
                    config.heartbeat_interval = Duration::from_millis(parse_u64(value)?)
                }
                "lease_duration_ms" => config.lease_duration_ms = parse_u64(value)?,
                "max_cache_size" => config.max_cache_size = parse_u64(value)? as usize,
                "snapshot_threshold" => config.snapshot_threshold = parse_u64(value)?,
                "request_timeout_ms" => config.request_timeout_ms = parse_u64(value)?,
                "ml_base_url" => config.ml_base_url = Some(value.to_string()),
                "peer" => {
                    let Some((id, addr)) = value.split_once('@') else {
                        return Err(RaftCacheError::Configuration(format!(
                            "malformed peer entry (expected id@host:port): {value}"
                        )));
                    };
                    let addr: SocketAddr = addr.parse().map_err(|_| {
                        RaftCacheError::Configuration(format!("invalid peer address: {addr}"))
                    })?;
                    config.peers.insert(id.to_string(), addr);
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| RaftCacheError::Configuration(format!("expected integer, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        RaftConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_heartbeat_too_close_to_election_timeout() {
        let mut config = RaftConfig::default();
        config.heartbeat_interval = Duration::from_millis(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_roundtrips_basic_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raftcache.conf");
        fs::write(
            &path,
            "node_id = n2\nheartbeat_interval_ms = 50\nelection_timeout_min_ms = 150\nelection_timeout_max_ms = 300\npeer = n1@127.0.0.1:9001\n",
        )
        .unwrap();

        let config = RaftConfig::from_file(&path).unwrap();
        assert_eq!(config.node_id, "n2");
        assert_eq!(config.peers.get("n1").unwrap().port(), 9001);
    }
}
