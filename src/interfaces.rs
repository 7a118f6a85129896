// External client contract (spec section 6, "Client contract"). Thin,
// transport-agnostic surface over `RaftNode`/`read_path`; the CLI binary is
// the only thing in this crate that currently drives it over a real wire,
// but it is written so an HTTP or gRPC front end could sit on top unchanged.

use std::sync::Arc;

use crate::log::entry::{Command, Op};
use crate::node::RaftNode;
use crate::read_path::{self, Consistency, ReadResult};
use crate::error::Result;

pub struct CacheClient {
    node: Arc<RaftNode>,
}

impl CacheClient {
    pub fn new(node: Arc<RaftNode>) -> Self {
        Self { node }
    }

    pub async fn put(&self, key: String, value: Vec<u8>, client_id: String, seq: u64) -> Result<()> {
        let command = Command {
            client_id,
            seq,
            op: Op::Put { key, value },
        };
        self.node.submit(command).await
    }

    pub async fn delete(&self, key: String, client_id: String, seq: u64) -> Result<()> {
        let command = Command {
            client_id,
            seq,
            op: Op::Delete { key },
        };
        self.node.submit(command).await
    }

    pub async fn get(&self, key: &str, consistency: Consistency) -> Result<ReadResult> {
        read_path::read(&self.node, key, consistency).await
    }
}
