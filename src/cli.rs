//! raft-cache CLI
//!
//! Minimal interactive client exercising the PUT/GET/DELETE contract
//! (spec section 6) against a node constructed in-process from a config
//! file. Grounded on the teacher's `cli.rs` REPL shape (prompt, read line,
//! dispatch, print) rather than its wire protocol, since this crate's
//! client contract is abstract and not HTTP/SQL-specific.

use std::path::PathBuf;
use std::sync::Arc;

use raft_cache::config::RaftConfig;
use raft_cache::eviction::LruPolicy;
use raft_cache::interfaces::CacheClient;
use raft_cache::node::RaftNode;
use raft_cache::read_path::Consistency;
use raft_cache::transport::{TcpConfig, TcpTransport};
use raft_cache::Result;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    println!("raft-cache CLI");

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("raftcache.conf"));
    let config = if config_path.exists() {
        RaftConfig::from_file(&config_path)?
    } else {
        println!("no config file at {config_path:?}, using defaults");
        RaftConfig::default()
    };

    std::fs::create_dir_all(&config.data_dir)?;

    let mut tcp_config = TcpConfig::default();
    tcp_config.bind_addr = "127.0.0.1:0".parse().unwrap();
    let mut transport = TcpTransport::new(tcp_config);
    transport.bind().await?;

    let node = RaftNode::new(config, Arc::new(transport), Arc::new(LruPolicy::new())).await?;
    node.spawn_workers();
    let client = CacheClient::new(node);

    println!("Commands: put <key> <value> | get <key> [strong|lease|eventual] | delete <key> | exit");

    let mut reader = BufReader::new(stdin());
    let mut line = String::new();
    let mut seq = 0u64;

    loop {
        print!("raft-cache> ");
        std::io::Write::flush(&mut std::io::stdout()).ok();

        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let words: Vec<&str> = line.trim().split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        seq += 1;
        match words[0] {
            "exit" | "quit" => break,
            "put" if words.len() >= 3 => {
                let key = words[1].to_string();
                let value = words[2..].join(" ").into_bytes();
                match client.put(key, value, "cli".to_string(), seq).await {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERROR: {e}"),
                }
            }
            "delete" if words.len() == 2 => match client.delete(words[1].to_string(), "cli".to_string(), seq).await {
                Ok(()) => println!("OK"),
                Err(e) => println!("ERROR: {e}"),
            },
            "get" if words.len() >= 2 => {
                let consistency = match words.get(2).copied() {
                    Some("lease") => Consistency::Lease,
                    Some("eventual") => Consistency::Eventual,
                    _ => Consistency::Strong,
                };
                match client.get(words[1], consistency).await {
                    Ok(result) => println!(
                        "{} (served_by={}, consistency={:?}, lease_remaining_ms={:?})",
                        String::from_utf8_lossy(&result.value),
                        result.served_by,
                        result.consistency,
                        result.lease_remaining_ms
                    ),
                    Err(e) => println!("ERROR: {e}"),
                }
            }
            _ => println!("unrecognized command"),
        }
    }

    println!("bye");
    Ok(())
}
