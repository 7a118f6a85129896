// Scenario 5, spec section 8: "Lease read latency". A LEASE read must be
// answered locally, without the heartbeat round STRONG pays for, so its
// average latency over a run of reads must come in below STRONG's.

mod common;

use std::time::{Duration, Instant};

use common::{put, ClusterHarness};
use raft_cache::read_path::{read, Consistency};

async fn average_latency(node: &std::sync::Arc<raft_cache::node::RaftNode>, key: &str, consistency: Consistency, iterations: u32) -> Duration {
    let mut total = Duration::ZERO;
    for _ in 0..iterations {
        let start = Instant::now();
        let result = read(node, key, consistency).await.unwrap();
        total += start.elapsed();
        assert_eq!(result.value, b"v1");
    }
    total / iterations
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn lease_reads_are_faster_than_strong_reads_and_agree_in_value() {
    let cluster = ClusterHarness::start(3).await;
    let leader = cluster.wait_for_leader(Duration::from_millis(800)).await;

    put(&leader, "k", b"v1", "c1", 1).await.unwrap();

    // Let a lease round land: the first STRONG-equivalent heartbeat after the
    // write grants it, so a couple of quiet cycles guarantee one is live.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let strong_avg = average_latency(&leader, "k", Consistency::Strong, 10).await;
    let lease_avg = average_latency(&leader, "k", Consistency::Lease, 10).await;

    assert!(
        lease_avg < strong_avg,
        "expected lease reads ({lease_avg:?}) to beat strong reads ({strong_avg:?})"
    );
}
