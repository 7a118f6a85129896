// Scenario 2, spec section 8: "Leader failure". 3 nodes, 3 writes, kill the
// leader, a new one must emerge among the survivors within 600 ms with no
// lost commits.

mod common;

use std::time::Duration;

use common::{eventual_get, put, strong_get, ClusterHarness};
use raft_cache::node::RaftRole;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn new_leader_emerges_after_leader_failure_with_no_lost_commits() {
    let cluster = ClusterHarness::start(3).await;
    let leader = cluster.wait_for_leader(Duration::from_millis(800)).await;

    put(&leader, "a", b"1", "c1", 1).await.unwrap();
    put(&leader, "b", b"2", "c1", 2).await.unwrap();
    put(&leader, "c", b"3", "c1", 3).await.unwrap();

    let committed_before_kill = leader.core.read().await.commit_index;
    let old_leader_id = leader.node_id.clone();
    leader.request_shutdown();

    let survivors: Vec<_> = cluster
        .nodes
        .iter()
        .filter(|n| n.node_id != old_leader_id)
        .cloned()
        .collect();

    let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
    let new_leader = loop {
        let mut found = None;
        for node in &survivors {
            if node.core.read().await.role == RaftRole::Leader {
                found = Some(node.clone());
                break;
            }
        }
        if let Some(node) = found {
            break node;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("no new leader emerged among survivors within 600ms");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_ne!(new_leader.node_id, old_leader_id);

    for node in &survivors {
        let commit_index = node.core.read().await.commit_index;
        assert!(
            commit_index >= committed_before_kill,
            "survivor {} regressed commit_index: {commit_index} < {committed_before_kill}",
            node.node_id
        );
    }

    assert_eq!(strong_get(&new_leader, "a").await.unwrap(), b"1");
    assert_eq!(strong_get(&new_leader, "b").await.unwrap(), b"2");
    assert_eq!(strong_get(&new_leader, "c").await.unwrap(), b"3");

    for node in &survivors {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        loop {
            if eventual_get(node, "c").await.is_ok() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("survivor {} never applied key 'c'", node.node_id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(eventual_get(node, "a").await.unwrap(), b"1");
        assert_eq!(eventual_get(node, "b").await.unwrap(), b"2");
        assert_eq!(eventual_get(node, "c").await.unwrap(), b"3");
    }
}
