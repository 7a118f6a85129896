// Eviction policy benchmarks: victim selection cost under LRU versus the ML
// policy's fallback path, and bulk state machine apply throughput, mirroring
// the teacher's `buffer_pool_bench.rs` comparison-across-policies shape.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use raft_cache::config::RaftConfig;
use raft_cache::eviction::{EvictionPolicy, KeyFeatures, LruPolicy, MlPolicy};
use raft_cache::log::entry::{Command, LogEntry, Op};
use raft_cache::state_machine::StateMachine;

fn features(n: usize) -> Vec<KeyFeatures> {
    (0..n)
        .map(|i| KeyFeatures {
            key: format!("k{i}"),
            total_access_count: i as u64,
            last_access_ms: i as u64 * 10,
            access_count_hour: i as u64 % 20,
            access_count_day: i as u64 % 50,
            avg_interval_ms: 100,
        })
        .collect()
}

fn bench_select_victims(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_victims");
    let candidates = features(1_000);

    group.bench_function(BenchmarkId::new("lru", 1_000), |b| {
        let policy = LruPolicy::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| rt.block_on(policy.select_victims(black_box(&candidates), 50)));
    });

    group.bench_function(BenchmarkId::new("ml_fallback", 1_000), |b| {
        let policy = MlPolicy::new("http://127.0.0.1:1".to_string(), Duration::from_millis(10));
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| rt.block_on(policy.select_victims(black_box(&candidates), 50)));
    });

    group.finish();
}

fn bench_apply_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut config = RaftConfig::default();
    config.max_cache_size = 10_000;

    c.bench_function("apply_put_sequence", |b| {
        b.iter(|| {
            rt.block_on(async {
                let sm = StateMachine::new(&config, Arc::new(LruPolicy::new()));
                for i in 0..1_000u64 {
                    let command = Command {
                        client_id: "bench".to_string(),
                        seq: i + 1,
                        op: Op::Put {
                            key: format!("k{i}"),
                            value: vec![0u8; 64],
                        },
                    };
                    let entry = LogEntry::command(i + 1, 1, command.encode());
                    sm.apply(black_box(&entry)).await.unwrap();
                }
            })
        });
    });
}

criterion_group!(benches, bench_select_victims, bench_apply_throughput);
criterion_main!(benches);
