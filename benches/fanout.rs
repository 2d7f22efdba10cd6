//! Fan-out benchmarks for broadcast delivery.

use channelcast::{
    ChannelStore, Command, Document, DocumentKey, MemorySink, MemoryStore, StaticAuthProvider,
    SyncConfig, UiBridge, UiPort,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn create_clients(store: &Arc<MemoryStore>, count: usize) -> Vec<(UiBridge, UiPort)> {
    (0..count)
        .map(|i| {
            UiBridge::new(
                store.clone(),
                Arc::new(StaticAuthProvider::signed_in(format!("user-{i}"))),
                Arc::new(MemorySink::new()),
                SyncConfig::default(),
            )
            .unwrap()
        })
        .collect()
}

/// Benchmark one broadcast reaching N listening clients
fn bench_broadcast_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_fanout");

    for clients in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("clients", clients), &clients, |b, &n| {
            let store = Arc::new(MemoryStore::new());
            let mut bridges = create_clients(&store, n);
            let mut i = 0u64;

            b.iter(|| {
                i += 1;
                bridges[0].1.send(Command::Broadcast(format!("spotify:track:{i}")));
                for (bridge, port) in bridges.iter_mut() {
                    bridge.run_until_idle();
                    black_box(port.drain());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark channel-list delivery as the collection grows
fn bench_channel_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_list");

    for channels in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("channels", channels), &channels, |b, &n| {
            let store = Arc::new(MemoryStore::new());
            for i in 0..n {
                store
                    .set(
                        &DocumentKey::new("channels", format!("owner-{i}")),
                        Document::new()
                            .with("name", format!("Channel {i}"))
                            .with("nowPlayingURI", "spotify:track:0"),
                    )
                    .unwrap();
            }
            let mut clients = create_clients(&store, 1);
            let (bridge, port) = &mut clients[0];
            port.send(Command::GetChannels);
            bridge.run_until_idle();
            port.drain();

            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store
                    .update(
                        &DocumentKey::new("channels", "owner-0"),
                        Document::new().with("nowPlayingURI", format!("spotify:track:{i}")),
                    )
                    .unwrap();
                bridge.run_until_idle();
                black_box(port.drain());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_broadcast_fanout, bench_channel_list);
criterion_main!(benches);
