use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use roomcast::{ChatEvent, Connection, Identity, Relay, RoomId, RoomRegistry};
use tokio::sync::mpsc;

pub fn criterion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("room fan-out");
    for members in [1usize, 10, 100, 1000] {
        let relay = Relay::new(Arc::new(RoomRegistry::new()));
        let room = RoomId::new("benchmark").unwrap();

        let sender = runtime.block_on(async {
            let mut connections = Vec::with_capacity(members);
            for i in 0..members {
                let (tx, mut rx) = mpsc::channel(1024);
                // drain so the outboxes never fill up
                tokio::task::spawn(async move { while rx.recv().await.is_some() {} });
                let connection = Connection::new(Identity::new(i.to_string()), tx);
                relay.registry().register(&room, connection.clone()).await;
                connections.push(connection);
            }
            connections.swap_remove(0)
        });

        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, _| {
            b.to_async(&runtime).iter(|| {
                relay.process(
                    &sender,
                    ChatEvent::Message {
                        room: room.clone(),
                        text: "hello, world".to_owned(),
                    },
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
