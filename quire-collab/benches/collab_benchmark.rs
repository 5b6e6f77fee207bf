use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quire_collab::{
    ClientMessage, GroupBroadcaster, PresenceRegistry, ResourceRef, ServerEvent,
};
use tokio::runtime::Runtime;
use uuid::Uuid;

fn bench_cursor_encode(c: &mut Criterion) {
    let resource = ResourceRef::board(Uuid::new_v4());

    c.bench_function("cursor_encode", |b| {
        b.iter(|| {
            let msg = ClientMessage::CursorPosition {
                resource: black_box(resource),
                x: black_box(320.5),
                y: black_box(480.25),
            };
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_cursor_decode(c: &mut Criterion) {
    let msg = ClientMessage::CursorPosition {
        resource: ResourceRef::board(Uuid::new_v4()),
        x: 320.5,
        y: 480.25,
    };
    let encoded = msg.encode().unwrap();

    c.bench_function("cursor_decode", |b| {
        b.iter(|| {
            black_box(ClientMessage::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_event_encode(c: &mut Criterion) {
    let event = ServerEvent::CursorPosition {
        resource: ResourceRef::board(Uuid::new_v4()),
        user_id: Uuid::new_v4(),
        x: 320.5,
        y: 480.25,
    };

    c.bench_function("event_encode", |b| {
        b.iter(|| {
            black_box(black_box(&event).encode().unwrap());
        })
    });
}

fn bench_registry_add(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = PresenceRegistry::new();
    let board = ResourceRef::board(Uuid::new_v4());

    c.bench_function("registry_add", |b| {
        b.iter(|| {
            rt.block_on(registry.add(
                black_box(board),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "Bench User",
            ));
        })
    });
}

fn bench_registry_snapshot_100_watchers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = PresenceRegistry::new();
    let board = ResourceRef::board(Uuid::new_v4());

    rt.block_on(async {
        for i in 0..100 {
            registry
                .add(board, Uuid::new_v4(), Uuid::new_v4(), &format!("User {i}"))
                .await;
        }
    });

    c.bench_function("registry_snapshot_100", |b| {
        b.iter(|| {
            let watchers = rt.block_on(registry.snapshot(black_box(board)));
            black_box(watchers);
        })
    });
}

fn bench_broadcast_100_subscribers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let broadcaster = Arc::new(GroupBroadcaster::new(256));
    let board = ResourceRef::board(Uuid::new_v4());

    // Receivers are held open but never drained; the channel drops old
    // frames for laggards, so send cost stays representative.
    let receivers: Vec<_> = rt.block_on(async {
        let mut rxs = Vec::new();
        for _ in 0..100 {
            rxs.push(broadcaster.subscribe(&board).await);
        }
        rxs
    });

    let event = ServerEvent::CursorPosition {
        resource: board,
        user_id: Uuid::new_v4(),
        x: 1.0,
        y: 2.0,
    };

    c.bench_function("broadcast_100_subscribers", |b| {
        b.iter(|| {
            let reached = rt
                .block_on(broadcaster.broadcast(black_box(&board), black_box(&event)))
                .unwrap();
            black_box(reached);
        })
    });

    drop(receivers);
}

criterion_group!(
    benches,
    bench_cursor_encode,
    bench_cursor_decode,
    bench_event_encode,
    bench_registry_add,
    bench_registry_snapshot_100_watchers,
    bench_broadcast_100_subscribers,
);
criterion_main!(benches);
