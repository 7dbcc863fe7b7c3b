// benches/bench_parking_reserve.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use junction_sim::monitoring::event_sink::LogSink;
use junction_sim::simulation_engine::intersections::{Intersection, IntersectionId};
use junction_sim::simulation_engine::parking::ParkingPool;
use junction_sim::simulation_engine::vehicles::{Direction, Vehicle, VehicleType};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn parker(id: u32) -> Vehicle {
    Vehicle::new(id, VehicleType::Car, IntersectionId::B, IntersectionId::B, Direction::Straight, true)
}

fn bench_parking_reserve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let intersection = Arc::new(Intersection::new(IntersectionId::B, Arc::new(LogSink)));

    let mut group = c.benchmark_group("parking_reserve");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    // Reserve then release on a pool with free spots.
    let pool = ParkingPool::new(Arc::clone(&intersection), 10, 5);
    let vehicle = parker(1);
    group.bench_function("free_spot", |b| {
        b.iter(|| {
            rt.block_on(async {
                if let Some(spot) = pool.try_reserve(black_box(&vehicle)).await.into_spot() {
                    pool.release(spot);
                }
            })
        })
    });

    // One spot held, one vehicle queued behind it: every further attempt is turned away.
    let full = Arc::new(ParkingPool::new(Arc::clone(&intersection), 1, 1));
    let holder = rt
        .block_on(full.try_reserve(&parker(2)))
        .into_spot()
        .unwrap();
    let queued = {
        let full = Arc::clone(&full);
        rt.spawn(async move { full.try_reserve(&parker(3)).await })
    };
    while full.snapshot().free_queue_slots > 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
    group.bench_function("queue_full", |b| {
        b.iter(|| rt.block_on(async { black_box(full.try_reserve(&vehicle).await.skip_reason()) }))
    });
    full.release(holder);
    if let Some(spot) = rt.block_on(queued).unwrap().into_spot() {
        full.release(spot);
    }

    group.finish();
}

criterion_group!(benches, bench_parking_reserve);
criterion_main!(benches);
