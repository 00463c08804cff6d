//! Performance benchmarks for the state synchronization hot paths

use client::interpolation::Interpolator;
use client::reconciliation::ReconciliationEngine;
use server::broadcaster::StateBroadcaster;
use server::game::World;
use server::profile::PerformanceProfile;
use server::scheduler::TickScheduler;
use shared::{
    decode_packet, encode_packet, Entity, EntityCategory, EntityKey, Packet, Scalar, Vec2,
};
use std::time::{Duration, Instant};

fn crowded_world(zombies: u32) -> World {
    let mut world = World::new();
    for client_id in 1..=8 {
        world.add_player(client_id);
    }
    for i in 0..zombies {
        let zombie = Entity::new((i % 80) as f32 * 20.0, (i / 80) as f32 * 20.0)
            .with_attribute("boss", Scalar::Bool(false));
        world.spawn(EntityCategory::Zombie, zombie);
    }
    world
}

fn shuffle_half(world: &mut World, step: u32) {
    for (id, zombie) in world.iter_category_mut(EntityCategory::Zombie) {
        if (id + step) % 2 == 0 {
            zombie.x += 1.5;
            zombie.angle += 0.1;
        }
    }
}

/// Benchmarks delta construction for a full high-profile zombie population
#[test]
fn benchmark_delta_construction() {
    let profile = PerformanceProfile::high();
    let mut world = crowded_world(profile.max_zombies as u32);
    let mut broadcaster = StateBroadcaster::for_profile(&profile);
    broadcaster.next_delta(&world);

    let iterations = 200;
    let start = Instant::now();

    for step in 0..iterations {
        world.tick += 1;
        shuffle_half(&mut world, step);
        let delta = broadcaster.next_delta(&world);
        assert!(!delta.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Delta construction: {} broadcasts of {} entities in {:?} ({:.2} μs/broadcast)",
        iterations,
        world.entities().values().map(|t| t.len()).sum::<usize>(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // A 30 Hz broadcast budget is 33 ms; stay far below it even in debug builds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks client-side delta application including validation
#[test]
fn benchmark_delta_application() {
    let profile = PerformanceProfile::high();
    let mut world = crowded_world(profile.max_zombies as u32);
    let mut broadcaster = StateBroadcaster::for_profile(&profile);

    let mut engine = ReconciliationEngine::new();
    engine.set_local_player(1);
    engine.on_snapshot(&broadcaster.snapshot(&world));
    broadcaster.next_delta(&world);

    let mut deltas = Vec::new();
    for step in 0..200 {
        world.tick += 1;
        shuffle_half(&mut world, step);
        deltas.push(broadcaster.next_delta(&world));
    }

    let start = Instant::now();
    for delta in &deltas {
        engine.on_delta(delta).unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Delta application: {} deltas in {:?} ({:.2} μs/delta)",
        deltas.len(),
        duration,
        duration.as_micros() as f64 / deltas.len() as f64
    );

    assert_eq!(engine.last_tick(), world.tick);
    assert!(duration.as_millis() < 3000);
}

/// Benchmarks the wire codec on full snapshots
#[test]
fn benchmark_snapshot_codec() {
    let world = crowded_world(300);
    let packet = Packet::Snapshot(world.snapshot());

    let iterations = 200;
    let start = Instant::now();
    let mut total_bytes = 0;

    for _ in 0..iterations {
        let bytes = encode_packet(&packet).unwrap();
        total_bytes += bytes.len();
        let decoded = decode_packet(&bytes).unwrap();
        assert!(matches!(decoded, Packet::Snapshot(_)));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} round trips, {} bytes each, in {:?}",
        iterations,
        total_bytes / iterations,
        duration
    );

    assert!(total_bytes / iterations < shared::MAX_PACKET_SIZE);
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks interpolator frames with every remote entity tracked
#[test]
fn benchmark_interpolation_frames() {
    let mut interpolator = Interpolator::new();
    let t0 = Instant::now();

    for id in 1..=300 {
        let key = EntityKey::new(EntityCategory::Zombie, id);
        interpolator.observe(key, Vec2::new(id as f32, 0.0), t0);
        interpolator.observe(
            key,
            Vec2::new(id as f32 + 2.0, 1.0),
            t0 + Duration::from_millis(33),
        );
    }

    let frames = 1_000;
    let start = Instant::now();
    for frame in 0..frames {
        interpolator.advance(t0 + Duration::from_millis(33 + (frame % 400) as u64));
    }
    let duration = start.elapsed();

    println!(
        "Interpolation: {} frames x {} entities in {:?} ({:.2} μs/frame)",
        frames,
        interpolator.len(),
        duration,
        duration.as_micros() as f64 / frames as f64
    );

    // 60 fps leaves 16 ms per frame
    assert!(duration.as_millis() < 2000);
}

/// Stress test for scheduler queries over a long session
#[test]
fn stress_test_scheduler_queries() {
    let scheduler = TickScheduler::new(PerformanceProfile::high());

    let ticks = 1_000_000u64;
    let start = Instant::now();
    let mut broadcasts = 0;
    let mut pathfinding = 0;

    for tick in 1..=ticks {
        if scheduler.should_broadcast(tick) {
            broadcasts += 1;
        }
        if scheduler.should_update_pathfinding(tick) {
            pathfinding += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Scheduler: {} ticks in {:?}, {} broadcasts, {} pathfinding updates",
        ticks, duration, broadcasts, pathfinding
    );

    assert_eq!(broadcasts, ticks / 2);
    assert_eq!(pathfinding, ticks / 2);
    assert!(duration.as_millis() < 2000);
}
