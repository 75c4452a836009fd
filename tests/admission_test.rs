//! Integration tests for pump admission.
//!
//! These tests validate:
//! 1. The number of holders never exceeds the pump count
//! 2. Queued callers are served in arrival order
//! 3. A cancelled wait leaves the available count untouched
//! 4. Async tasks and OS threads share one queue
//! 5. A release racing a cancelled wait hands the slot back exactly once
//! 6. The station bounds total refuel time for a whole fleet
//! 7. A vehicle busy with other work never keeps a pump from an idle one

use fleet_dispatch::builders::build_fleet;
use fleet_dispatch::config::{FleetConfig, VehicleSpec};
use fleet_dispatch::core::{Action, EntityId, FleetError, ResourcePool, VehicleKind, VehicleState};
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn fleet_config(vehicles: u64, pumps: u32) -> FleetConfig {
    FleetConfig {
        pumps,
        short_effect_ms: 500,
        long_effect_ms: 2000,
        log_notifications: false,
        vehicles: (1..=vehicles)
            .map(|id| VehicleSpec {
                id,
                kind: VehicleKind::Car,
                make: format!("Make-{id}"),
                model: "Sedan".to_string(),
                year: 2020,
            })
            .collect(),
        ..FleetConfig::default()
    }
}

// ============================================================================
// CAPACITY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_holders_never_exceed_capacity() {
    let pool = ResourcePool::new(3).unwrap();
    let inside = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut rng = rand::rng();
    let durations: Vec<u64> = (0..24).map(|_| rng.random_range(5..60)).collect();

    let mut handles = Vec::new();
    for ms in durations {
        let pool = pool.clone();
        let inside = Arc::clone(&inside);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let _permit = pool.acquire(&CancellationToken::new()).await.unwrap();
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 3);
    let stats = pool.stats();
    assert_eq!(stats.available, 3);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.peak_in_use, 3);
    assert_eq!(stats.acquired_total, 24);
}

#[tokio::test(start_paused = true)]
async fn test_waiters_are_served_in_arrival_order() {
    let pool = ResourcePool::new(1).unwrap();
    let gate = pool.acquire(&CancellationToken::new()).await.unwrap();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let _permit = pool.acquire(&CancellationToken::new()).await.unwrap();
            order.lock().push(i);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }));
        // Let the task reach the queue before the next one starts.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(pool.stats().waiting, 5);
    drop(gate);
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_try_acquire_fails_fast_when_full() {
    let pool = ResourcePool::new(1).unwrap();
    let held = pool.try_acquire().unwrap();
    assert!(matches!(
        pool.try_acquire(),
        Err(FleetError::CapacityExhausted { in_use: 1, capacity: 1 })
    ));
    drop(held);
    assert!(pool.try_acquire().is_ok());
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_leaves_available_unchanged() {
    let pool = ResourcePool::new(1).unwrap();
    let held = pool.acquire(&CancellationToken::new()).await.unwrap();
    assert_eq!(pool.available(), 0);

    let token = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let token = token.clone();
        tokio::spawn(async move { pool.acquire(&token).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(pool.stats().waiting, 1);

    token.cancel();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(pool.available(), 0);
    assert_eq!(pool.stats().waiting, 0);
    assert_eq!(pool.stats().cancelled_waits, 1);

    drop(held);
    assert_eq!(pool.available(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_queue_lets_later_waiters_through() {
    let pool = ResourcePool::new(1).unwrap();
    let held = pool.acquire(&CancellationToken::new()).await.unwrap();

    let doomed = CancellationToken::new();
    let first = {
        let pool = pool.clone();
        let token = doomed.clone();
        tokio::spawn(async move { pool.acquire(&token).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    let second = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(&CancellationToken::new()).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    doomed.cancel();
    drop(held);
    assert!(first.await.unwrap().unwrap_err().is_cancelled());
    second.await.unwrap().unwrap();
    assert_eq!(pool.available(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_release_racing_cancel_hands_slot_back_once() {
    let pool = ResourcePool::new(1).unwrap();

    for _ in 0..2_000 {
        let held = pool.acquire(&CancellationToken::new()).await.unwrap();
        let token = CancellationToken::new();
        let waiter = {
            let pool = pool.clone();
            let token = token.clone();
            tokio::spawn(async move { pool.acquire(&token).await })
        };
        while pool.stats().waiting == 0 {
            tokio::task::yield_now().await;
        }

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let releaser = {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                drop(held);
            })
        };
        let canceller = std::thread::spawn(move || {
            barrier.wait();
            token.cancel();
        });
        releaser.join().unwrap();
        canceller.join().unwrap();

        // The waiter either got the slot or gave it back; never both.
        match waiter.await.unwrap() {
            Ok(permit) => drop(permit),
            Err(err) => assert!(err.is_cancelled()),
        }
        let stats = pool.stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.waiting, 0);
    }
}

// ============================================================================
// MIXED ASYNC AND BLOCKING CALLERS
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_thread_waits_behind_async_holder() {
    let pool = ResourcePool::new(1).unwrap();
    let held = pool.acquire(&CancellationToken::new()).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let thread = {
        let pool = pool.clone();
        std::thread::spawn(move || {
            let permit = pool.acquire_blocking();
            let _ = tx.send(());
            drop(permit);
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.stats().waiting, 1);
    drop(held);

    rx.await.unwrap();
    thread.join().unwrap();
    assert_eq!(pool.available(), 1);
}

// ============================================================================
// STATION SCENARIO
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_five_vehicles_two_pumps_run_in_three_waves() {
    let cfg = fleet_config(5, 2);
    let fleet = build_fleet(&cfg, None).unwrap();
    let one = Duration::from_millis(cfg.long_effect_ms);

    let start = Instant::now();
    let report = fleet.refuel_fleet(&CancellationToken::new()).await;
    let elapsed = start.elapsed();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.completed.len(), 5);
    assert!(elapsed >= one * 3, "finished too fast: {elapsed:?}");
    assert!(elapsed < one * 5, "pumps were not shared: {elapsed:?}");
    assert_eq!(fleet.pool_stats().peak_in_use, 2);
    assert!(fleet.snapshot().iter().all(|e| e.state == VehicleState::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_fleet_refuel_releases_every_pump() {
    let fleet = build_fleet(&fleet_config(6, 2), None).unwrap();
    let token = CancellationToken::new();

    let run = {
        let fleet = fleet.clone();
        let token = token.clone();
        tokio::spawn(async move { fleet.refuel_fleet(&token).await })
    };
    tokio::time::sleep(Duration::from_millis(2500)).await;
    token.cancel();
    let report = run.await.unwrap();

    // First wave finished, second wave interrupted mid-refuel, rest cancelled in the queue.
    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.cancelled.len(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(fleet.pool_stats().available, 2);
    assert!(fleet.snapshot().iter().all(|e| e.state == VehicleState::Idle));
    assert!(fleet.in_flight().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_busy_vehicle_does_not_hold_a_pump() {
    let cfg = fleet_config(2, 1);
    let fleet = build_fleet(&cfg, None).unwrap();
    let one = Duration::from_millis(cfg.long_effect_ms);
    let token = CancellationToken::new();

    let repair = {
        let fleet = fleet.clone();
        let token = token.clone();
        tokio::spawn(async move { fleet.apply(EntityId(1), Action::Repair, &token).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    let busy_refuel = {
        let fleet = fleet.clone();
        let token = token.clone();
        tokio::spawn(async move { fleet.refuel_at_station(EntityId(1), &token).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    // Vehicle 1 waits for its own turn, not at the station.
    assert_eq!(fleet.pool_stats().available, 1);

    let start = Instant::now();
    fleet.refuel_at_station(EntityId(2), &token).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= one, "refuel was too short: {elapsed:?}");
    assert!(elapsed < one + one / 2, "idle vehicle waited behind a repair: {elapsed:?}");

    repair.await.unwrap().unwrap();
    // Under maintenance after the repair, so the refuel is refused.
    let err = busy_refuel.await.unwrap().unwrap_err();
    assert!(matches!(err, FleetError::IllegalTransition { .. }));
    assert_eq!(fleet.pool_stats().acquired_total, 1);
}

#[tokio::test(start_paused = true)]
async fn test_active_vehicle_is_rejected_without_queueing() {
    let fleet = build_fleet(&fleet_config(2, 1), None).unwrap();
    let token = CancellationToken::new();
    fleet.apply(EntityId(1), Action::Drive, &token).await.unwrap();

    let occupant = {
        let fleet = fleet.clone();
        let token = token.clone();
        tokio::spawn(async move { fleet.refuel_at_station(EntityId(2), &token).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(fleet.pool_stats().available, 0);

    let start = Instant::now();
    let err = fleet.refuel_at_station(EntityId(1), &token).await.unwrap_err();
    assert!(matches!(
        err,
        FleetError::IllegalTransition { state: VehicleState::Active, .. }
    ));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(fleet.pool_stats().waiting, 0);

    occupant.await.unwrap().unwrap();
}
