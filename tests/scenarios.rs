//! End-to-end crossing and parking scenarios.

use junction_sim::communication::link::ChannelLink;
use junction_sim::communication::messages::{ControllerSignal, SimEvent};
use junction_sim::config::UnitRange;
use junction_sim::control_system::emergency::PreemptionCoordinator;
use junction_sim::monitoring::event_sink::{EventRecorder, EventSink};
use junction_sim::simulation_engine::intersections::{IntersectionId, IntersectionPair, LightColor};
use junction_sim::simulation_engine::parking::SkipReason;
use junction_sim::simulation_engine::vehicles::{Direction, Vehicle, VehicleType};
use junction_sim::{SimError, Simulation, SimulationConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};

const BLOCKED: Duration = Duration::from_millis(60);
const SOON: Duration = Duration::from_secs(3);

fn fast_config(vehicles: u32) -> SimulationConfig {
    SimulationConfig {
        vehicles,
        time_unit_ms: 5,
        light_phase_units: 4,
        spawn_delay_ms: UnitRange::new(0, 2),
        seed: Some(2024),
        ..SimulationConfig::default()
    }
}

fn vehicle(id: u32, vehicle_type: VehicleType, from: IntersectionId, to: IntersectionId, direction: Direction) -> Vehicle {
    Vehicle::new(id, vehicle_type, from, to, direction, false)
}

/// Replays the event stream and checks that a turning vehicle is always alone.
#[derive(Default)]
struct TurnExclusionCheck {
    inside: Mutex<HashMap<IntersectionId, HashMap<u32, Direction>>>,
    violations: Mutex<Vec<String>>,
}

impl EventSink for TurnExclusionCheck {
    fn publish(&self, event: SimEvent) {
        let mut inside = self.inside.lock().unwrap();
        match event {
            SimEvent::VehicleEntered {
                intersection,
                vehicle_id,
                direction,
                active_count,
                ..
            } => {
                let occupants = inside.entry(intersection).or_default();
                occupants.insert(vehicle_id, direction);
                let turning = occupants.values().any(|d| *d != Direction::Straight);
                if occupants.len() != active_count || (turning && occupants.len() != 1) {
                    self.violations
                        .lock()
                        .unwrap()
                        .push(format!("{intersection}: {occupants:?} (count {active_count})"));
                }
            }
            SimEvent::VehicleExited {
                intersection,
                vehicle_id,
            } => {
                inside.entry(intersection).or_default().remove(&vehicle_id);
            }
            _ => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_run_keeps_invariants() {
    let check = Arc::new(TurnExclusionCheck::default());
    let recorder = Arc::new(EventRecorder::new());
    let events = Arc::new(
        junction_sim::monitoring::event_sink::FanOut::new()
            .with(check.clone())
            .with(recorder.clone()),
    );

    let summary = timeout(
        Duration::from_secs(30),
        Simulation::new(fast_config(40), events).unwrap().run(),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.journeys.len() + summary.aborted, 40);
    assert_eq!(summary.aborted, 0);
    let violations = check.violations.lock().unwrap().clone();
    assert!(violations.is_empty(), "{violations:?}");

    for state in &summary.intersections {
        assert_eq!(state.active_count, 0);
        assert!(!state.emergency_preempt);
    }
    for parking in &summary.parking {
        assert_eq!(parking.current_occupancy, 0);
        assert_eq!(parking.free_spots, parking.max_spots);
        assert_eq!(parking.free_queue_slots, parking.max_queue);
    }

    let entered = recorder.count(|e| matches!(e, SimEvent::VehicleEntered { .. }));
    let exited = recorder.count(|e| matches!(e, SimEvent::VehicleExited { .. }));
    assert_eq!(entered, exited);
    // Both controllers at least saw their shutdown signal.
    assert!(summary.signals_relayed >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_queue_means_nobody_parks() {
    let config = SimulationConfig {
        parking_queue: 0,
        ..fast_config(20)
    };
    let summary = timeout(
        Duration::from_secs(30),
        Simulation::new(config, Arc::new(EventRecorder::new())).unwrap().run(),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.parked(), 0);
    assert!(summary
        .journeys
        .iter()
        .filter_map(|j| j.parking_skipped)
        .all(|reason| reason == SkipReason::QueueFull));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abort_releases_blocked_agents() {
    // A is GREEN and B RED for the whole run; stays are far longer than the test.
    let config = SimulationConfig {
        time_unit_ms: 20,
        light_phase_units: 500,
        parking_units: UnitRange::new(1000, 1000),
        spawn_delay_ms: UnitRange::new(0, 0),
        ..fast_config(8)
    };
    let stuck_at_b = (1..=4).map(|id| {
        vehicle(id, VehicleType::Car, IntersectionId::B, IntersectionId::B, Direction::Straight)
    });
    let parked_at_a = (5..=8).map(|id| {
        Vehicle::new(id, VehicleType::Car, IntersectionId::A, IntersectionId::A, Direction::Straight, true)
    });
    let vehicles = stuck_at_b.chain(parked_at_a).collect();

    let simulation = Simulation::new(config, Arc::new(EventRecorder::new())).unwrap();
    let handle = simulation.shutdown_handle();
    let run = tokio::spawn(simulation.run_vehicles(vehicles));
    sleep(Duration::from_millis(300)).await;
    handle.abort();

    let summary = timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.aborted, 4);
    assert_eq!(summary.journeys.len(), 4);
    assert_eq!(summary.parked(), 4);
    for state in &summary.intersections {
        assert!(state.closed);
        assert_eq!(state.active_count, 0);
    }
    for parking in &summary.parking {
        assert_eq!(parking.current_occupancy, 0);
        assert_eq!(parking.free_spots, parking.max_spots);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn emergency_holds_destination_until_it_leaves() {
    let pair = IntersectionPair::new(Arc::new(EventRecorder::new()));
    let (link, _to_a, mut to_b) = ChannelLink::new();
    let coordinator = PreemptionCoordinator::new(pair.clone(), Arc::new(link));
    pair.b.set_light(LightColor::Green);

    let ambulance = vehicle(1, VehicleType::Ambulance, IntersectionId::A, IntersectionId::B, Direction::Straight);
    let car = vehicle(2, VehicleType::Car, IntersectionId::B, IntersectionId::B, Direction::Left);

    assert!(coordinator.notify(ambulance.origin, ambulance.destination));
    assert!(pair.b.is_preempted());
    assert_eq!(to_b.recv().await, Some(ControllerSignal::EmergencyIncoming));

    let blocked = {
        let b = Arc::clone(&pair.b);
        let car = car.clone();
        tokio::spawn(async move { b.enter(&car).await })
    };
    sleep(BLOCKED).await;
    assert!(!blocked.is_finished());

    // The ambulance crosses its origin on RED, then its destination under its own preemption.
    timeout(SOON, pair.a.enter(&ambulance)).await.unwrap().unwrap();
    pair.a.leave(&ambulance);
    timeout(SOON, pair.b.enter(&ambulance)).await.unwrap().unwrap();
    sleep(BLOCKED).await;
    assert!(!blocked.is_finished());
    pair.b.leave(&ambulance);

    // Still preempted: the car keeps waiting until the preemption is cleared.
    sleep(BLOCKED).await;
    assert!(!blocked.is_finished());

    coordinator.clear(ambulance.origin, ambulance.destination);
    timeout(SOON, blocked).await.unwrap().unwrap().unwrap();
    assert_eq!(pair.b.snapshot().active_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn preemption_is_scoped_to_one_intersection() {
    let pair = IntersectionPair::new(Arc::new(EventRecorder::new()));
    pair.a.set_light(LightColor::Green);
    pair.b.set_emergency_preempt(true);

    let car_at_a = vehicle(1, VehicleType::Car, IntersectionId::A, IntersectionId::A, Direction::Right);
    let fire_at_b = vehicle(2, VehicleType::FireTruck, IntersectionId::B, IntersectionId::B, Direction::Left);

    timeout(SOON, pair.a.enter(&car_at_a)).await.unwrap().unwrap();
    timeout(SOON, pair.b.enter(&fire_at_b)).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_compatible_waiter_gets_through() {
    let pair = IntersectionPair::new(Arc::new(EventRecorder::new()));
    let a = Arc::clone(&pair.a);

    let mut waiters = Vec::new();
    for id in 0..16 {
        let direction = Direction::ALL[id as usize % 3];
        let v = vehicle(id, VehicleType::Bike, IntersectionId::A, IntersectionId::A, direction);
        let a = Arc::clone(&a);
        waiters.push(tokio::spawn(async move {
            a.enter(&v).await?;
            sleep(Duration::from_millis(2)).await;
            a.leave(&v);
            Ok::<_, SimError>(())
        }));
    }
    sleep(BLOCKED).await;
    assert_eq!(a.snapshot().active_count, 0);

    a.set_light(LightColor::Green);
    for waiter in waiters {
        timeout(SOON, waiter).await.unwrap().unwrap().unwrap();
    }
    assert_eq!(a.snapshot().active_count, 0);
}
