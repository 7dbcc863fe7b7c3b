//! A vehicle agent drives one vehicle through the crossing protocol:
//! parking reservation, approach, entry, crossing, exit, preemption clearing, parking.

use crate::communication::messages::SimEvent;
use crate::config::SimulationConfig;
use crate::control_system::emergency::PreemptionCoordinator;
use crate::error::Result;
use crate::monitoring::event_sink::EventSink;
use crate::simulation_engine::intersections::{IntersectionId, IntersectionPair};
use crate::simulation_engine::parking::{ParkingPair, ParkingSpot, Reservation, SkipReason};
use crate::simulation_engine::vehicles::{Vehicle, VehicleType};
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Everything an agent shares with the rest of the simulation.
pub struct AgentContext {
    pub intersections: IntersectionPair,
    pub parking: ParkingPair,
    pub coordinator: PreemptionCoordinator,
    pub events: Arc<dyn EventSink>,
    pub config: SimulationConfig,
}

/// Outcome of one completed journey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyReport {
    pub vehicle_id: u32,
    pub vehicle_type: VehicleType,
    /// Total time spent blocked in `enter`.
    pub waited: Duration,
    pub parked: bool,
    pub parking_skipped: Option<SkipReason>,
}

/// Releases the preemption this agent set, even if the journey is cut short.
struct PreemptGuard<'a> {
    coordinator: &'a PreemptionCoordinator,
    from: IntersectionId,
    to: IntersectionId,
    active: bool,
}

impl PreemptGuard<'_> {
    fn clear(&mut self) {
        if self.active {
            self.coordinator.clear(self.from, self.to);
            self.active = false;
        }
    }
}

impl Drop for PreemptGuard<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Runs the full journey of `vehicle`.
///
/// Every vehicle crosses its origin; a vehicle bound for the other intersection then
/// crosses that one too. Parking, when wanted, is reserved up front at the
/// origin's lot and used once the last crossing is done.
pub async fn simulate_vehicle_journey(
    vehicle: Vehicle,
    ctx: Arc<AgentContext>,
) -> Result<JourneyReport> {
    info!(
        "[{vehicle}] {} -> {}, {} (priority {}), parking: {}",
        vehicle.origin,
        vehicle.destination,
        vehicle.direction,
        vehicle.priority(),
        if vehicle.wants_parking { "yes" } else { "no" }
    );

    let (crossing, dwell) = {
        let mut rng = rand::rng();
        (
            ctx.config.units(ctx.config.crossing_units.sample(&mut rng)),
            ctx.config.units(ctx.config.parking_units.sample(&mut rng)),
        )
    };

    let pool = ctx.parking.get(vehicle.origin);
    let mut parking_skipped = None;
    let spot = if vehicle.wants_parking {
        match pool.try_reserve(&vehicle).await {
            Reservation::Reserved(spot) => Some(spot),
            Reservation::Skipped(reason) => {
                warn!("[{vehicle}] could not reserve parking ({reason}) - will pass through");
                parking_skipped = Some(reason);
                None
            }
        }
    } else {
        None
    };

    let mut preempt = PreemptGuard {
        coordinator: &ctx.coordinator,
        from: vehicle.origin,
        to: vehicle.destination,
        active: false,
    };
    if vehicle.is_emergency() && vehicle.is_cross_move() {
        preempt.active = ctx.coordinator.notify(vehicle.origin, vehicle.destination);
    }

    let mut route = vec![vehicle.origin];
    if vehicle.is_cross_move() {
        route.push(vehicle.destination);
    }

    let mut waited = Duration::ZERO;
    for id in route {
        match cross(&ctx, id, &vehicle, crossing).await {
            Ok(wait) => waited += wait,
            Err(e) => {
                if let Some(spot) = spot {
                    pool.release(spot);
                }
                return Err(e);
            }
        }
    }
    preempt.clear();

    let parked = spot.is_some();
    if let Some(spot) = spot {
        park(&ctx, spot, dwell).await;
    }

    info!("[{vehicle}] journey completed, waited {waited:?}");
    Ok(JourneyReport {
        vehicle_id: vehicle.id,
        vehicle_type: vehicle.vehicle_type,
        waited,
        parked,
        parking_skipped,
    })
}

/// Approaches, enters, crosses and leaves one intersection. Returns the time spent waiting.
async fn cross(
    ctx: &AgentContext,
    id: IntersectionId,
    vehicle: &Vehicle,
    crossing: Duration,
) -> Result<Duration> {
    let intersection = ctx.intersections.get(id);
    intersection.announce_approach(vehicle);

    let started = Instant::now();
    intersection.enter(vehicle).await?;
    let waited = started.elapsed();

    sleep(crossing).await;
    intersection.leave(vehicle);
    Ok(waited)
}

async fn park(ctx: &AgentContext, spot: ParkingSpot, dwell: Duration) {
    let pool = ctx.parking.get(spot.pool());
    ctx.events.publish(SimEvent::ParkingChanged {
        vehicle_id: spot.vehicle_id(),
        entering: true,
    });
    let vehicle_id = spot.vehicle_id();
    pool.park_and_release(spot, dwell).await;
    ctx.events.publish(SimEvent::ParkingChanged {
        vehicle_id,
        entering: false,
    });
}
