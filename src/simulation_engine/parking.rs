//! Bounded parking attached to an intersection.
//!
//! Two independent counting resources: `spots` (held for the whole stay) and
//! `queue` (held only while waiting for a spot). A reservation is refused outright
//! when the queue is full or the owning intersection is under emergency preemption.
//!
//! `occupancy` is the source of truth for snapshots: a permit is always taken before
//! the count goes up and given back while the count's lock is still held.

use crate::simulation_engine::intersections::{Intersection, IntersectionId};
use crate::simulation_engine::vehicles::Vehicle;
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;

/// Why a vehicle did not get a parking spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmergencyPreempt,
    QueueFull,
    Shutdown,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmergencyPreempt => f.write_str("emergency preemption active"),
            SkipReason::QueueFull => f.write_str("parking queue full"),
            SkipReason::Shutdown => f.write_str("parking closed"),
        }
    }
}

/// A held parking spot. Must be handed back through [`ParkingPool::release`].
#[must_use = "a reserved spot stays occupied until released"]
#[derive(Debug)]
pub struct ParkingSpot {
    vehicle_id: u32,
    pool: IntersectionId,
    permit: OwnedSemaphorePermit,
}

impl ParkingSpot {
    pub fn vehicle_id(&self) -> u32 {
        self.vehicle_id
    }

    pub fn pool(&self) -> IntersectionId {
        self.pool
    }
}

#[derive(Debug)]
pub enum Reservation {
    Reserved(ParkingSpot),
    Skipped(SkipReason),
}

impl Reservation {
    pub fn into_spot(self) -> Option<ParkingSpot> {
        match self {
            Reservation::Reserved(spot) => Some(spot),
            Reservation::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Reservation::Reserved(_) => None,
            Reservation::Skipped(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkingSnapshot {
    pub max_spots: usize,
    pub max_queue: usize,
    pub free_spots: usize,
    pub free_queue_slots: usize,
    pub current_occupancy: usize,
}

pub struct ParkingPool {
    name: String,
    max_spots: usize,
    max_queue: usize,
    spots: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    occupancy: Mutex<usize>,
    closed: watch::Sender<bool>,
    intersection: Arc<Intersection>,
}

impl ParkingPool {
    pub fn new(intersection: Arc<Intersection>, max_spots: usize, max_queue: usize) -> Self {
        Self {
            name: format!("{} Parking Lot", intersection.id()),
            max_spots,
            max_queue,
            spots: Arc::new(Semaphore::new(max_spots)),
            queue: Arc::new(Semaphore::new(max_queue)),
            occupancy: Mutex::new(0),
            closed: watch::Sender::new(false),
            intersection,
        }
    }

    pub fn id(&self) -> IntersectionId {
        self.intersection.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn occupancy(&self) -> MutexGuard<'_, usize> {
        self.occupancy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ParkingSnapshot {
        let current_occupancy = *self.occupancy();
        ParkingSnapshot {
            max_spots: self.max_spots,
            max_queue: self.max_queue,
            free_spots: self.max_spots.saturating_sub(current_occupancy),
            free_queue_slots: self.queue.available_permits(),
            current_occupancy,
        }
    }

    /// Tries to reserve a spot for `vehicle`.
    ///
    /// Never blocks when refusing. Once a queue slot is taken, waits for a spot,
    /// then gives the queue slot back.
    pub async fn try_reserve(&self, vehicle: &Vehicle) -> Reservation {
        debug!("[{vehicle}] requesting parking at {}", self.name);

        // Racy by nature: preemption may flip right after this read.
        if self.intersection.is_preempted() {
            warn!("[{vehicle}] emergency preemption active at {} - skipping parking", self.id());
            return Reservation::Skipped(SkipReason::EmergencyPreempt);
        }

        let queue_slot = match Arc::clone(&self.queue).try_acquire_owned() {
            Ok(slot) => slot,
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                warn!("[{vehicle}] {} queue full - skipping parking", self.name);
                return Reservation::Skipped(SkipReason::QueueFull);
            }
            Err(tokio::sync::TryAcquireError::Closed) => {
                return Reservation::Skipped(SkipReason::Shutdown);
            }
        };
        debug!("[{vehicle}] waiting for a free spot at {}", self.name);

        let permit = match Arc::clone(&self.spots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                debug!("[{vehicle}] {} closed while waiting for a spot", self.name);
                return Reservation::Skipped(SkipReason::Shutdown);
            }
        };
        drop(queue_slot);

        let using_now = {
            let mut occupancy = self.occupancy();
            *occupancy += 1;
            *occupancy
        };
        info!(
            "[{vehicle}] reserved parking spot at {} ({using_now}/{} occupied)",
            self.name, self.max_spots
        );

        Reservation::Reserved(ParkingSpot {
            vehicle_id: vehicle.id,
            pool: self.id(),
            permit,
        })
    }

    /// Returns a spot to the pool, waking one vehicle waiting for it.
    pub fn release(&self, spot: ParkingSpot) {
        debug_assert_eq!(spot.pool, self.id(), "spot released to the wrong pool");
        let ParkingSpot {
            vehicle_id, permit, ..
        } = spot;
        let using_now = {
            let mut occupancy = self.occupancy();
            *occupancy = occupancy.saturating_sub(1);
            drop(permit);
            *occupancy
        };
        info!(
            "[V{}] left parking at {} ({using_now}/{} occupied)",
            vehicle_id, self.name, self.max_spots
        );
    }

    /// Stays parked for `dwell`, then releases the spot. Leaves early if the pool
    /// is closed in the meantime; returns `false` in that case.
    pub async fn park_and_release(&self, spot: ParkingSpot, dwell: Duration) -> bool {
        info!("[V{}] now parked at {}", spot.vehicle_id, self.name);
        let mut closed = self.closed.subscribe();
        let full_stay = tokio::select! {
            _ = sleep(dwell) => true,
            _ = closed.wait_for(|closed| *closed) => {
                debug!("[V{}] {} closing - leaving parking early", spot.vehicle_id, self.name);
                false
            }
        };
        self.release(spot);
        full_stay
    }

    /// Refuses new reservations, wakes every vehicle waiting for a spot and cuts
    /// short every stay in progress.
    pub fn close(&self) {
        self.queue.close();
        self.spots.close();
        self.closed.send_replace(true);
    }
}

impl fmt::Debug for ParkingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParkingPool")
            .field("name", &self.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// One parking pool per intersection.
#[derive(Debug, Clone)]
pub struct ParkingPair {
    pub a: Arc<ParkingPool>,
    pub b: Arc<ParkingPool>,
}

impl ParkingPair {
    pub fn get(&self, id: IntersectionId) -> &Arc<ParkingPool> {
        match id {
            IntersectionId::A => &self.a,
            IntersectionId::B => &self.b,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ParkingPool>> {
        [&self.a, &self.b].into_iter()
    }
}
