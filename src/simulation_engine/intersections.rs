//! The intersection monitor.
//!
//! Each [`Intersection`] guards its crossing state with its own lock and wakes *all*
//! waiters whenever that state changes (light flip, exit, preemption toggle, close).
//! A waiter re-evaluates [`IntersectionState::admits`] on every wake; there is no
//! FIFO ordering between waiters.

use crate::communication::messages::SimEvent;
use crate::error::{Result, SimError};
use crate::monitoring::event_sink::EventSink;
use crate::simulation_engine::vehicles::{Direction, Vehicle, VehicleClass};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// The two junctions of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntersectionId {
    A,
    B,
}

impl IntersectionId {
    /// The other intersection of the pair.
    pub fn peer(self) -> Self {
        match self {
            IntersectionId::A => IntersectionId::B,
            IntersectionId::B => IntersectionId::A,
        }
    }
}

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for IntersectionId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(IntersectionId::A),
            "B" => Ok(IntersectionId::B),
            other => Err(format!("unknown intersection '{other}', expected A or B")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightColor {
    #[default]
    Red,
    Green,
}

impl LightColor {
    pub fn flipped(self) -> Self {
        match self {
            LightColor::Red => LightColor::Green,
            LightColor::Green => LightColor::Red,
        }
    }
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightColor::Red => f.write_str("RED"),
            LightColor::Green => f.write_str("GREEN"),
        }
    }
}

/// Crossing state of one intersection.
///
/// Straight movers are counted so that one of several concurrent straight movers
/// leaving does not clear the straight flag for the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntersectionState {
    pub light: LightColor,
    pub emergency_preempt: bool,
    pub active_count: usize,
    straight_count: usize,
    left_active: bool,
    right_active: bool,
    pub closed: bool,
}

impl IntersectionState {
    pub fn active_straight(&self) -> bool {
        self.straight_count > 0
    }

    pub fn active_left(&self) -> bool {
        self.left_active
    }

    pub fn active_right(&self) -> bool {
        self.right_active
    }

    /// Movement compatibility: an empty intersection admits anything, and a straight
    /// mover may join a group that is itself all-straight.
    pub fn can_enter_now(&self, direction: Direction) -> bool {
        self.active_count == 0
            || (direction == Direction::Straight
                && self.active_straight()
                && !self.left_active
                && !self.right_active)
    }

    /// Full admission predicate for `vehicle`.
    pub fn admits(&self, vehicle: &Vehicle) -> bool {
        let movement_ok = self.can_enter_now(vehicle.direction);
        match vehicle.class() {
            VehicleClass::Emergency => movement_ok,
            VehicleClass::MediumPriority => !self.emergency_preempt && movement_ok,
            VehicleClass::Normal => {
                self.light == LightColor::Green && !self.emergency_preempt && movement_ok
            }
        }
    }

    fn register(&mut self, direction: Direction) {
        match direction {
            Direction::Straight => self.straight_count += 1,
            Direction::Left => self.left_active = true,
            Direction::Right => self.right_active = true,
        }
        self.active_count += 1;
    }

    fn deregister(&mut self, direction: Direction) {
        match direction {
            Direction::Straight => self.straight_count = self.straight_count.saturating_sub(1),
            Direction::Left => self.left_active = false,
            Direction::Right => self.right_active = false,
        }
        self.active_count = self.active_count.saturating_sub(1);
    }
}

/// One intersection monitor.
///
/// Events are published while the state lock is held, so the event stream is ordered
/// exactly like the state changes. Sinks must therefore never call back into the
/// intersection.
pub struct Intersection {
    id: IntersectionId,
    state: Mutex<IntersectionState>,
    changed: Notify,
    // Mirror of `state.emergency_preempt` for lock-free readers such as the parking pool.
    preempt: AtomicBool,
    events: Arc<dyn EventSink>,
}

impl Intersection {
    /// A fresh intersection: light RED, no preemption, nobody inside.
    pub fn new(id: IntersectionId, events: Arc<dyn EventSink>) -> Self {
        Self {
            id,
            state: Mutex::new(IntersectionState::default()),
            changed: Notify::new(),
            preempt: AtomicBool::new(false),
            events,
        }
    }

    pub fn id(&self) -> IntersectionId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, IntersectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> IntersectionState {
        *self.lock()
    }

    pub fn light(&self) -> LightColor {
        self.lock().light
    }

    /// Plain atomic read; may be momentarily stale with respect to the locked state.
    pub fn is_preempted(&self) -> bool {
        self.preempt.load(Ordering::Acquire)
    }

    /// Publishes the approach hook. No state changes.
    pub fn announce_approach(&self, vehicle: &Vehicle) {
        self.events.publish(SimEvent::VehicleApproaching {
            intersection: self.id,
            vehicle_id: vehicle.id,
            vehicle_type: vehicle.vehicle_type,
        });
    }

    /// Waits until `vehicle` may legally cross, then registers its movement.
    ///
    /// Returns [`SimError::Shutdown`] if the intersection is closed while waiting;
    /// otherwise it only returns once admitted. Every successful call must be paired
    /// with exactly one [`Intersection::leave`].
    pub async fn enter(&self, vehicle: &Vehicle) -> Result<()> {
        loop {
            // Register interest before checking, so a change between the check and
            // the await still wakes us.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(SimError::Shutdown);
                }
                if state.admits(vehicle) {
                    state.register(vehicle.direction);
                    if state.active_count > 1 {
                        debug!(
                            "[{}] concurrent movement: {} vehicles crossing",
                            self.id, state.active_count
                        );
                    }
                    self.events.publish(SimEvent::VehicleEntered {
                        intersection: self.id,
                        vehicle_id: vehicle.id,
                        vehicle_type: vehicle.vehicle_type,
                        direction: vehicle.direction,
                        light: state.light,
                        active_count: state.active_count,
                    });
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Deregisters a previously admitted vehicle and wakes every waiter.
    pub fn leave(&self, vehicle: &Vehicle) {
        {
            let mut state = self.lock();
            state.deregister(vehicle.direction);
            self.events.publish(SimEvent::VehicleExited {
                intersection: self.id,
                vehicle_id: vehicle.id,
            });
        }
        self.changed.notify_waiters();
    }

    pub fn set_light(&self, color: LightColor) {
        {
            let mut state = self.lock();
            state.light = color;
            self.events.publish(SimEvent::LightChanged {
                intersection: self.id,
                color,
            });
        }
        self.changed.notify_waiters();
    }

    pub fn set_emergency_preempt(&self, active: bool) {
        {
            let mut state = self.lock();
            state.emergency_preempt = active;
            self.preempt.store(active, Ordering::Release);
            self.events.publish(SimEvent::PreemptChanged {
                intersection: self.id,
                active,
            });
        }
        self.changed.notify_waiters();
        if active {
            self.events
                .publish(SimEvent::Log(format!("EMERGENCY preempt at {}", self.id)));
        }
    }

    /// Wakes every waiter without changing state.
    pub fn wake_all(&self) {
        self.changed.notify_waiters();
    }

    /// Refuses further admissions; current and future waiters get [`SimError::Shutdown`].
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            if state.emergency_preempt {
                state.emergency_preempt = false;
                self.preempt.store(false, Ordering::Release);
                self.events.publish(SimEvent::PreemptChanged {
                    intersection: self.id,
                    active: false,
                });
            }
        }
        self.changed.notify_waiters();
    }
}

impl fmt::Debug for Intersection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intersection")
            .field("id", &self.id)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Both intersections, addressable by id.
#[derive(Debug, Clone)]
pub struct IntersectionPair {
    pub a: Arc<Intersection>,
    pub b: Arc<Intersection>,
}

impl IntersectionPair {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            a: Arc::new(Intersection::new(IntersectionId::A, Arc::clone(&events))),
            b: Arc::new(Intersection::new(IntersectionId::B, events)),
        }
    }

    pub fn get(&self, id: IntersectionId) -> &Arc<Intersection> {
        match id {
            IntersectionId::A => &self.a,
            IntersectionId::B => &self.b,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Intersection>> {
        [&self.a, &self.b].into_iter()
    }
}
