//! Destination-scoped emergency preemption.
//!
//! The coordinator only ever locks the destination intersection, so the two
//! intersections' locks are never held together.

use crate::communication::link::SignalLink;
use crate::communication::messages::ControllerSignal;
use crate::simulation_engine::intersections::{IntersectionId, IntersectionPair};
use log::warn;
use std::sync::Arc;

pub struct PreemptionCoordinator {
    intersections: IntersectionPair,
    link: Arc<dyn SignalLink>,
}

impl PreemptionCoordinator {
    pub fn new(intersections: IntersectionPair, link: Arc<dyn SignalLink>) -> Self {
        Self {
            intersections,
            link,
        }
    }

    /// Preempts `to` for an emergency vehicle coming from `from` and alerts the
    /// destination's controller. No-op when `from == to`. Returns whether
    /// preemption was set.
    pub fn notify(&self, from: IntersectionId, to: IntersectionId) -> bool {
        if from == to {
            return false;
        }
        self.intersections.get(to).set_emergency_preempt(true);
        self.link.send(to, ControllerSignal::EmergencyIncoming);
        warn!("Emergency {from}->{to}: preempting {to} intersection");
        true
    }

    /// Lifts the preemption set by [`PreemptionCoordinator::notify`].
    pub fn clear(&self, from: IntersectionId, to: IntersectionId) {
        if from == to {
            return;
        }
        self.intersections.get(to).set_emergency_preempt(false);
    }
}
