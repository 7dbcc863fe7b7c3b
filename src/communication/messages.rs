use crate::simulation_engine::intersections::{IntersectionId, LightColor};
use crate::simulation_engine::vehicles::{Direction, VehicleType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message exchanged between the two controller relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerSignal {
    Normal,
    EmergencyIncoming,
    Shutdown,
}

impl ControllerSignal {
    pub fn to_bytes(self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Display for ControllerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerSignal::Normal => "NORMAL_TRAFFIC",
            ControllerSignal::EmergencyIncoming => "EMERGENCY_ALERT",
            ControllerSignal::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

/// Observable transitions published by the core to the render/log collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    VehicleApproaching {
        intersection: IntersectionId,
        vehicle_id: u32,
        vehicle_type: VehicleType,
    },
    VehicleEntered {
        intersection: IntersectionId,
        vehicle_id: u32,
        vehicle_type: VehicleType,
        direction: Direction,
        light: LightColor,
        active_count: usize,
    },
    VehicleExited {
        intersection: IntersectionId,
        vehicle_id: u32,
    },
    ParkingChanged {
        vehicle_id: u32,
        entering: bool,
    },
    LightChanged {
        intersection: IntersectionId,
        color: LightColor,
    },
    PreemptChanged {
        intersection: IntersectionId,
        active: bool,
    },
    Log(String),
}

impl SimEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SimEvent::VehicleApproaching { .. } => "vehicle_approaching",
            SimEvent::VehicleEntered { .. } => "vehicle_entered",
            SimEvent::VehicleExited { .. } => "vehicle_exited",
            SimEvent::ParkingChanged { .. } => "parking_changed",
            SimEvent::LightChanged { .. } => "light_changed",
            SimEvent::PreemptChanged { .. } => "preempt_changed",
            SimEvent::Log(_) => "log",
        }
    }

    pub fn intersection(&self) -> Option<IntersectionId> {
        match self {
            SimEvent::VehicleApproaching { intersection, .. }
            | SimEvent::VehicleEntered { intersection, .. }
            | SimEvent::VehicleExited { intersection, .. }
            | SimEvent::LightChanged { intersection, .. }
            | SimEvent::PreemptChanged { intersection, .. } => Some(*intersection),
            SimEvent::ParkingChanged { .. } | SimEvent::Log(_) => None,
        }
    }

    pub fn vehicle_id(&self) -> Option<u32> {
        match self {
            SimEvent::VehicleApproaching { vehicle_id, .. }
            | SimEvent::VehicleEntered { vehicle_id, .. }
            | SimEvent::VehicleExited { vehicle_id, .. }
            | SimEvent::ParkingChanged { vehicle_id, .. } => Some(*vehicle_id),
            _ => None,
        }
    }

    /// Human-readable remainder of the event, without the intersection and vehicle.
    pub fn detail(&self) -> String {
        match self {
            SimEvent::VehicleApproaching { vehicle_type, .. } => format!("{vehicle_type} approaching"),
            SimEvent::VehicleEntered {
                vehicle_type,
                direction,
                light,
                active_count,
                ..
            } => format!("{vehicle_type} entered ({direction}) on {light}, {active_count} crossing"),
            SimEvent::VehicleExited { .. } => "exited".to_string(),
            SimEvent::ParkingChanged { entering: true, .. } => "parked".to_string(),
            SimEvent::ParkingChanged { entering: false, .. } => "left parking".to_string(),
            SimEvent::LightChanged { color, .. } => format!("light -> {color}"),
            SimEvent::PreemptChanged { active: true, .. } => "emergency preempt on".to_string(),
            SimEvent::PreemptChanged { active: false, .. } => "emergency preempt off".to_string(),
            SimEvent::Log(text) => text.clone(),
        }
    }
}

impl fmt::Display for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.intersection() {
            write!(f, "[{id}] ")?;
        }
        if let Some(vehicle) = self.vehicle_id() {
            write!(f, "V{vehicle} ")?;
        }
        f.write_str(&self.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_wire_format_is_json() {
        let bytes = ControllerSignal::EmergencyIncoming.to_bytes().unwrap();
        assert_eq!(bytes, br#""EmergencyIncoming""#);
        assert_eq!(
            ControllerSignal::from_bytes(&bytes).unwrap(),
            ControllerSignal::EmergencyIncoming
        );
        assert!(ControllerSignal::from_bytes(b"garbage").is_err());
    }

    #[test]
    fn signal_names() {
        assert_eq!(ControllerSignal::Normal.to_string(), "NORMAL_TRAFFIC");
        assert_eq!(ControllerSignal::EmergencyIncoming.to_string(), "EMERGENCY_ALERT");
        assert_eq!(ControllerSignal::Shutdown.to_string(), "SHUTDOWN");
    }

    #[test]
    fn event_display() {
        let event = SimEvent::VehicleExited {
            intersection: IntersectionId::B,
            vehicle_id: 7,
        };
        assert_eq!(event.to_string(), "[B] V7 exited");
        assert_eq!(event.kind(), "vehicle_exited");

        let light = SimEvent::LightChanged {
            intersection: IntersectionId::A,
            color: LightColor::Green,
        };
        assert_eq!(light.to_string(), "[A] light -> GREEN");
        assert_eq!(light.vehicle_id(), None);
    }
}
