use crate::simulation_engine::intersections::IntersectionId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Different types of vehicles in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    Ambulance,
    FireTruck,
    Bus,
    Car,
    Bike,
    Tractor,
}

impl VehicleType {
    pub const ALL: [VehicleType; 6] = [
        VehicleType::Ambulance,
        VehicleType::FireTruck,
        VehicleType::Bus,
        VehicleType::Car,
        VehicleType::Bike,
        VehicleType::Tractor,
    ];

    pub fn class(self) -> VehicleClass {
        match self {
            VehicleType::Ambulance | VehicleType::FireTruck => VehicleClass::Emergency,
            VehicleType::Bus => VehicleClass::MediumPriority,
            VehicleType::Car | VehicleType::Bike | VehicleType::Tractor => VehicleClass::Normal,
        }
    }

    /// Smaller value = higher priority.
    pub fn priority(self) -> u8 {
        match self {
            VehicleType::Ambulance => 0,
            VehicleType::FireTruck => 1,
            VehicleType::Bus => 2,
            _ => 3,
        }
    }

    /// Emergency vehicles never use parking.
    pub fn may_park(self) -> bool {
        self.class() != VehicleClass::Emergency
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Admission class derived from the vehicle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleClass {
    /// Ignores the light and preemption; only movement compatibility applies.
    Emergency,
    /// May cross on red as long as no preemption is active.
    MediumPriority,
    Normal,
}

/// Movement a vehicle makes through the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Straight,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Straight, Direction::Left, Direction::Right];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A vehicle passing through the junction pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: u32,
    pub vehicle_type: VehicleType,
    pub origin: IntersectionId,
    pub destination: IntersectionId,
    pub direction: Direction,
    pub wants_parking: bool,
}

impl Vehicle {
    /// Creates a vehicle. Parking requests from emergency vehicles are dropped.
    pub fn new(
        id: u32,
        vehicle_type: VehicleType,
        origin: IntersectionId,
        destination: IntersectionId,
        direction: Direction,
        wants_parking: bool,
    ) -> Self {
        Self {
            id,
            vehicle_type,
            origin,
            destination,
            direction,
            wants_parking: wants_parking && vehicle_type.may_park(),
        }
    }

    pub fn class(&self) -> VehicleClass {
        self.vehicle_type.class()
    }

    pub fn is_emergency(&self) -> bool {
        self.class() == VehicleClass::Emergency
    }

    pub fn priority(&self) -> u8 {
        self.vehicle_type.priority()
    }

    /// True when the journey crosses from one intersection to the other.
    pub fn is_cross_move(&self) -> bool {
        self.origin != self.destination
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{} {}", self.id, self.vehicle_type)
    }
}

/// Draws a vehicle with uniformly random type, endpoints and direction.
/// Vehicles that may park want to with probability 0.5.
pub fn random_vehicle<R: Rng + ?Sized>(id: u32, rng: &mut R) -> Vehicle {
    let vehicle_type = VehicleType::ALL[rng.random_range(0..VehicleType::ALL.len())];
    let origin = if rng.random_bool(0.5) { IntersectionId::A } else { IntersectionId::B };
    let destination = if rng.random_bool(0.5) { IntersectionId::A } else { IntersectionId::B };
    let direction = Direction::ALL[rng.random_range(0..Direction::ALL.len())];
    let wants_parking = vehicle_type.may_park() && rng.random_bool(0.5);

    Vehicle::new(id, vehicle_type, origin, destination, direction, wants_parking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn classes_and_priorities() {
        assert_eq!(VehicleType::Ambulance.class(), VehicleClass::Emergency);
        assert_eq!(VehicleType::FireTruck.class(), VehicleClass::Emergency);
        assert_eq!(VehicleType::Bus.class(), VehicleClass::MediumPriority);
        assert_eq!(VehicleType::Tractor.class(), VehicleClass::Normal);
        assert_eq!(VehicleType::Ambulance.priority(), 0);
        assert_eq!(VehicleType::FireTruck.priority(), 1);
        assert_eq!(VehicleType::Bus.priority(), 2);
        assert_eq!(VehicleType::Bike.priority(), 3);
    }

    #[test]
    fn emergency_vehicles_never_want_parking() {
        let v = Vehicle::new(
            1,
            VehicleType::Ambulance,
            IntersectionId::A,
            IntersectionId::B,
            Direction::Left,
            true,
        );
        assert!(!v.wants_parking);
        assert!(v.is_cross_move());
    }

    #[test]
    fn random_generation_respects_parking_rule() {
        let mut rng = StdRng::seed_from_u64(7);
        for id in 0..500 {
            let v = random_vehicle(id, &mut rng);
            assert_eq!(v.id, id);
            if v.is_emergency() {
                assert!(!v.wants_parking);
            }
        }
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..20).map(|i| random_vehicle(i, &mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..20).map(|i| random_vehicle(i, &mut rng)).collect()
        };
        assert_eq!(a, b);
    }
}
