// simulation_engine/mod.rs
pub mod agent;
pub mod intersections;
pub mod parking;
pub mod simulation;
pub mod vehicles;
