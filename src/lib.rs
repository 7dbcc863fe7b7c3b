//! Two linked intersections shared by concurrently moving vehicle agents.
//!
//! Crossing rights are arbitrated per intersection by traffic-light phase,
//! destination-scoped emergency preemption and movement compatibility; each
//! intersection also owns a bounded parking pool.

pub mod communication;
pub mod config;
pub mod control_system;
pub mod error;
pub mod global_variables;
pub mod monitoring;
pub mod shared_data;
pub mod simulation_engine;

pub use config::SimulationConfig;
pub use error::{Result, SimError};
pub use simulation_engine::simulation::{Simulation, SimulationSummary};
