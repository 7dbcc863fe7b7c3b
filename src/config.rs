//! Simulation configuration.
//!
//! Every nominal duration is expressed in *time units*; `time_unit_ms` scales the
//! whole simulation so the same scenario can run at wall-clock pace or compressed
//! for tests.

use crate::error::{Result, SimError};
use crate::global_variables::AMQP_URL;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An inclusive `[min, max]` range of whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRange {
    pub min: u64,
    pub max: u64,
}

impl UnitRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        rng.random_range(self.min..=self.max)
    }
}

/// How the two controller relays are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// In-process controller tasks fed by tokio channels.
    Channel,
    /// Remote controller processes behind RabbitMQ queues.
    Amqp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of vehicle agents to spawn.
    pub vehicles: u32,
    /// Parking spots per intersection.
    pub parking_spots: usize,
    /// Waiting-queue capacity per parking pool.
    pub parking_queue: usize,
    /// Length of one time unit in milliseconds.
    pub time_unit_ms: u64,
    /// Units each light phase lasts.
    pub light_phase_units: u64,
    /// Units a vehicle spends inside the intersection.
    pub crossing_units: UnitRange,
    /// Units a vehicle stays parked.
    pub parking_units: UnitRange,
    /// Delay between two spawns, in milliseconds (not scaled).
    pub spawn_delay_ms: UnitRange,
    /// Seed for deterministic vehicle generation.
    pub seed: Option<u64>,
    /// Optional CSV file receiving every simulation event.
    pub event_log: Option<PathBuf>,
    pub link: LinkKind,
    pub amqp_url: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            vehicles: 15,
            parking_spots: 10,
            parking_queue: 5,
            time_unit_ms: 1000,
            light_phase_units: 3,
            crossing_units: UnitRange::new(1, 2),
            parking_units: UnitRange::new(1, 3),
            spawn_delay_ms: UnitRange::new(100, 500),
            seed: None,
            event_log: None,
            link: LinkKind::Channel,
            amqp_url: AMQP_URL.to_string(),
        }
    }
}

impl SimulationConfig {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_unit_ms == 0 {
            return Err(SimError::Config("time_unit_ms must be positive".into()));
        }
        if self.light_phase_units == 0 {
            return Err(SimError::Config("light_phase_units must be positive".into()));
        }
        for (name, range) in [
            ("crossing_units", self.crossing_units),
            ("parking_units", self.parking_units),
            ("spawn_delay_ms", self.spawn_delay_ms),
        ] {
            if range.min > range.max {
                return Err(SimError::Config(format!(
                    "{name}: min {} exceeds max {}",
                    range.min, range.max
                )));
            }
        }
        Ok(())
    }

    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms)
    }

    pub fn light_phase(&self) -> Duration {
        self.units(self.light_phase_units)
    }

    /// Converts a number of units into wall-clock time.
    pub fn units(&self, units: u64) -> Duration {
        Duration::from_millis(self.time_unit_ms.saturating_mul(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timings() {
        let config = SimulationConfig::default();
        assert_eq!(config.vehicles, 15);
        assert_eq!(config.parking_spots, 10);
        assert_eq!(config.parking_queue, 5);
        assert_eq!(config.light_phase(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{ "vehicles": 4, "time_unit_ms": 10, "link": "amqp" }"#)
                .unwrap();
        assert_eq!(config.vehicles, 4);
        assert_eq!(config.units(3), Duration::from_millis(30));
        assert_eq!(config.link, LinkKind::Amqp);
        assert_eq!(config.parking_queue, 5);
    }

    #[test]
    fn rejects_inverted_range() {
        let config = SimulationConfig {
            parking_units: UnitRange::new(3, 1),
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn huge_phase_saturates_instead_of_wrapping() {
        let config = SimulationConfig {
            light_phase_units: 1 << 32,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.light_phase() >= Duration::from_secs(1 << 32));
    }

    #[test]
    fn rejects_zero_time_unit() {
        let config = SimulationConfig {
            time_unit_ms: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
