//! Error types for the simulation.

use thiserror::Error;

/// Errors raised by the simulation core and its collaborators.
#[derive(Debug, Error)]
pub enum SimError {
    /// The intersection or parking pool was closed while an agent was waiting on it.
    #[error("simulation is shutting down")]
    Shutdown,

    /// Configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("AMQP error: {0}")]
    Amqp(#[from] amiquip::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
