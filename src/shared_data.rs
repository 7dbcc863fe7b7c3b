// src/shared_data.rs

use crate::communication::messages::SimEvent;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// One flattened row of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: u64,
    pub kind: String,
    pub intersection: Option<String>,
    pub vehicle: Option<u32>,
    pub detail: String,
}

impl EventRecord {
    pub fn from_event(timestamp: u64, event: &SimEvent) -> Self {
        Self {
            timestamp,
            kind: event.kind().to_string(),
            intersection: event.intersection().map(|id| id.to_string()),
            vehicle: event.vehicle_id(),
            detail: event.detail(),
        }
    }
}
