//! Receivers for the simulation's observable transitions.
//!
//! The core publishes [`SimEvent`]s fire-and-forget: a sink must not block for long
//! and must never feed failures back into the admission protocol.

use crate::communication::messages::SimEvent;
use crate::error::{Result, SimError};
use crate::shared_data::{current_timestamp, EventRecord};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

pub trait EventSink: Send + Sync {
    fn publish(&self, event: SimEvent);
}

/// Writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: SimEvent) {
        match &event {
            SimEvent::VehicleApproaching { .. } | SimEvent::Log(_) => debug!("{event}"),
            SimEvent::PreemptChanged { active: true, .. } => warn!("{event}"),
            _ => info!("{event}"),
        }
    }
}

/// Appends one CSV record per event.
///
/// `publish` only stamps the record and queues it; a blocking writer task does the
/// file I/O, so no caller ever waits on the disk. Must be opened inside a tokio
/// runtime.
pub struct CsvEventLog {
    records: Mutex<Option<UnboundedSender<EventRecord>>>,
    writer: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl CsvEventLog {
    /// Opens `path` for appending. A header row is written only when the file is new.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_exists = path.exists();
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);

        let (records, rx) = mpsc::unbounded_channel();
        let writer = tokio::task::spawn_blocking(move || write_records(writer, rx));
        Ok(Self {
            records: Mutex::new(Some(records)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Stops accepting events and waits until everything queued is on disk.
    pub async fn finish(&self) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match writer {
            Some(writer) => writer
                .await
                .map_err(|e| SimError::Io(std::io::Error::other(e)))?,
            None => Ok(()),
        }
    }
}

fn write_records(
    mut writer: csv::Writer<File>,
    mut rx: UnboundedReceiver<EventRecord>,
) -> Result<()> {
    while let Some(record) = rx.blocking_recv() {
        if let Err(e) = writer.serialize(&record) {
            warn!("Error logging event to CSV: {e}");
            continue;
        }
        // Flush once the backlog is drained.
        if rx.is_empty() {
            writer.flush()?;
        }
    }
    writer.flush()?;
    debug!("CSV event log closed");
    Ok(())
}

impl EventSink for CsvEventLog {
    fn publish(&self, event: SimEvent) {
        let record = EventRecord::from_event(current_timestamp(), &event);
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.as_ref() {
            Some(tx) if tx.send(record).is_ok() => {}
            _ => warn!("CSV event log already closed; dropped {}", event.kind()),
        }
    }
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<SimEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&SimEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

impl EventSink for EventRecorder {
    fn publish(&self, event: SimEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Forwards each event to several sinks.
#[derive(Default, Clone)]
pub struct FanOut {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanOut {
    fn publish(&self, event: SimEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}
