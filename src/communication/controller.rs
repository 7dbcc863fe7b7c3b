//! Controller relay: one per intersection. It only logs what it receives; the
//! preemption itself is applied by the core before the signal is sent.

use crate::communication::link::controller_queue;
use crate::communication::messages::ControllerSignal;
use crate::error::{Result, SimError};
use crate::simulation_engine::intersections::IntersectionId;
use amiquip::{Connection, ConsumerMessage, ConsumerOptions, QueueDeclareOptions};
use log::{info, warn};
use std::ops::ControlFlow;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug)]
pub struct Controller {
    id: IntersectionId,
    received: usize,
}

impl Controller {
    pub fn new(id: IntersectionId) -> Self {
        Self { id, received: 0 }
    }

    pub fn id(&self) -> IntersectionId {
        self.id
    }

    /// Number of signals handled so far.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn handle(&mut self, signal: ControllerSignal) -> ControlFlow<()> {
        self.received += 1;
        info!("[Controller {}] received signal: {signal}", self.id);
        match signal {
            ControllerSignal::EmergencyIncoming => {
                warn!(
                    "[Controller {}] EMERGENCY ALERT - clearing intersection for emergency vehicle",
                    self.id
                );
                ControlFlow::Continue(())
            }
            ControllerSignal::Normal => ControlFlow::Continue(()),
            ControllerSignal::Shutdown => {
                info!("[Controller {}] shutting down", self.id);
                ControlFlow::Break(())
            }
        }
    }

    /// Consumes signals until `Shutdown` arrives or every sender is gone.
    /// Returns the controller so callers can inspect what it handled.
    pub async fn run(mut self, mut signals: UnboundedReceiver<ControllerSignal>) -> Self {
        info!("[Controller {}] online and listening", self.id);
        while let Some(signal) = signals.recv().await {
            if self.handle(signal).is_break() {
                break;
            }
        }
        self
    }
}

/// Runs a controller against its RabbitMQ queue until `Shutdown` arrives.
pub async fn listen_amqp(id: IntersectionId, url: String) -> Result<Controller> {
    tokio::task::spawn_blocking(move || -> Result<Controller> {
        let mut controller = Controller::new(id);
        let mut connection = Connection::insecure_open(&url)?;
        let channel = connection.open_channel(None)?;
        let queue = channel.queue_declare(controller_queue(id), QueueDeclareOptions::default())?;
        let consumer = queue.consume(ConsumerOptions::default())?;
        info!("[Controller {id}] online and listening on '{}'", controller_queue(id));

        for message in consumer.receiver().iter() {
            match message {
                ConsumerMessage::Delivery(delivery) => {
                    let flow = match ControllerSignal::from_bytes(&delivery.body) {
                        Ok(signal) => controller.handle(signal),
                        Err(e) => {
                            warn!("[Controller {id}] ignoring malformed signal: {e}");
                            ControlFlow::Continue(())
                        }
                    };
                    consumer.ack(delivery)?;
                    if flow.is_break() {
                        break;
                    }
                }
                other => {
                    info!("[Controller {id}] consumer ended: {other:?}");
                    break;
                }
            }
        }
        connection.close()?;
        Ok(controller)
    })
    .await
    .map_err(|e| SimError::Io(std::io::Error::other(e)))?
}
