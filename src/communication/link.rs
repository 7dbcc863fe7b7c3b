//! The controller-to-controller signal channel.
//!
//! Sending is fire-and-forget: a failed send is logged and otherwise ignored, the
//! core never waits for a reply.

use crate::communication::messages::ControllerSignal;
use crate::error::Result;
use crate::global_variables::{QUEUE_CONTROLLER_A, QUEUE_CONTROLLER_B};
use crate::simulation_engine::intersections::IntersectionId;
use amiquip::{Channel, Connection, Exchange, Publish, QueueDeclareOptions};
use log::{debug, warn};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub trait SignalLink: Send + Sync {
    /// Delivers `signal` to the controller of intersection `to`.
    fn send(&self, to: IntersectionId, signal: ControllerSignal);
}

/// Queue name of the controller relay for `id`.
pub fn controller_queue(id: IntersectionId) -> &'static str {
    match id {
        IntersectionId::A => QUEUE_CONTROLLER_A,
        IntersectionId::B => QUEUE_CONTROLLER_B,
    }
}

/// In-process link: one unbounded channel per controller task.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    to_a: UnboundedSender<ControllerSignal>,
    to_b: UnboundedSender<ControllerSignal>,
}

impl ChannelLink {
    /// Returns the link plus the receiving ends for controllers A and B.
    pub fn new() -> (
        Self,
        UnboundedReceiver<ControllerSignal>,
        UnboundedReceiver<ControllerSignal>,
    ) {
        let (to_a, rx_a) = mpsc::unbounded_channel();
        let (to_b, rx_b) = mpsc::unbounded_channel();
        (Self { to_a, to_b }, rx_a, rx_b)
    }
}

impl SignalLink for ChannelLink {
    fn send(&self, to: IntersectionId, signal: ControllerSignal) {
        let sender = match to {
            IntersectionId::A => &self.to_a,
            IntersectionId::B => &self.to_b,
        };
        if sender.send(signal).is_err() {
            warn!("Controller {to} is gone; dropped {signal}");
        }
    }
}

/// Link to remote controller processes through RabbitMQ, one queue per controller.
pub struct AmqpLink {
    connection: Mutex<Option<Connection>>,
    channel: Mutex<Channel>,
}

impl AmqpLink {
    pub fn connect(url: &str) -> Result<Self> {
        let mut connection = Connection::insecure_open(url)?;
        let channel = connection.open_channel(None)?;
        for id in [IntersectionId::A, IntersectionId::B] {
            channel.queue_declare(controller_queue(id), QueueDeclareOptions::default())?;
        }
        Ok(Self {
            connection: Mutex::new(Some(connection)),
            channel: Mutex::new(channel),
        })
    }

    fn publish(&self, to: IntersectionId, signal: ControllerSignal) -> Result<()> {
        let payload = signal.to_bytes()?;
        let channel = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        let exchange = Exchange::direct(&channel);
        exchange.publish(Publish::new(&payload, controller_queue(to)))?;
        Ok(())
    }

    /// Closes the underlying connection. Later sends are logged and dropped.
    pub fn close(&self) -> Result<()> {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = connection {
            connection.close()?;
        }
        Ok(())
    }
}

impl SignalLink for AmqpLink {
    fn send(&self, to: IntersectionId, signal: ControllerSignal) {
        match self.publish(to, signal) {
            Ok(()) => debug!("Published {signal} to {}", controller_queue(to)),
            Err(e) => warn!("Failed to publish {signal} to controller {to}: {e}"),
        }
    }
}
