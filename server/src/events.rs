//! Outbound event delivery.
//!
//! The core never talks to sockets. It publishes `ServerEvent`s with a
//! `Delivery` mode and the transport decides how to reach those connections.

use fishing_shared::{ConnectionId, ServerEvent};
use log::error;
use tokio::sync::mpsc;

/// Who should receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Only the given connection.
    To(ConnectionId),
    /// Every connection except the given one.
    AllExcept(ConnectionId),
    /// Every connection, including whoever triggered the event.
    All,
}

impl Delivery {
    pub fn includes(&self, client_id: ConnectionId) -> bool {
        match *self {
            Delivery::To(target) => target == client_id,
            Delivery::AllExcept(excluded) => excluded != client_id,
            Delivery::All => true,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, delivery: Delivery, event: ServerEvent);

    fn send_to(&self, client_id: ConnectionId, event: ServerEvent) {
        self.publish(Delivery::To(client_id), event);
    }

    fn broadcast(&self, event: ServerEvent) {
        self.publish(Delivery::All, event);
    }

    fn broadcast_others(&self, sender: ConnectionId, event: ServerEvent) {
        self.publish(Delivery::AllExcept(sender), event);
    }
}

/// An event queued for the network sender task.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub delivery: Delivery,
    pub event: ServerEvent,
}

/// Sink that forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, delivery: Delivery, event: ServerEvent) {
        let name = event.name();
        if let Err(e) = self.tx.send(Outbound { delivery, event }) {
            error!("Failed to queue {} event: {}", name, e);
        }
    }
}
