//! Connection table for the UDP transport
//!
//! This module tracks which socket addresses are connected and maps them to
//! the connection handles the fishing core is keyed by:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Handle assignment and capacity limits
//! - Activity tracking for silent clients
//! - Resolving event deliveries to concrete addresses
//!
//! The manager knows nothing about players or fishing. A handle exists here
//! from `Connect` until disconnect or timeout, whether or not the client has
//! joined the game yet.

use crate::events::Delivery;
use fishing_shared::ConnectionId;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client endpoint
#[derive(Debug)]
pub struct Client {
    /// Handle assigned by the server
    pub id: ConnectionId,
    /// Network address for sending events
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ClientManager {
    /// Connected clients indexed by handle
    clients: HashMap<ConnectionId, Client>,
    /// Next handle for new connections
    next_client_id: ConnectionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty connection table with the given capacity
    ///
    /// Handles start from 1 and are never reused within one server run, so a
    /// late event for a departed client can never reach a newcomer.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the table
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone. Handles both explicit disconnections and timeouts.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client handle by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Records activity from a client, postponing its timeout
    pub fn touch(&mut self, client_id: ConnectionId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes and returns every client silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Addresses an event with the given delivery mode should reach
    pub fn resolve(&self, delivery: Delivery) -> Vec<(ConnectionId, SocketAddr)> {
        match delivery {
            Delivery::To(client_id) => self
                .clients
                .get(&client_id)
                .map(|client| vec![(client_id, client.addr)])
                .unwrap_or_default(),
            _ => self
                .clients
                .iter()
                .filter(|(id, _)| delivery.includes(**id))
                .map(|(id, client)| (*id, client.addr))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
