//! Server network layer handling UDP communications and the world tick

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::GameError;
use crate::events::{ChannelSink, EventSink, Outbound};
use crate::session::GameSession;
use bincode::{deserialize, serialize};
use fishing_shared::{ConnectionId, Packet, ServerEvent, PROTOCOL_VERSION};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: ConnectionId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Turns a rejected request into the event the client should see
///
/// `NotFound` is a disconnect race and stays silent. `InvalidAction` carries
/// its reason to the client through `reject`. `Internal` is logged and the
/// client only gets a generic error.
pub fn rejection_event(
    client_id: ConnectionId,
    err: GameError,
    reject: impl FnOnce(String) -> ServerEvent,
) -> Option<ServerEvent> {
    match err {
        GameError::NotFound(_) => {
            warn!("Request from connection {} without a player", client_id);
            None
        }
        GameError::InvalidAction(reason) => Some(reject(reason)),
        GameError::Internal(message) => {
            error!("Internal error for connection {}: {}", client_id, message);
            Some(ServerEvent::Error {
                message: "An error occurred during fishing.".to_string(),
            })
        }
    }
}

/// Main server coordinating networking and the fishing session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    session: GameSession,
    sink: Arc<dyn EventSink>,
    tick_duration: Duration,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let address = config.address();
        let socket = Arc::new(UdpSocket::bind(&address).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (sink, outbound_rx) = ChannelSink::channel();
        let sink: Arc<dyn EventSink> = Arc::new(sink);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            session: GameSession::from_config(config, Arc::clone(&sink)),
            sink,
            tick_duration: config.tick_duration(),
            client_timeout: config.client_timeout(),
            server_tx,
            server_rx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 4096];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the event queue onto the socket
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut outbound_rx =
            std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(Outbound { delivery, event }) = outbound_rx.recv().await {
                let targets = {
                    let clients_guard = clients.read().await;
                    clients_guard.resolve(delivery)
                };
                if targets.is_empty() {
                    debug!("Dropping {} event with no recipients", event.name());
                    continue;
                }

                let packet = Packet::Event(event);
                for (client_id, addr) in targets {
                    if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                        error!("Failed to send to client {}: {}", client_id, e);
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Sends a connection-level reply straight to an address
    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = Self::send_packet_impl(&self.socket, packet, addr).await {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    fn reject(
        &self,
        client_id: ConnectionId,
        err: GameError,
        to_event: impl FnOnce(String) -> ServerEvent,
    ) {
        if let Some(event) = rejection_event(client_id, err, to_event) {
            self.sink.send_to(client_id, event);
        }
    }

    async fn disconnect_client(&self, client_id: ConnectionId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.session.player_disconnect(client_id).await;
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!(
                "Rejecting {}: protocol version {} (expected {})",
                addr, client_version, PROTOCOL_VERSION
            );
            let response = Packet::Disconnected {
                reason: format!("Unsupported protocol version {}", client_version),
            };
            self.send_packet(&response, addr).await;
            return;
        }

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.disconnect_client(existing_id).await;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        let response = match client_id {
            Some(client_id) => Packet::Connected { client_id },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.send_packet(&response, addr).await;
    }

    /// Processes incoming packets and forwards them to the session
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };

        let Some(client_id) = client_id else {
            warn!("Packet from unknown address {}, ignoring", addr);
            return;
        };

        match packet {
            Packet::JoinGame { name } => {
                self.session.player_connect(client_id, &name).await;
            }

            Packet::Move { position } => {
                if let Err(e) = self.session.move_player(client_id, position).await {
                    self.reject(client_id, e, |message| ServerEvent::Error { message });
                }
            }

            Packet::Face { direction } => {
                if let Err(e) = self.session.face_player(client_id, &direction).await {
                    self.reject(client_id, e, |message| ServerEvent::Error { message });
                }
            }

            Packet::StartCast(request) => {
                if let Err(e) = self.session.start_cast(client_id, &request).await {
                    self.reject(client_id, e, |reason| ServerEvent::CastFailed { reason });
                }
            }

            Packet::CancelCast => {
                if let Err(e) = self.session.cancel_cast(client_id).await {
                    warn!("Cancel rejected for connection {}: {}", client_id, e);
                }
            }

            Packet::FinishHook { outcome } => {
                if let Err(e) = self.session.finish_hook(client_id, outcome).await {
                    self.reject(client_id, e, |message| ServerEvent::Error { message });
                }
            }

            Packet::Disconnect => {
                self.disconnect_client(client_id).await;
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();
        let mut tick: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.session.player_disconnect(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Advance the world
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.session.update_world(dt).await;
                    tick += 1;

                    // Periodic monitoring
                    if tick % 300 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };
                        let (players, fish) = self
                            .session
                            .with_state(|c| (c.players().len(), c.world().len()))
                            .await;
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} players, {} fish",
                                tick, client_count, players, fish
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
