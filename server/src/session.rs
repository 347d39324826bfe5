//! Async entry points into the fishing core
//!
//! `GameSession` is a cheap, cloneable handle around the shared coordinator.
//! Every request takes the lock, runs one synchronous coordinator operation
//! and releases it; casts additionally start their hook resolution task once
//! the lock is dropped.

use crate::config::ServerConfig;
use crate::error::GameResult;
use crate::events::EventSink;
use crate::fishing::{CastGeometry, FishingCoordinator, FishingRules, WorldSnapshot};
use crate::hook::spawn_hook_resolution;
use crate::world::World;
use fishing_shared::{CastRequest, ConnectionId, HookOutcome, Player, Position, ServerEvent};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct GameSession {
    state: Arc<Mutex<FishingCoordinator>>,
}

impl GameSession {
    pub fn new(coordinator: FishingCoordinator) -> Self {
        Self {
            state: Arc::new(Mutex::new(coordinator)),
        }
    }

    /// Builds a session with a freshly stocked world
    ///
    /// A configured seed makes both fish placement and bite rolls
    /// reproducible.
    pub fn from_config(config: &ServerConfig, sink: Arc<dyn EventSink>) -> Self {
        let (world_rng, dice) = match config.seed {
            Some(seed) => (
                StdRng::seed_from_u64(seed),
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        };

        let mut world = World::new(world_rng);
        world.spawn_initial(config.initial_fish);

        Self::new(FishingCoordinator::new(
            world,
            FishingRules::default(),
            Box::new(dice),
            sink,
        ))
    }

    /// Joins a player and brings them up to date
    ///
    /// The joining connection receives `welcome` and a `world_state` of
    /// everyone else; the others get `player_joined`.
    pub async fn player_connect(&self, client_id: ConnectionId, name: &str) -> Player {
        let mut coordinator = self.state.lock().await;
        let player = coordinator.join(client_id, name);
        let snapshot = coordinator.world_snapshot(client_id);

        let sink = coordinator.sink();
        sink.send_to(
            client_id,
            ServerEvent::Welcome {
                player: player.clone(),
            },
        );
        sink.send_to(
            client_id,
            ServerEvent::WorldState {
                players: snapshot.players,
                fish: snapshot.fish,
            },
        );
        sink.broadcast_others(
            client_id,
            ServerEvent::PlayerJoined {
                player: player.clone(),
            },
        );

        info!("Player {} joined on connection {}", player.name, client_id);
        player
    }

    pub async fn player_disconnect(&self, client_id: ConnectionId) -> Option<Player> {
        let player = self.state.lock().await.leave(client_id);
        if player.is_none() {
            debug!("Connection {} left without joining", client_id);
        }
        player
    }

    pub async fn move_player(
        &self,
        client_id: ConnectionId,
        position: Position,
    ) -> GameResult<Player> {
        self.state.lock().await.move_player(client_id, position)
    }

    pub async fn face_player(
        &self,
        client_id: ConnectionId,
        direction: &str,
    ) -> GameResult<Player> {
        self.state.lock().await.face_player(client_id, direction)
    }

    /// Casts a line and starts resolving bites for it
    ///
    /// `line_casted` goes out under the same lock as the state change, so
    /// every client sees the line before any hook progress for it.
    pub async fn start_cast(
        &self,
        client_id: ConnectionId,
        request: &CastRequest,
    ) -> GameResult<CastGeometry> {
        let geometry = {
            let mut coordinator = self.state.lock().await;
            let geometry = coordinator.start_cast(client_id, request)?;
            coordinator.sink().broadcast(geometry.to_event());
            geometry
        };

        spawn_hook_resolution(Arc::clone(&self.state), client_id, geometry.generation);
        Ok(geometry)
    }

    pub async fn cancel_cast(&self, client_id: ConnectionId) -> GameResult<()> {
        self.state.lock().await.cancel(client_id)
    }

    pub async fn finish_hook(
        &self,
        client_id: ConnectionId,
        outcome: HookOutcome,
    ) -> GameResult<()> {
        self.state.lock().await.finish_hook(client_id, outcome)
    }

    pub async fn world_snapshot(&self, client_id: ConnectionId) -> WorldSnapshot {
        self.state.lock().await.world_snapshot(client_id)
    }

    /// Advances fish motion by `dt` seconds
    pub async fn update_world(&self, dt: f32) {
        self.state.lock().await.world_mut().update_positions(dt);
    }

    /// Read-only access to the coordinator under the lock
    pub async fn with_state<R>(&self, f: impl FnOnce(&FishingCoordinator) -> R) -> R {
        let coordinator = self.state.lock().await;
        f(&coordinator)
    }

    /// Mutable access to the coordinator under the lock
    pub async fn with_state_mut<R>(&self, f: impl FnOnce(&mut FishingCoordinator) -> R) -> R {
        let mut coordinator = self.state.lock().await;
        f(&mut coordinator)
    }
}
