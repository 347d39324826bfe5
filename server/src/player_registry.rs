//! In-memory registry of connected players
//!
//! The registry is the single source of truth for per-connection player
//! state. It is a plain map keyed by connection handle:
//! - Registration and removal as connections come and go
//! - State and fishing-target updates driven by the fishing coordinator
//! - Position and facing updates from player movement
//! - Snapshot views used to build world-state messages
//!
//! Lookups of unknown handles are never errors; they return `None` so that
//! disconnect races stay quiet.

use fishing_shared::{ConnectionId, Direction, ParseDirectionError, Player, PlayerState, Position};
use log::{debug, info, warn};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    /// Connected players indexed by connection handle
    players: HashMap<ConnectionId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Registers a player for a connection handle
    ///
    /// The player always starts idle with no fishing target, whatever the
    /// record passed in says. Re-registering a live handle replaces the old
    /// record and is logged as suspicious.
    pub fn add(&mut self, client_id: ConnectionId, mut player: Player) {
        if self.players.contains_key(&client_id) {
            warn!(
                "Player for connection {} already exists. Overwriting.",
                client_id
            );
        }

        player.state = PlayerState::Idle;
        player.fishing_target = None;

        info!(
            "Adding player {} ({}) on connection {}",
            player.name, player.id, client_id
        );
        self.players.insert(client_id, player);
    }

    /// Removes and returns the player bound to a connection handle
    pub fn remove(&mut self, client_id: ConnectionId) -> Option<Player> {
        match self.players.remove(&client_id) {
            Some(player) => {
                info!(
                    "Removing player {} ({}) on connection {}",
                    player.name, player.id, client_id
                );
                Some(player)
            }
            None => {
                warn!(
                    "Attempted to remove non-existent player on connection {}",
                    client_id
                );
                None
            }
        }
    }

    pub fn get(&self, client_id: ConnectionId) -> Option<&Player> {
        self.players.get(&client_id)
    }

    /// Updates state and fishing target together
    ///
    /// Both fields change in the same call so no observer can see a
    /// fishing player without a target or an idle player with one.
    pub fn set_state(
        &mut self,
        client_id: ConnectionId,
        state: PlayerState,
        fishing_target: Option<Position>,
    ) -> Option<&Player> {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                info!(
                    "Setting player {} ({}) state from '{}' to '{}'",
                    player.name, client_id, player.state, state
                );
                player.state = state;
                player.fishing_target = fishing_target;
                Some(&*player)
            }
            None => {
                warn!(
                    "Attempted to set state for non-existent player on connection {}",
                    client_id
                );
                None
            }
        }
    }

    pub fn set_position(&mut self, client_id: ConnectionId, position: Position) -> Option<&Player> {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.position = position;
                debug!(
                    "Updated position for player {} ({}) to {}",
                    player.name, client_id, position
                );
                Some(&*player)
            }
            None => {
                warn!(
                    "Attempted to update position for non-existent player on connection {}",
                    client_id
                );
                None
            }
        }
    }

    /// Updates the facing direction from its wire representation
    ///
    /// Anything other than up/down/left/right is rejected and leaves the
    /// record untouched. An unknown handle is `Ok(None)`.
    pub fn set_direction(
        &mut self,
        client_id: ConnectionId,
        direction: &str,
    ) -> Result<Option<&Player>, ParseDirectionError> {
        let Some(player) = self.players.get_mut(&client_id) else {
            warn!(
                "Attempted to update direction for non-existent player on connection {}",
                client_id
            );
            return Ok(None);
        };

        match direction.parse::<Direction>() {
            Ok(direction) => {
                player.direction = direction;
                debug!(
                    "Updated direction for player {} ({}) to {}",
                    player.name, client_id, direction
                );
                Ok(Some(&*player))
            }
            Err(e) => {
                warn!("Invalid direction '{}' received for connection {}", direction, client_id);
                Err(e)
            }
        }
    }

    pub fn list_all(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    /// Every player except the one on `client_id`
    pub fn list_others(&self, client_id: ConnectionId) -> Vec<Player> {
        self.players
            .iter()
            .filter(|(id, _)| **id != client_id)
            .map(|(_, player)| player.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
