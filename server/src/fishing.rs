//! Fishing coordinator: the authoritative fishing state machine
//!
//! The coordinator owns every piece of mutable session state (players, fish,
//! spot occupancy, active attempts) so that a single lock around it is enough
//! to serialize all mutations. Its operations are synchronous; the async
//! hook resolution rounds in `crate::hook` call back into it one round at a
//! time.
//!
//! ```text
//! idle ──start_cast──▶ fishing ──hook──▶ hooked ──finish_hook──▶ idle
//!                         │
//!                         ├──cancel──────────────────────────────▶ idle
//!                         └──rounds exhausted────────────────────▶ idle
//! ```
//!
//! Every attempt carries a generation number. A resolution task captures it
//! when it starts and every round checks that the stored attempt still has
//! the same generation; a cancel, disconnect or newer cast changes or removes
//! it and the task quietly stops.

use crate::error::{GameError, GameResult};
use crate::events::EventSink;
use crate::player_registry::PlayerRegistry;
use crate::world::World;
use fishing_shared::{
    CastRequest, ConnectionId, Fish, HookOutcome, HookStatus, Player, PlayerId, PlayerState,
    Position, ServerEvent, BASE_HOOK_CHANCE, CAST_DISTANCE_RANGE, DEFAULT_CAST_POWER,
    HOOK_DISTANCE_BONUS, HOOK_RADIUS, HOOK_ROUND_INTERVAL_MS, MAX_HOOK_ROUNDS, MIN_CAST_DISTANCE,
    SPOT_GRID_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};
use log::{debug, error, info, warn};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for casting and hook resolution
#[derive(Debug, Clone, PartialEq)]
pub struct FishingRules {
    pub min_cast_distance: f32,
    pub cast_distance_range: f32,
    pub grid_size: f32,
    pub hook_radius: f32,
    pub base_hook_chance: f32,
    pub hook_distance_bonus: f32,
    pub max_rounds: u32,
    pub round_interval: Duration,
}

impl Default for FishingRules {
    fn default() -> Self {
        Self {
            min_cast_distance: MIN_CAST_DISTANCE,
            cast_distance_range: CAST_DISTANCE_RANGE,
            grid_size: SPOT_GRID_SIZE,
            hook_radius: HOOK_RADIUS,
            base_hook_chance: BASE_HOOK_CHANCE,
            hook_distance_bonus: HOOK_DISTANCE_BONUS,
            max_rounds: MAX_HOOK_ROUNDS,
            round_interval: Duration::from_millis(HOOK_ROUND_INTERVAL_MS),
        }
    }
}

impl FishingRules {
    pub fn max_cast_distance(&self, power: f32) -> f32 {
        self.min_cast_distance + self.cast_distance_range * power
    }

    /// Chance of a bite for a fish `distance` away from the bobber
    ///
    /// Falls linearly from `base + bonus` when co-located to `base` at the
    /// edge of the hook radius.
    pub fn hook_threshold(&self, distance: f32) -> f32 {
        let distance_factor = if self.hook_radius > 0.0 {
            (1.0 - distance / self.hook_radius).max(0.0)
        } else {
            1.0
        };
        self.base_hook_chance + self.hook_distance_bonus * distance_factor
    }
}

/// Quantized grid cell a line lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpotId {
    pub x: i32,
    pub y: i32,
}

impl SpotId {
    /// Rounds half-way cases to the even cell.
    pub fn from_position(position: Position, grid_size: f32) -> Self {
        Self {
            x: (position.x / grid_size).round_ties_even() as i32,
            y: (position.y / grid_size).round_ties_even() as i32,
        }
    }
}

impl fmt::Display for SpotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Where a cast from `start` toward `target` lands
///
/// The line follows the straight segment toward the target but never goes
/// past it, and never further than the range allowed by `power`.
pub fn cast_endpoint(
    start: Position,
    target: Position,
    power: f32,
    rules: &FishingRules,
) -> Position {
    let max_distance = rules.max_cast_distance(power);
    let dx = target.x - start.x;
    let dy = target.y - start.y;
    let distance = dx.hypot(dy);

    if distance == 0.0 {
        return start;
    }

    let ratio = (max_distance / distance).min(1.0);
    Position::new(start.x + dx * ratio, start.y + dy * ratio)
}

/// Validates raw cast input into `(power, target)`
///
/// Missing power falls back to the default charge; finite power is clamped
/// into `[0, 1]`. A missing or non-finite target, or non-finite power, is
/// rejected.
pub fn parse_cast_request(request: &CastRequest) -> GameResult<(f32, Position)> {
    let power = request.power.unwrap_or(DEFAULT_CAST_POWER);
    let invalid = || GameError::invalid("Invalid cast data format.");

    if !power.is_finite() {
        return Err(invalid());
    }
    let target = request.target.ok_or_else(invalid)?;
    if !target.is_finite() {
        return Err(invalid());
    }

    Ok((power.clamp(0.0, 1.0), target))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FishingAttempt {
    pub spot: SpotId,
    pub end_position: Position,
    pub generation: u64,
}

/// Result of a successful cast, used to draw the line on every client
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastGeometry {
    pub player_id: PlayerId,
    pub start_position: Position,
    pub end_position: Position,
    pub spot: SpotId,
    pub generation: u64,
}

impl CastGeometry {
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::LineCasted {
            player_id: self.player_id,
            start_pos: self.start_position,
            end_pos: self.end_position,
        }
    }
}

/// Outcome of one hook resolution round
#[derive(Debug, Clone, PartialEq)]
pub enum HookRound {
    /// The attempt was cancelled or replaced; the task must stop.
    Stale,
    NoFishNearby,
    Missed { threshold: f32, roll: f32 },
    Hooked(Fish),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub players: Vec<Player>,
    pub fish: Vec<Fish>,
}

pub struct FishingCoordinator {
    players: PlayerRegistry,
    world: World,
    /// Spot occupancy: which connection is fishing each grid cell
    spots: HashMap<SpotId, ConnectionId>,
    attempts: HashMap<ConnectionId, FishingAttempt>,
    /// Fish on the line for players in the hooked state
    hooked: HashMap<ConnectionId, Fish>,
    next_generation: u64,
    rules: FishingRules,
    dice: Box<dyn RngCore + Send>,
    sink: Arc<dyn EventSink>,
}

impl FishingCoordinator {
    pub fn new(
        world: World,
        rules: FishingRules,
        dice: Box<dyn RngCore + Send>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        info!("Fishing coordinator initialized.");
        Self {
            players: PlayerRegistry::new(),
            world,
            spots: HashMap::new(),
            attempts: HashMap::new(),
            hooked: HashMap::new(),
            next_generation: 1,
            rules,
            dice,
            sink,
        }
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn rules(&self) -> &FishingRules {
        &self.rules
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub fn attempt(&self, client_id: ConnectionId) -> Option<&FishingAttempt> {
        self.attempts.get(&client_id)
    }

    pub fn spot_owner(&self, spot: SpotId) -> Option<ConnectionId> {
        self.spots.get(&spot).copied()
    }

    pub fn occupied_spots(&self) -> Vec<(SpotId, ConnectionId)> {
        self.spots.iter().map(|(spot, id)| (*spot, *id)).collect()
    }

    pub fn hooked_fish(&self, client_id: ConnectionId) -> Option<&Fish> {
        self.hooked.get(&client_id)
    }

    /// Registers a freshly joined player at the centre of the world
    ///
    /// A handle that already has a player has its old line pulled first so
    /// no attempt is left pointing at the replaced record.
    pub fn join(&mut self, client_id: ConnectionId, name: &str) -> Player {
        if self.players.get(client_id).is_some() {
            if let Some(player_id) = self.clear_attempt(client_id) {
                self.sink.broadcast(ServerEvent::LineRemoved { player_id });
            }
        }

        let name = match name.trim() {
            "" => format!("Player_{}", client_id),
            trimmed => trimmed.to_string(),
        };
        let player = Player::new(name, Position::new(WORLD_WIDTH / 2.0, WORLD_HEIGHT / 2.0));
        self.players.add(client_id, player.clone());
        player
    }

    /// Tears down everything tied to a connection handle
    pub fn leave(&mut self, client_id: ConnectionId) -> Option<Player> {
        if let Some(player_id) = self.clear_attempt(client_id) {
            self.sink.broadcast_others(client_id, ServerEvent::LineRemoved { player_id });
        }
        let player = self.players.remove(client_id)?;
        self.sink.broadcast_others(client_id, ServerEvent::PlayerLeft { id: player.id });
        Some(player)
    }

    pub fn move_player(
        &mut self,
        client_id: ConnectionId,
        position: Position,
    ) -> GameResult<Player> {
        if !position.is_finite() {
            return Err(GameError::invalid("Invalid position."));
        }
        let player = self
            .players
            .set_position(client_id, position)
            .cloned()
            .ok_or(GameError::NotFound(client_id))?;
        self.sink.broadcast_others(
            client_id,
            ServerEvent::PlayerMoved {
                player: player.clone(),
            },
        );
        Ok(player)
    }

    pub fn face_player(&mut self, client_id: ConnectionId, direction: &str) -> GameResult<Player> {
        let player = self
            .players
            .set_direction(client_id, direction)?
            .cloned()
            .ok_or(GameError::NotFound(client_id))?;
        self.sink.broadcast_others(
            client_id,
            ServerEvent::PlayerFaced {
                id: player.id,
                direction: player.direction,
            },
        );
        Ok(player)
    }

    pub fn world_snapshot(&self, client_id: ConnectionId) -> WorldSnapshot {
        WorldSnapshot {
            players: self.players.list_others(client_id),
            fish: self.world.list_all(),
        }
    }

    /// Starts a fishing attempt for an idle player
    ///
    /// On success the spot is claimed, the attempt is stored under a new
    /// generation and the player moves to `Fishing`. The caller is
    /// responsible for announcing the line and starting hook resolution.
    pub fn start_cast(
        &mut self,
        client_id: ConnectionId,
        request: &CastRequest,
    ) -> GameResult<CastGeometry> {
        let player = self
            .players
            .get(client_id)
            .ok_or(GameError::NotFound(client_id))?;

        if player.state != PlayerState::Idle {
            warn!(
                "Player {} ({}) tried to cast while not idle (state: {})",
                player.name, client_id, player.state
            );
            return Err(GameError::invalid("Cannot cast line while not idle."));
        }

        let (power, target) = parse_cast_request(request).map_err(|e| {
            error!(
                "Invalid cast data received from connection {}: {:?}",
                client_id, request
            );
            e
        })?;

        let start = player.position;
        let player_id = player.id;
        let player_name = player.name.clone();

        let end_position = cast_endpoint(start, target, power, &self.rules);
        let spot = SpotId::from_position(end_position, self.rules.grid_size);
        info!(
            "Player {} ({}) casting towards {}, power {:.2}. Landing at {}, spot {}",
            player_name, client_id, target, power, end_position, spot
        );

        if let Some(occupant) = self.spot_owner(spot) {
            let occupier_name = self
                .players
                .get(occupant)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "another player".to_string());
            info!(
                "Cast failed for {} ({}): spot {} occupied by {} ({})",
                player_name, client_id, spot, occupier_name, occupant
            );
            return Err(GameError::invalid(format!(
                "Fishing spot is occupied by {}.",
                occupier_name
            )));
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        self.spots.insert(spot, client_id);
        self.attempts.insert(
            client_id,
            FishingAttempt {
                spot,
                end_position,
                generation,
            },
        );
        self.set_state_and_announce(client_id, PlayerState::Fishing, Some(end_position))
            .ok_or(GameError::NotFound(client_id))?;

        Ok(CastGeometry {
            player_id,
            start_position: start,
            end_position,
            spot,
            generation,
        })
    }

    /// Drops the attempt for a connection and returns the player to idle
    ///
    /// Safe to call any number of times. The spot is only released if this
    /// connection still owns it. Returns the player id when the player was
    /// actually reset, which is the signal to broadcast `line_removed`.
    pub fn clear_attempt(&mut self, client_id: ConnectionId) -> Option<PlayerId> {
        debug!("Clearing fishing attempt for connection {}", client_id);
        self.release_attempt(client_id);
        self.hooked.remove(&client_id);

        let line_out = self
            .players
            .get(client_id)
            .map(|p| p.state.has_line_out())
            .unwrap_or(false);
        if !line_out {
            return None;
        }

        self.set_state_and_announce(client_id, PlayerState::Idle, None)
            .map(|p| p.id)
    }

    pub fn cancel(&mut self, client_id: ConnectionId) -> GameResult<()> {
        let Some(player) = self.players.get(client_id) else {
            warn!(
                "cancel called for unknown or disconnected connection {}",
                client_id
            );
            return Ok(());
        };

        if player.state != PlayerState::Fishing {
            warn!(
                "Player {} ({}) tried to cancel fishing but was not fishing (state: {})",
                player.name, client_id, player.state
            );
            return Err(GameError::invalid(
                "Cannot cancel cast, not currently fishing.",
            ));
        }

        info!(
            "Player {} ({}) is cancelling their fishing attempt.",
            player.name, client_id
        );

        match self.clear_attempt(client_id) {
            Some(player_id) => self.sink.broadcast(ServerEvent::LineRemoved { player_id }),
            None => warn!(
                "clear_attempt returned no player for {} during cancellation",
                client_id
            ),
        }
        Ok(())
    }

    pub fn is_current(&self, client_id: ConnectionId, generation: u64) -> bool {
        self.attempts
            .get(&client_id)
            .map(|a| a.generation == generation)
            .unwrap_or(false)
    }

    /// Runs one bite check for the attempt `generation` of `client_id`
    ///
    /// `round` is zero based. Progress is reported to the owning connection
    /// before the roll is evaluated.
    pub fn hook_round(
        &mut self,
        client_id: ConnectionId,
        generation: u64,
        round: u32,
    ) -> GameResult<HookRound> {
        let Some(attempt) = self
            .attempts
            .get(&client_id)
            .filter(|a| a.generation == generation)
            .copied()
        else {
            return Ok(HookRound::Stale);
        };

        let attempts_left = self.rules.max_rounds.saturating_sub(round);
        let nearby = self
            .world
            .find_near(attempt.end_position, self.rules.hook_radius);

        let Some(candidate) = nearby.into_iter().next() else {
            debug!(
                "Hook check {} for {}: no fish nearby.",
                round + 1,
                client_id
            );
            self.sink.send_to(
                client_id,
                ServerEvent::HookAttemptUpdate {
                    threshold: 0.0,
                    roll: -1.0,
                    attempts_left,
                    status: HookStatus::NoFishNearby,
                },
            );
            return Ok(HookRound::NoFishNearby);
        };

        let distance = candidate.position.distance(&attempt.end_position);
        let threshold = self.rules.hook_threshold(distance);
        if !threshold.is_finite() {
            return Err(GameError::Internal(format!(
                "non-finite hook threshold for fish {}",
                candidate.id
            )));
        }
        let roll: f32 = self.dice.gen();

        debug!(
            "Hook check {} for {}: fish {} nearby. Threshold: {:.2}, Roll: {:.2}",
            round + 1,
            client_id,
            candidate.id,
            threshold,
            roll
        );
        self.sink.send_to(
            client_id,
            ServerEvent::HookAttemptUpdate {
                threshold,
                roll,
                attempts_left,
                status: HookStatus::Checking,
            },
        );

        if roll >= threshold {
            return Ok(HookRound::Missed { threshold, roll });
        }

        info!(
            "Fish hooked for {}! Fish: {} ({})",
            client_id, candidate.species, candidate.id
        );
        self.set_state_and_announce(client_id, PlayerState::Hooked, Some(attempt.end_position))
            .ok_or_else(|| {
                GameError::Internal(format!("attempt without player on connection {}", client_id))
            })?;
        self.sink.send_to(
            client_id,
            ServerEvent::FishHooked {
                fish: candidate.clone(),
            },
        );

        // The line stays out while hooked; only the spot and attempt go.
        self.release_attempt(client_id);
        self.hooked.insert(client_id, candidate.clone());

        Ok(HookRound::Hooked(candidate))
    }

    /// Ends an attempt that ran out of rounds without a bite
    pub fn expire_attempt(&mut self, client_id: ConnectionId, generation: u64) {
        if !self.is_current(client_id, generation) {
            return;
        }
        info!("No bite for {} after {} attempts.", client_id, self.rules.max_rounds);

        let player_id = self.clear_attempt(client_id);
        self.sink.send_to(
            client_id,
            ServerEvent::CastFailed {
                reason: "No fish bit.".to_string(),
            },
        );
        if let Some(player_id) = player_id {
            self.sink.broadcast(ServerEvent::LineRemoved { player_id });
        }
    }

    /// Cleans up after a resolution task failed
    ///
    /// Only tears down the attempt if it is still the one the task owned.
    /// The owning connection is always told something went wrong.
    pub fn abort_attempt(&mut self, client_id: ConnectionId, generation: u64) {
        if self.is_current(client_id, generation) {
            if let Some(player_id) = self.clear_attempt(client_id) {
                self.sink.broadcast(ServerEvent::LineRemoved { player_id });
            }
        }
        self.sink.send_to(
            client_id,
            ServerEvent::Error {
                message: "An error occurred during fishing.".to_string(),
            },
        );
    }

    /// Resolves a hooked fish, either landing it or letting it go
    pub fn finish_hook(&mut self, client_id: ConnectionId, outcome: HookOutcome) -> GameResult<()> {
        let player = self
            .players
            .get(client_id)
            .ok_or(GameError::NotFound(client_id))?;
        if player.state != PlayerState::Hooked {
            return Err(GameError::invalid(
                "Cannot finish hook, no fish on the line.",
            ));
        }
        let player_id = player.id;

        let hooked = self.hooked.remove(&client_id);
        let landed = match (outcome, hooked) {
            (HookOutcome::Caught, Some(fish)) => self.world.remove(fish.id),
            _ => None,
        };

        match landed {
            Some(fish) => {
                info!("Player {} caught {} ({})", client_id, fish.species, fish.id);
                self.sink.broadcast(ServerEvent::FishCaught { player_id, fish });
            }
            None => {
                info!("Fish escaped from player {}", client_id);
                self.sink.broadcast(ServerEvent::FishEscaped { player_id });
            }
        }

        if let Some(player_id) = self.clear_attempt(client_id) {
            self.sink.broadcast(ServerEvent::LineRemoved { player_id });
        }
        Ok(())
    }

    fn release_attempt(&mut self, client_id: ConnectionId) -> Option<FishingAttempt> {
        let attempt = self.attempts.remove(&client_id)?;
        if self.spots.get(&attempt.spot) == Some(&client_id) {
            self.spots.remove(&attempt.spot);
            info!("Cleared occupied spot {} for connection {}", attempt.spot, client_id);
        }
        Some(attempt)
    }

    fn set_state_and_announce(
        &mut self,
        client_id: ConnectionId,
        state: PlayerState,
        fishing_target: Option<Position>,
    ) -> Option<Player> {
        let player = self
            .players
            .set_state(client_id, state, fishing_target)?
            .clone();
        self.sink.broadcast(ServerEvent::PlayerStateChanged {
            id: player.id,
            state: player.state,
        });
        Some(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, Delivery, Outbound};
    use assert_approx_eq::assert_approx_eq;
    use fishing_shared::Rarity;
    use rand::rngs::mock::StepRng;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Rolls 0.0 forever: every check with a fish in range bites.
    fn always_bite() -> Box<dyn RngCore + Send> {
        Box::new(StepRng::new(0, 0))
    }

    /// Rolls just under 1.0 forever: nothing ever bites.
    fn never_bite() -> Box<dyn RngCore + Send> {
        Box::new(StepRng::new(u64::MAX, 0))
    }

    fn coordinator(
        dice: Box<dyn RngCore + Send>,
    ) -> (FishingCoordinator, UnboundedReceiver<Outbound>) {
        let (sink, rx) = ChannelSink::channel();
        let coordinator = FishingCoordinator::new(
            World::from_seed(7),
            FishingRules::default(),
            dice,
            Arc::new(sink),
        );
        (coordinator, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn names(events: &[Outbound]) -> Vec<&'static str> {
        events.iter().map(|o| o.event.name()).collect()
    }

    fn cast_toward(x: f32, y: f32) -> CastRequest {
        CastRequest {
            power: Some(1.0),
            target: Some(Position::new(x, y)),
        }
    }

    const CENTRE: Position = Position::new(WORLD_WIDTH / 2.0, WORLD_HEIGHT / 2.0);

    #[test]
    fn test_endpoint_min_and_max_power() {
        let rules = FishingRules::default();
        let start = Position::new(100.0, 100.0);
        let far_target = Position::new(1000.0, 100.0);

        let weak = cast_endpoint(start, far_target, 0.0, &rules);
        assert_approx_eq!(weak.x, 150.0);
        assert_approx_eq!(weak.y, 100.0);

        let strong = cast_endpoint(start, far_target, 1.0, &rules);
        assert_approx_eq!(strong.distance(&start), 300.0, 1e-3);
    }

    #[test]
    fn test_endpoint_never_overshoots_target() {
        let rules = FishingRules::default();
        let start = Position::new(0.0, 0.0);
        let near_target = Position::new(30.0, 40.0);

        let end = cast_endpoint(start, near_target, 1.0, &rules);
        assert_eq!(end, near_target);
    }

    #[test]
    fn test_endpoint_diagonal_is_capped() {
        let rules = FishingRules::default();
        let start = Position::new(0.0, 0.0);
        let end = cast_endpoint(start, Position::new(300.0, 400.0), 0.0, &rules);
        assert_approx_eq!(end.x, 30.0, 1e-4);
        assert_approx_eq!(end.y, 40.0, 1e-4);
    }

    #[test]
    fn test_endpoint_far_target_is_capped() {
        let rules = FishingRules::default();
        let end = cast_endpoint(CENTRE, Position::new(1e20, 300.0), 1.0, &rules);

        assert_approx_eq!(end.distance(&CENTRE), 300.0, 1e-3);
        assert_approx_eq!(end.x, 700.0, 1e-3);
        assert_approx_eq!(end.y, 300.0);
    }

    #[test]
    fn test_endpoint_target_on_player() {
        let rules = FishingRules::default();
        let start = Position::new(42.0, 17.0);
        for power in [0.0, 0.5, 1.0] {
            assert_eq!(cast_endpoint(start, start, power, &rules), start);
        }
    }

    #[test]
    fn test_spot_id_quantization() {
        assert_eq!(SpotId::from_position(Position::new(0.0, 0.0), 50.0), SpotId { x: 0, y: 0 });
        assert_eq!(SpotId::from_position(Position::new(74.0, 126.0), 50.0), SpotId { x: 1, y: 3 });
        assert_eq!(SpotId::from_position(Position::new(-30.0, 10.0), 50.0), SpotId { x: -1, y: 0 });
        // Half-way rounds to even
        assert_eq!(SpotId::from_position(Position::new(25.0, 75.0), 50.0), SpotId { x: 0, y: 2 });
        assert_eq!(SpotId { x: 3, y: -2 }.to_string(), "3,-2");
    }

    #[test]
    fn test_hook_threshold() {
        let rules = FishingRules::default();
        assert_approx_eq!(rules.hook_threshold(0.0), 0.5);
        assert_approx_eq!(rules.hook_threshold(12.5), 0.3);
        assert_approx_eq!(rules.hook_threshold(25.0), 0.1);
        assert_approx_eq!(rules.hook_threshold(40.0), 0.1);
    }

    #[test]
    fn test_parse_cast_request() {
        let (power, target) = parse_cast_request(&CastRequest {
            power: None,
            target: Some(Position::new(1.0, 2.0)),
        })
        .unwrap();
        assert_approx_eq!(power, DEFAULT_CAST_POWER);
        assert_eq!(target, Position::new(1.0, 2.0));

        let (power, _) = parse_cast_request(&CastRequest {
            power: Some(3.0),
            target: Some(Position::new(1.0, 2.0)),
        })
        .unwrap();
        assert_approx_eq!(power, 1.0);

        for bad in [
            CastRequest {
                power: Some(f32::NAN),
                target: Some(Position::new(1.0, 2.0)),
            },
            CastRequest {
                power: Some(0.5),
                target: None,
            },
            CastRequest {
                power: Some(0.5),
                target: Some(Position::new(f32::INFINITY, 2.0)),
            },
        ] {
            assert!(matches!(
                parse_cast_request(&bad),
                Err(GameError::InvalidAction(_))
            ));
        }
    }

    #[test]
    fn test_join_places_player_at_centre() {
        let (mut c, mut rx) = coordinator(never_bite());
        let player = c.join(1, "  ");

        assert_eq!(player.name, "Player_1");
        assert_eq!(player.position, CENTRE);
        assert_eq!(player.state, PlayerState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_start_cast_claims_spot() {
        let (mut c, mut rx) = coordinator(never_bite());
        let player = c.join(1, "Ada");

        let geometry = c.start_cast(1, &cast_toward(CENTRE.x + 1000.0, CENTRE.y)).unwrap();

        assert_eq!(geometry.player_id, player.id);
        assert_eq!(geometry.start_position, CENTRE);
        assert_approx_eq!(geometry.end_position.x, CENTRE.x + 300.0);
        assert_eq!(c.spot_owner(geometry.spot), Some(1));
        assert_eq!(c.attempt(1).map(|a| a.generation), Some(geometry.generation));

        let stored = c.players().get(1).unwrap();
        assert_eq!(stored.state, PlayerState::Fishing);
        assert_eq!(stored.fishing_target, Some(geometry.end_position));

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["player_state_changed"]);
        assert_eq!(events[0].delivery, Delivery::All);
    }

    #[test]
    fn test_start_cast_unknown_handle() {
        let (mut c, _rx) = coordinator(never_bite());
        assert_eq!(
            c.start_cast(9, &cast_toward(0.0, 0.0)),
            Err(GameError::NotFound(9))
        );
    }

    #[test]
    fn test_start_cast_rejects_malformed_request() {
        let (mut c, mut rx) = coordinator(never_bite());
        c.join(1, "Ada");

        let result = c.start_cast(
            1,
            &CastRequest {
                power: Some(0.5),
                target: None,
            },
        );

        assert_eq!(result, Err(GameError::invalid("Invalid cast data format.")));
        assert!(c.attempt(1).is_none());
        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_second_cast_while_fishing_is_rejected() {
        let (mut c, _rx) = coordinator(never_bite());
        c.join(1, "Ada");
        let first = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        let spots_before = c.occupied_spots();

        let result = c.start_cast(1, &cast_toward(WORLD_WIDTH, WORLD_HEIGHT));

        assert_eq!(result, Err(GameError::invalid("Cannot cast line while not idle.")));
        assert_eq!(c.occupied_spots(), spots_before);
        assert_eq!(c.attempt(1).map(|a| a.generation), Some(first.generation));
    }

    #[test]
    fn test_spot_collision_names_occupant() {
        let (mut c, _rx) = coordinator(never_bite());
        c.join(1, "Ada");
        c.join(2, "Grace");

        let target = Position::new(CENTRE.x, CENTRE.y - 40.0);
        let first = c.start_cast(1, &cast_toward(target.x, target.y)).unwrap();

        // Lands a few units away, inside the same grid cell.
        let second = c.start_cast(2, &cast_toward(target.x + 3.0, target.y));

        assert_eq!(
            second,
            Err(GameError::invalid("Fishing spot is occupied by Ada."))
        );
        assert_eq!(c.spot_owner(first.spot), Some(1));
        assert_eq!(c.attempt(1).map(|a| a.generation), Some(first.generation));
        assert!(c.attempt(2).is_none());
        assert_eq!(c.players().get(2).unwrap().state, PlayerState::Idle);
    }

    #[test]
    fn test_spot_collision_with_departed_occupant() {
        let (mut c, _rx) = coordinator(never_bite());
        c.join(1, "Ada");
        c.join(2, "Grace");
        c.start_cast(1, &cast_toward(CENTRE.x, CENTRE.y - 40.0)).unwrap();

        // Drop the occupant's record without going through leave().
        c.players.remove(1);

        let result = c.start_cast(2, &cast_toward(CENTRE.x, CENTRE.y - 40.0));
        assert_eq!(
            result,
            Err(GameError::invalid("Fishing spot is occupied by another player."))
        );
    }

    #[test]
    fn test_clear_attempt_is_idempotent() {
        let (mut c, mut rx) = coordinator(never_bite());
        let player = c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        assert_eq!(c.clear_attempt(1), Some(player.id));
        assert!(c.spot_owner(geometry.spot).is_none());
        assert!(c.attempt(1).is_none());
        assert_eq!(names(&drain(&mut rx)), vec!["player_state_changed"]);

        assert_eq!(c.clear_attempt(1), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_clear_attempt_leaves_reassigned_spot_alone() {
        let (mut c, _rx) = coordinator(never_bite());
        c.join(1, "Ada");
        c.join(2, "Grace");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();

        // Simulate the spot having been handed to someone else already.
        c.spots.insert(geometry.spot, 2);
        c.clear_attempt(1);

        assert_eq!(c.spot_owner(geometry.spot), Some(2));
    }

    #[test]
    fn test_cancel_while_fishing() {
        let (mut c, mut rx) = coordinator(never_bite());
        let player = c.join(1, "Ada");
        c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        c.cancel(1).unwrap();

        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Idle);
        assert!(c.occupied_spots().is_empty());
        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["player_state_changed", "line_removed"]);
        assert_eq!(
            events[1].event,
            ServerEvent::LineRemoved {
                player_id: player.id
            }
        );
    }

    #[test]
    fn test_cancel_requires_fishing() {
        let (mut c, _rx) = coordinator(never_bite());
        c.join(1, "Ada");
        assert_eq!(
            c.cancel(1),
            Err(GameError::invalid("Cannot cancel cast, not currently fishing."))
        );
        assert_eq!(c.cancel(42), Ok(()));
    }

    #[test]
    fn test_hook_round_without_fish() {
        let (mut c, mut rx) = coordinator(always_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        let round = c.hook_round(1, geometry.generation, 0).unwrap();

        assert_eq!(round, HookRound::NoFishNearby);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delivery, Delivery::To(1));
        assert_eq!(
            events[0].event,
            ServerEvent::HookAttemptUpdate {
                threshold: 0.0,
                roll: -1.0,
                attempts_left: 15,
                status: HookStatus::NoFishNearby,
            }
        );
    }

    #[test]
    fn test_hook_round_bite_moves_player_to_hooked() {
        let (mut c, mut rx) = coordinator(always_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        let fish = c
            .world_mut()
            .spawn_at("Bass", Rarity::Common, 10.0, geometry.end_position);
        drain(&mut rx);

        let round = c.hook_round(1, geometry.generation, 2).unwrap();

        assert_eq!(round, HookRound::Hooked(fish.clone()));
        let player = c.players().get(1).unwrap();
        assert_eq!(player.state, PlayerState::Hooked);
        assert_eq!(player.fishing_target, Some(geometry.end_position));
        assert!(c.attempt(1).is_none());
        assert!(c.spot_owner(geometry.spot).is_none());
        assert_eq!(c.hooked_fish(1), Some(&fish));

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["hook_attempt_update", "player_state_changed", "fish_hooked"]
        );
        match &events[0].event {
            ServerEvent::HookAttemptUpdate {
                threshold,
                roll,
                attempts_left,
                status,
            } => {
                assert_approx_eq!(*threshold, 0.5);
                assert_approx_eq!(*roll, 0.0);
                assert_eq!(*attempts_left, 13);
                assert_eq!(*status, HookStatus::Checking);
            }
            other => panic!("Unexpected event {:?}", other),
        }
        assert_eq!(events[2].delivery, Delivery::To(1));
    }

    #[test]
    fn test_hook_round_miss_keeps_fishing() {
        let (mut c, mut rx) = coordinator(never_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        c.world_mut()
            .spawn_at("Bass", Rarity::Common, 10.0, geometry.end_position);
        drain(&mut rx);

        let round = c.hook_round(1, geometry.generation, 0).unwrap();

        assert!(matches!(round, HookRound::Missed { .. }));
        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Fishing);
        assert_eq!(names(&drain(&mut rx)), vec!["hook_attempt_update"]);
    }

    #[test]
    fn test_hook_round_detects_stale_generation() {
        let (mut c, mut rx) = coordinator(always_bite());
        c.join(1, "Ada");
        let first = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        c.cancel(1).unwrap();
        let second = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        assert_ne!(first.generation, second.generation);
        assert_eq!(c.hook_round(1, first.generation, 1), Ok(HookRound::Stale));
        assert!(drain(&mut rx).is_empty());
        assert!(c.is_current(1, second.generation));
    }

    #[test]
    fn test_expire_attempt() {
        let (mut c, mut rx) = coordinator(never_bite());
        let player = c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        c.expire_attempt(1, geometry.generation);

        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Idle);
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["player_state_changed", "cast_failed", "line_removed"]
        );
        assert_eq!(events[1].delivery, Delivery::To(1));
        assert_eq!(events[2].delivery, Delivery::All);
        assert_eq!(
            events[2].event,
            ServerEvent::LineRemoved {
                player_id: player.id
            }
        );

        // A second expiry for the same generation is a no-op.
        c.expire_attempt(1, geometry.generation);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_abort_attempt_does_not_touch_newer_attempt() {
        let (mut c, mut rx) = coordinator(never_bite());
        c.join(1, "Ada");
        let first = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        c.cancel(1).unwrap();
        let second = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        c.abort_attempt(1, first.generation);

        assert!(c.is_current(1, second.generation));
        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Fishing);
        assert_eq!(names(&drain(&mut rx)), vec!["error"]);
    }

    #[test]
    fn test_abort_attempt_cleans_up_current_attempt() {
        let (mut c, mut rx) = coordinator(never_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        c.abort_attempt(1, geometry.generation);

        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Idle);
        assert!(c.occupied_spots().is_empty());
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["player_state_changed", "line_removed", "error"]
        );
    }

    #[test]
    fn test_cancel_rejected_while_hooked() {
        let (mut c, _rx) = coordinator(always_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        c.world_mut()
            .spawn_at("Bass", Rarity::Common, 10.0, geometry.end_position);
        c.hook_round(1, geometry.generation, 0).unwrap();

        assert!(matches!(c.cancel(1), Err(GameError::InvalidAction(_))));
        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Hooked);
    }

    #[test]
    fn test_finish_hook_caught_removes_fish() {
        let (mut c, mut rx) = coordinator(always_bite());
        let player = c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        let fish = c
            .world_mut()
            .spawn_at("Bass", Rarity::Common, 10.0, geometry.end_position);
        c.hook_round(1, geometry.generation, 0).unwrap();
        drain(&mut rx);

        c.finish_hook(1, HookOutcome::Caught).unwrap();

        assert!(c.world().get(fish.id).is_none());
        assert_eq!(c.players().get(1).unwrap().state, PlayerState::Idle);
        assert!(c.hooked_fish(1).is_none());
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["fish_caught", "player_state_changed", "line_removed"]
        );
        assert_eq!(
            events[0].event,
            ServerEvent::FishCaught {
                player_id: player.id,
                fish
            }
        );
    }

    #[test]
    fn test_finish_hook_released_keeps_fish() {
        let (mut c, mut rx) = coordinator(always_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        let fish = c
            .world_mut()
            .spawn_at("Bass", Rarity::Common, 10.0, geometry.end_position);
        c.hook_round(1, geometry.generation, 0).unwrap();
        drain(&mut rx);

        c.finish_hook(1, HookOutcome::Released).unwrap();

        assert!(c.world().get(fish.id).is_some());
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["fish_escaped", "player_state_changed", "line_removed"]
        );
    }

    #[test]
    fn test_finish_hook_fish_already_taken() {
        let (mut c, mut rx) = coordinator(always_bite());
        c.join(1, "Ada");
        let geometry = c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        let fish = c
            .world_mut()
            .spawn_at("Bass", Rarity::Common, 10.0, geometry.end_position);
        c.hook_round(1, geometry.generation, 0).unwrap();
        c.world_mut().remove(fish.id);
        drain(&mut rx);

        c.finish_hook(1, HookOutcome::Caught).unwrap();

        assert_eq!(names(&drain(&mut rx))[0], "fish_escaped");
    }

    #[test]
    fn test_finish_hook_requires_hooked() {
        let (mut c, _rx) = coordinator(always_bite());
        c.join(1, "Ada");
        assert!(matches!(
            c.finish_hook(1, HookOutcome::Caught),
            Err(GameError::InvalidAction(_))
        ));
        assert_eq!(
            c.finish_hook(2, HookOutcome::Caught),
            Err(GameError::NotFound(2))
        );
    }

    #[test]
    fn test_leave_while_fishing() {
        let (mut c, mut rx) = coordinator(never_bite());
        let player = c.join(1, "Ada");
        c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        let removed = c.leave(1).unwrap();

        assert_eq!(removed.id, player.id);
        assert!(c.occupied_spots().is_empty());
        assert!(c.attempt(1).is_none());
        assert!(c.players().is_empty());
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["player_state_changed", "line_removed", "player_left"]
        );
        assert_eq!(events[1].delivery, Delivery::AllExcept(1));
        assert_eq!(events[2].delivery, Delivery::AllExcept(1));

        assert!(c.leave(1).is_none());
    }

    #[test]
    fn test_move_and_face() {
        let (mut c, mut rx) = coordinator(never_bite());
        c.join(1, "Ada");

        let moved = c.move_player(1, Position::new(5.0, 6.0)).unwrap();
        assert_eq!(moved.position, Position::new(5.0, 6.0));

        let faced = c.face_player(1, "right").unwrap();
        assert_eq!(faced.direction, fishing_shared::Direction::Right);

        assert!(matches!(
            c.face_player(1, "north"),
            Err(GameError::InvalidAction(_))
        ));
        assert_eq!(
            c.move_player(2, Position::new(0.0, 0.0)),
            Err(GameError::NotFound(2))
        );
        assert!(matches!(
            c.move_player(1, Position::new(f32::NAN, 0.0)),
            Err(GameError::InvalidAction(_))
        ));

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["player_moved", "player_faced"]);
        assert!(events.iter().all(|o| o.delivery == Delivery::AllExcept(1)));
    }

    #[test]
    fn test_world_snapshot_excludes_requester() {
        let (mut c, _rx) = coordinator(never_bite());
        c.join(1, "Ada");
        c.join(2, "Grace");
        c.world_mut().spawn_initial(3);

        let snapshot = c.world_snapshot(1);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].name, "Grace");
        assert_eq!(snapshot.fish.len(), 3);
    }

    #[test]
    fn test_rejoin_pulls_existing_line() {
        let (mut c, mut rx) = coordinator(never_bite());
        c.join(1, "Ada");
        c.start_cast(1, &cast_toward(0.0, 0.0)).unwrap();
        drain(&mut rx);

        let player = c.join(1, "Ada again");

        assert_eq!(player.state, PlayerState::Idle);
        assert!(c.occupied_spots().is_empty());
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["player_state_changed", "line_removed"]
        );
    }
}
