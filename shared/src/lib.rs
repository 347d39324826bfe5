//! Types shared between the fishing server and its clients.
//!
//! Everything that crosses the wire lives here: the world model (players,
//! fish, positions), the gameplay constants both sides agree on, and the
//! `Packet`/`ServerEvent` enums that make up the protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;

/// Side length of one fishing spot cell in world units.
pub const SPOT_GRID_SIZE: f32 = 50.0;

/// Cast range at zero charge.
pub const MIN_CAST_DISTANCE: f32 = 50.0;
/// Extra range gained at full charge.
pub const CAST_DISTANCE_RANGE: f32 = 250.0;
pub const DEFAULT_CAST_POWER: f32 = 0.5;

pub const HOOK_RADIUS: f32 = 25.0;
pub const BASE_HOOK_CHANCE: f32 = 0.1;
pub const HOOK_DISTANCE_BONUS: f32 = 0.4;
pub const MAX_HOOK_ROUNDS: u32 = 15;
pub const HOOK_ROUND_INTERVAL_MS: u64 = 1000;

pub const PROTOCOL_VERSION: u32 = 1;

/// Ephemeral per-connection handle assigned by the transport.
pub type ConnectionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FishId(pub Uuid);

impl FishId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FishId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid direction '{0}'")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

/// Coarse per-player fishing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    Idle,
    Casting,
    Fishing,
    Hooked,
}

impl PlayerState {
    /// True while the player has a line in the water.
    pub fn has_line_out(&self) -> bool {
        matches!(self, PlayerState::Fishing | PlayerState::Hooked)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Casting => "casting",
            PlayerState::Fishing => "fishing",
            PlayerState::Hooked => "hooked",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub direction: Direction,
    pub state: PlayerState,
    pub fishing_target: Option<Position>,
}

impl Player {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            position,
            direction: Direction::default(),
            state: PlayerState::Idle,
            fishing_target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fish {
    pub id: FishId,
    pub species: String,
    pub rarity: Rarity,
    pub size: f32,
    pub position: Position,
}

impl Fish {
    pub fn new(species: impl Into<String>, rarity: Rarity, size: f32, position: Position) -> Self {
        Self {
            id: FishId::new(),
            species: species.into(),
            rarity,
            size,
            position,
        }
    }
}

/// Raw cast parameters as sent by a client. Validated by the server.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CastRequest {
    pub power: Option<f32>,
    pub target: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookStatus {
    Checking,
    NoFishNearby,
}

/// How the follow-up to a hooked fish ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookOutcome {
    Caught,
    Released,
}

/// Events the server publishes to one or more connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    Welcome {
        player: Player,
    },
    WorldState {
        players: Vec<Player>,
        fish: Vec<Fish>,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        id: PlayerId,
    },
    PlayerMoved {
        player: Player,
    },
    PlayerFaced {
        id: PlayerId,
        direction: Direction,
    },
    PlayerStateChanged {
        id: PlayerId,
        state: PlayerState,
    },
    LineCasted {
        player_id: PlayerId,
        start_pos: Position,
        end_pos: Position,
    },
    HookAttemptUpdate {
        threshold: f32,
        roll: f32,
        attempts_left: u32,
        status: HookStatus,
    },
    FishHooked {
        fish: Fish,
    },
    FishCaught {
        player_id: PlayerId,
        fish: Fish,
    },
    FishEscaped {
        player_id: PlayerId,
    },
    CastFailed {
        reason: String,
    },
    LineRemoved {
        player_id: PlayerId,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Wire-level event name, used for logging and by clients that route on it.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::WorldState { .. } => "world_state",
            ServerEvent::PlayerJoined { .. } => "player_joined",
            ServerEvent::PlayerLeft { .. } => "player_left",
            ServerEvent::PlayerMoved { .. } => "player_moved",
            ServerEvent::PlayerFaced { .. } => "player_faced",
            ServerEvent::PlayerStateChanged { .. } => "player_state_changed",
            ServerEvent::LineCasted { .. } => "line_casted",
            ServerEvent::HookAttemptUpdate { .. } => "hook_attempt_update",
            ServerEvent::FishHooked { .. } => "fish_hooked",
            ServerEvent::FishCaught { .. } => "fish_caught",
            ServerEvent::FishEscaped { .. } => "fish_escaped",
            ServerEvent::CastFailed { .. } => "cast_failed",
            ServerEvent::LineRemoved { .. } => "line_removed",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect { client_version: u32 },
    JoinGame { name: String },
    Move { position: Position },
    Face { direction: String },
    StartCast(CastRequest),
    CancelCast,
    FinishHook { outcome: HookOutcome },
    Disconnect,

    Connected { client_id: ConnectionId },
    Event(ServerEvent),
    Disconnected { reason: String },
}
