use fishing_shared::{Fish, FishId, Position, Rarity, WORLD_HEIGHT, WORLD_WIDTH};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SPECIES: &str = "Bass";
pub const MIN_SPAWN_SIZE: f32 = 5.0;
pub const MAX_SPAWN_SIZE: f32 = 20.0;

/// Moves fish between world ticks.
pub trait FishMotion: Send {
    fn step(&mut self, fish: &mut [Fish], dt: f32);
}

/// Fish stay where they spawned.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stationary;

impl FishMotion for Stationary {
    fn step(&mut self, _fish: &mut [Fish], _dt: f32) {}
}

/// Catalog of fish currently swimming in the world.
///
/// Fish are kept in spawn order, which is also the order proximity queries
/// return them in.
pub struct World {
    fish: Vec<Fish>,
    rng: StdRng,
    motion: Box<dyn FishMotion>,
}

impl World {
    pub fn new(rng: StdRng) -> Self {
        Self::with_motion(rng, Box::new(Stationary))
    }

    pub fn with_motion(rng: StdRng, motion: Box<dyn FishMotion>) -> Self {
        Self {
            fish: Vec::new(),
            rng,
            motion,
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn spawn_initial(&mut self, count: usize) {
        info!("Spawning {} initial fish...", count);
        for _ in 0..count {
            let size = self.rng.gen_range(MIN_SPAWN_SIZE..MAX_SPAWN_SIZE);
            self.spawn(DEFAULT_SPECIES, Rarity::Common, size);
        }
        info!("Initial fish spawning complete.");
    }

    /// Spawns a fish at a uniformly random point inside the world bounds
    pub fn spawn(&mut self, species: &str, rarity: Rarity, size: f32) -> Fish {
        let position = Position::new(
            self.rng.gen_range(0.0..WORLD_WIDTH),
            self.rng.gen_range(0.0..WORLD_HEIGHT),
        );
        self.spawn_at(species, rarity, size, position)
    }

    pub fn spawn_at(
        &mut self,
        species: &str,
        rarity: Rarity,
        size: f32,
        position: Position,
    ) -> Fish {
        let fish = Fish::new(species, rarity, size, position);
        info!(
            "Spawned {} {} ({}) at {}",
            rarity, species, fish.id, position
        );
        self.fish.push(fish.clone());
        fish
    }

    pub fn remove(&mut self, fish_id: FishId) -> Option<Fish> {
        match self.fish.iter().position(|f| f.id == fish_id) {
            Some(index) => {
                let fish = self.fish.remove(index);
                info!("Removed fish {} ({})", fish.species, fish.id);
                Some(fish)
            }
            None => {
                warn!("Attempted to remove non-existent fish with ID {}", fish_id);
                None
            }
        }
    }

    pub fn get(&self, fish_id: FishId) -> Option<&Fish> {
        self.fish.iter().find(|f| f.id == fish_id)
    }

    pub fn list_all(&self) -> Vec<Fish> {
        self.fish.clone()
    }

    /// All fish within `radius` of `position`, boundary inclusive
    pub fn find_near(&self, position: Position, radius: f32) -> Vec<Fish> {
        self.fish
            .iter()
            .filter(|f| f.position.distance(&position) <= radius)
            .cloned()
            .collect()
    }

    pub fn update_positions(&mut self, dt: f32) {
        self.motion.step(&mut self.fish, dt);
    }

    pub fn len(&self) -> usize {
        self.fish.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fish.is_empty()
    }
}
