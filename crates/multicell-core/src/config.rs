use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::WorldStateError;
use crate::cell::CellType;
use crate::genome::DecodeParams;
use crate::resources::{Quantity, ResourceTable};

/// Static configuration for a Multicell world, read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MulticellConfig {
    /// Edge length of the square toroidal grid.
    pub world_size: u32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Largest amount of energy a cell may hold.
    pub max_energy: Quantity,
    /// Largest amount of water a cell may hold.
    pub max_water: Quantity,
    /// Largest amount of organic matter a cell may hold (organic is ground-only by default).
    pub max_organic: Quantity,
    /// Sunlight potential of every ground position; a lone leaf harvests this much per tick.
    pub sunlight_level: Quantity,
    /// Organic matter initially present at every ground position.
    pub starting_organic: Quantity,
    /// Water initially present at every ground position.
    pub starting_ground_water: Quantity,
    /// Ceiling for ground water regeneration.
    pub max_ground_water: Quantity,
    /// Water restored to each ground position per tick.
    pub water_regeneration: Quantity,
    /// Organic matter extracted per footprint position per harvest.
    pub organic_drain_per_position: Quantity,
    /// Water extracted per footprint position per harvest.
    pub water_extraction_per_position: Quantity,
    pub leaf_spawn_energy: Quantity,
    pub trunk_spawn_energy: Quantity,
    pub flower_spawn_energy: Quantity,
    pub seed_spawn_energy: Quantity,
    pub sprout_spawn_energy: Quantity,
    pub root_spawn_energy: Quantity,
    pub connector_spawn_energy: Quantity,
    /// Energy drained from every cell per tick (halved for Seed, Sprout and Trunk).
    pub energy_tax: Quantity,
    /// Water drained from every cell per tick.
    pub water_tax: Quantity,
    /// Amount moved per exchange during resource balancing, per kind.
    pub energy_transfer_step: Quantity,
    pub water_transfer_step: Quantity,
    pub organic_transfer_step: Quantity,
    /// Death returns `spawn cost * rot_multiplier` organic matter to the ground.
    pub rot_multiplier: Quantity,
    /// Ticks a non-seed cell may live.
    pub max_age: u32,
    /// Seeds tolerate `max_age * seed_age_multiplier` ticks.
    pub seed_age_multiplier: u32,
    /// Upper bound (exclusive) for decoded seed flight durations.
    pub max_seed_flying_distance: u8,
    /// Ticks a flower waits between seeds.
    pub flower_cooldown: u32,
    /// Water reserve given to each seed a flower produces.
    pub seed_starting_water: Quantity,
    /// Water a trunk hands to each sprout it stages.
    pub sprout_spawn_water: Quantity,
    /// Per-byte replacement probability during genome reproduction.
    pub mutation_chance: f64,
    /// Probability that a given position receives a founding seed when seeding.
    pub seeding_density: f64,
    /// Consecutive ticks without a Sprout or Flower before the world is reseeded; 0 disables.
    pub stagnation_ticks: u32,
    /// Number of tick summaries retained by the driver.
    pub history_capacity: usize,
}

impl Default for MulticellConfig {
    fn default() -> Self {
        Self {
            world_size: 100,
            rng_seed: None,
            max_energy: 1024,
            max_water: 400,
            max_organic: 0,
            sunlight_level: 20,
            starting_organic: 1000,
            starting_ground_water: 200,
            max_ground_water: 400,
            water_regeneration: 1,
            organic_drain_per_position: 2,
            water_extraction_per_position: 10,
            leaf_spawn_energy: 8,
            trunk_spawn_energy: 10,
            flower_spawn_energy: 20,
            seed_spawn_energy: 200,
            sprout_spawn_energy: 5,
            root_spawn_energy: 8,
            connector_spawn_energy: 20,
            energy_tax: 2,
            water_tax: 1,
            energy_transfer_step: 20,
            water_transfer_step: 20,
            organic_transfer_step: 20,
            rot_multiplier: 4,
            max_age: 10_000,
            seed_age_multiplier: 3,
            max_seed_flying_distance: 20,
            flower_cooldown: 20,
            seed_starting_water: 100,
            sprout_spawn_water: 20,
            mutation_chance: 0.0001,
            seeding_density: 0.03,
            stagnation_ticks: 200,
            history_capacity: 256,
        }
    }
}

impl MulticellConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if self.world_size == 0 {
            return Err(WorldStateError::InvalidConfig("world_size must be non-zero"));
        }
        if self.max_energy <= 0 || self.max_water <= 0 || self.max_organic < 0 {
            return Err(WorldStateError::InvalidConfig(
                "cell capacities must be positive (organic non-negative)",
            ));
        }
        if self.sunlight_level < 0
            || self.starting_organic < 0
            || self.starting_ground_water < 0
            || self.water_regeneration < 0
            || self.organic_drain_per_position < 0
            || self.water_extraction_per_position < 0
        {
            return Err(WorldStateError::InvalidConfig(
                "ground levels and extraction rates must be non-negative",
            ));
        }
        if self.starting_ground_water > self.max_ground_water {
            return Err(WorldStateError::InvalidConfig(
                "starting_ground_water cannot exceed max_ground_water",
            ));
        }
        let costs = [
            self.leaf_spawn_energy,
            self.trunk_spawn_energy,
            self.flower_spawn_energy,
            self.seed_spawn_energy,
            self.sprout_spawn_energy,
            self.root_spawn_energy,
            self.connector_spawn_energy,
        ];
        if costs.iter().any(|cost| *cost < 0) || self.rot_multiplier < 0 {
            return Err(WorldStateError::InvalidConfig(
                "spawn energies and rot multiplier must be non-negative",
            ));
        }
        if self.energy_tax < 0 || self.water_tax < 0 {
            return Err(WorldStateError::InvalidConfig("taxes must be non-negative"));
        }
        if self.energy_transfer_step <= 0
            || self.water_transfer_step <= 0
            || self.organic_transfer_step <= 0
        {
            return Err(WorldStateError::InvalidConfig(
                "transfer steps must be positive",
            ));
        }
        if self.max_seed_flying_distance == 0 {
            return Err(WorldStateError::InvalidConfig(
                "max_seed_flying_distance must be non-zero",
            ));
        }
        if self.seed_starting_water < 0 || self.sprout_spawn_water < 0 {
            return Err(WorldStateError::InvalidConfig(
                "starting water reserves must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_chance)
            || !(0.0..=1.0).contains(&self.seeding_density)
        {
            return Err(WorldStateError::InvalidConfig(
                "mutation_chance and seeding_density must be within [0, 1]",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }

    /// Energy needed to become (or be spawned as) `cell_type`.
    #[must_use]
    pub const fn spawn_cost(&self, cell_type: CellType) -> Quantity {
        match cell_type {
            CellType::Leaf => self.leaf_spawn_energy,
            CellType::Trunk => self.trunk_spawn_energy,
            CellType::Flower => self.flower_spawn_energy,
            CellType::Seed => self.seed_spawn_energy,
            CellType::Sprout => self.sprout_spawn_energy,
            CellType::Root => self.root_spawn_energy,
            CellType::Connector => self.connector_spawn_energy,
        }
    }

    /// Organic matter a dead cell of `cell_type` leaves behind.
    #[must_use]
    pub const fn rot_value(&self, cell_type: CellType) -> Quantity {
        self.spawn_cost(cell_type) * self.rot_multiplier
    }

    /// Age above which a cell of `cell_type` dies.
    #[must_use]
    pub const fn max_age_for(&self, cell_type: CellType) -> u32 {
        match cell_type {
            CellType::Seed => self.max_age.saturating_mul(self.seed_age_multiplier),
            _ => self.max_age,
        }
    }

    /// Energy tax levied on `cell_type` each tick.
    #[must_use]
    pub const fn energy_tax_for(&self, cell_type: CellType) -> Quantity {
        match cell_type {
            CellType::Seed | CellType::Sprout | CellType::Trunk => self.energy_tax / 2,
            _ => self.energy_tax,
        }
    }

    #[must_use]
    pub const fn cell_capacity(&self) -> ResourceTable<Quantity> {
        ResourceTable::new(self.max_energy, self.max_water, self.max_organic)
    }

    #[must_use]
    pub const fn transfer_steps(&self) -> ResourceTable<Quantity> {
        ResourceTable::new(
            self.energy_transfer_step,
            self.water_transfer_step,
            self.organic_transfer_step,
        )
    }

    #[must_use]
    pub const fn decode_params(&self) -> DecodeParams {
        DecodeParams {
            max_energy: self.max_energy,
            max_seed_flying_distance: self.max_seed_flying_distance,
        }
    }
}
