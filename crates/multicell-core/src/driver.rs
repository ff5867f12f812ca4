//! Tick driver with stagnation-triggered reseeding and a bounded summary history.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

use crate::cell::CellType;
use crate::config::MulticellConfig;
use crate::export::WorldExport;
use crate::resources::ResourceTable;
use crate::world::World;
use crate::{Tick, WorldStateError};

/// Aggregate statistics recorded after each tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: Tick,
    pub cell_count: usize,
    pub births: usize,
    pub deaths: usize,
    pub organisms: usize,
    /// Genomes registered so far, dead ones included.
    pub genomes: usize,
    /// Resources held by live cells.
    pub totals: ResourceTable<i64>,
    /// Resources lying on the ground; energy is the summed sunlight potential.
    pub ground: ResourceTable<i64>,
    /// Live cells per type, indexed by [`CellType::index`].
    pub type_counts: [usize; CellType::COUNT as usize],
}

impl TickSummary {
    #[must_use]
    pub fn count(&self, cell_type: CellType) -> usize {
        self.type_counts[cell_type.index()]
    }

    /// Sprouts plus flowers; zero means nothing is growing.
    #[must_use]
    pub fn reproducing(&self) -> usize {
        CellType::ALL
            .into_iter()
            .filter(|cell_type| cell_type.is_reproductive())
            .map(|cell_type| self.count(cell_type))
            .sum()
    }
}

/// Owns a [`World`] and drives it tick by tick.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    stagnant_ticks: u32,
    reseeds: u32,
    history: VecDeque<TickSummary>,
    history_capacity: usize,
}

impl Simulation {
    /// Build and seed a world.
    pub fn new(config: MulticellConfig) -> Result<Self, WorldStateError> {
        Ok(Self::from_world(World::new(config)?, true))
    }

    /// Wrap an existing world, optionally seeding it first.
    #[must_use]
    pub fn from_world(mut world: World, seed: bool) -> Self {
        if seed {
            world.seed();
        }
        let history_capacity = world.config().history_capacity;
        Self {
            world,
            stagnant_ticks: 0,
            reseeds: 0,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
        }
    }

    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Consecutive ticks without a sprout or flower.
    #[must_use]
    pub const fn stagnant_ticks(&self) -> u32 {
        self.stagnant_ticks
    }

    #[must_use]
    pub const fn reseeds(&self) -> u32 {
        self.reseeds
    }

    pub fn history(&self) -> impl Iterator<Item = &TickSummary> + '_ {
        self.history.iter()
    }

    /// Run one tick, reseeding when the world has stagnated for too long.
    pub fn step(&mut self) -> TickSummary {
        self.world.step();
        let summary = self.world.summary();
        if summary.reproducing() == 0 {
            self.stagnant_ticks += 1;
        } else {
            self.stagnant_ticks = 0;
        }
        let threshold = self.world.config().stagnation_ticks;
        if threshold > 0 && self.stagnant_ticks >= threshold {
            let placed = self.world.seed();
            info!(
                tick = summary.tick.0,
                stagnant_ticks = self.stagnant_ticks,
                placed,
                "world stagnated; reseeded"
            );
            self.stagnant_ticks = 0;
            self.reseeds += 1;
        }
        if self.history_capacity > 0 {
            if self.history.len() == self.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(summary.clone());
        }
        summary
    }

    /// Run `ticks` ticks and return the last summary, if any ran.
    pub fn run(&mut self, ticks: u64) -> Option<TickSummary> {
        (0..ticks).map(|_| self.step()).last()
    }

    #[must_use]
    pub fn export(&self) -> WorldExport {
        self.world.export()
    }
}
