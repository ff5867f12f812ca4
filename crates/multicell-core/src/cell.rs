//! Cells: the genome-driven agents living on the grid.

use multicell_index::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::OrganismId;
use crate::action::Action;
use crate::genome::GenomeId;
use crate::resources::{Inventory, Quantity, ResourceKind};
use crate::world::CellTask;

/// Differentiated role of a cell.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellType {
    Leaf,
    Trunk,
    Flower,
    #[default]
    Seed,
    Sprout,
    Root,
    Connector,
}

impl CellType {
    pub const ALL: [CellType; 7] = [
        CellType::Leaf,
        CellType::Trunk,
        CellType::Flower,
        CellType::Seed,
        CellType::Sprout,
        CellType::Root,
        CellType::Connector,
    ];

    pub const COUNT: u8 = 7;

    /// Decode a type from an arbitrary byte (taken modulo [`Self::COUNT`]).
    #[must_use]
    pub const fn decode(gene: u8) -> Self {
        Self::ALL[(gene % Self::COUNT) as usize]
    }

    /// Seeds and sprouts still run their genome and may differentiate.
    #[must_use]
    pub const fn is_undifferentiated(self) -> bool {
        matches!(self, CellType::Seed | CellType::Sprout)
    }

    /// Types whose presence keeps a world from counting as stagnant.
    #[must_use]
    pub const fn is_reproductive(self) -> bool {
        matches!(self, CellType::Sprout | CellType::Flower)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CellType::Leaf => "leaf",
            CellType::Trunk => "trunk",
            CellType::Flower => "flower",
            CellType::Seed => "seed",
            CellType::Sprout => "sprout",
            CellType::Root => "root",
            CellType::Connector => "connector",
        };
        f.write_str(label)
    }
}

/// Predicate classifying a pair of cells by organism and genome sameness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Relation {
    SameOrganism,
    SameGenome,
    AnotherOrganism,
    AnotherGenome,
    Any,
}

impl Relation {
    pub const COUNT: u8 = 5;

    #[must_use]
    pub const fn decode(gene: u8) -> Self {
        match gene % Self::COUNT {
            0 => Relation::SameOrganism,
            1 => Relation::SameGenome,
            2 => Relation::AnotherOrganism,
            3 => Relation::AnotherGenome,
            _ => Relation::Any,
        }
    }

    /// Whether `other` stands in this relation to `subject`.
    #[must_use]
    pub fn matches(self, subject: &Cell, other: &Cell) -> bool {
        match self {
            Relation::SameOrganism => subject.organism == other.organism,
            Relation::SameGenome => subject.genome == other.genome,
            Relation::AnotherOrganism => subject.organism != other.organism,
            Relation::AnotherGenome => subject.genome != other.genome,
            Relation::Any => true,
        }
    }
}

/// A live agent. Its position is owned by the world, not by the cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub cell_type: CellType,
    pub genome: GenomeId,
    /// Instruction pointer into the genome tape.
    pub genome_position: u8,
    pub direction: Direction,
    pub organism: OrganismId,
    pub age: u32,
    pub flower_timer: u32,
    pub seed_flying_timer: u32,
    pub inventory: Inventory,
}

impl Cell {
    #[must_use]
    pub fn new(
        cell_type: CellType,
        genome: GenomeId,
        organism: OrganismId,
        inventory: Inventory,
    ) -> Self {
        Self {
            cell_type,
            genome,
            genome_position: 0,
            direction: Direction::default(),
            organism,
            age: 0,
            flower_timer: 0,
            seed_flying_timer: 0,
            inventory,
        }
    }

    #[must_use]
    pub fn energy(&self) -> Quantity {
        self.inventory.energy()
    }

    #[must_use]
    pub fn water(&self) -> Quantity {
        self.inventory.water()
    }

    /// Step the genome once. Differentiated cells are genome-inert; airborne seeds drift instead.
    pub(crate) fn execute_genome(&mut self, task: &mut CellTask<'_>) {
        if !self.cell_type.is_undifferentiated() {
            return;
        }
        let action = if self.cell_type == CellType::Seed && self.seed_flying_timer > 0 {
            self.seed_flying_timer -= 1;
            Action::Move { next: 0 }
        } else {
            let genome = task.genomes().resolve(self.genome);
            let params = task.config().decode_params();
            genome.execute_position(self.genome_position, params, task.rng())
        };
        action.apply(self, task);
    }

    /// Passive per-type behaviour: harvesting and seed production.
    pub(crate) fn execute_type_action(&mut self, task: &mut CellTask<'_>) {
        match self.cell_type {
            CellType::Leaf => self.harvest_sunlight(task),
            CellType::Root | CellType::Seed => self.harvest_soil(task),
            CellType::Flower => self.try_produce_seed(task),
            CellType::Trunk | CellType::Sprout | CellType::Connector => {}
        }
    }

    fn harvest_sunlight(&mut self, task: &mut CellTask<'_>) {
        let shaded = task
            .neighbours()
            .iter()
            .any(|(_, _, occupant)| occupant.is_some_and(|cell| cell.cell_type == CellType::Leaf));
        if shaded {
            return;
        }
        let sunlight = task.ground(task.position()).sunlight;
        self.inventory.add(ResourceKind::Energy, sunlight);
    }

    fn harvest_soil(&mut self, task: &mut CellTask<'_>) {
        let organic_rate = task.config().organic_drain_per_position;
        let water_rate = task.config().water_extraction_per_position;
        for position in task.footprint() {
            let mut ground = task.ground(position);
            let organic = ground
                .organic
                .min(organic_rate)
                .min(self.inventory.headroom(ResourceKind::Energy))
                .max(0);
            ground.organic -= organic;
            self.inventory.add(ResourceKind::Energy, organic);

            let water = ground
                .water
                .min(water_rate)
                .min(self.inventory.headroom(ResourceKind::Water))
                .max(0);
            ground.water -= water;
            self.inventory.add(ResourceKind::Water, water);
        }
    }

    fn try_produce_seed(&mut self, task: &mut CellTask<'_>) {
        if self.flower_timer > 0 {
            self.flower_timer -= 1;
            return;
        }
        let seed_cost = task.config().seed_spawn_energy;
        if !self.inventory.exceeds(ResourceKind::Energy, seed_cost) {
            return;
        }
        let mut chosen = None;
        let mut facing_free = false;
        for direction in [
            Direction::West,
            Direction::East,
            Direction::North,
            Direction::South,
        ] {
            if task.is_free(task.position_towards(direction)) {
                chosen = Some(direction);
                facing_free |= direction == self.direction;
            }
        }
        let Some(mut direction) = chosen else {
            return;
        };
        if facing_free {
            direction = self.direction;
        }

        self.flower_timer = task.config().flower_cooldown;
        self.inventory.take(ResourceKind::Energy, seed_cost);

        let genome = task.offspring_genome(self.genome);
        let inventory = Inventory::stocked(
            task.config().cell_capacity(),
            seed_cost,
            task.config().seed_starting_water,
        );
        let mut seed = Cell::new(
            CellType::Seed,
            genome.id(),
            task.new_organism_id(),
            inventory,
        );
        seed.direction = self.direction;
        seed.seed_flying_timer = self.seed_flying_timer;
        let target = task.position_towards(direction);
        task.stage_spawn(target, seed, genome);
    }
}
