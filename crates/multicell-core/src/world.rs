//! The grid, its ground ledger, the live-cell table and the eight-stage tick pipeline.

use multicell_index::{Direction, NeighborhoodIndex, OccupancyGrid, Position};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{Key, SlotMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::cell::{Cell, CellType};
use crate::config::MulticellConfig;
use crate::driver::TickSummary;
use crate::export::WorldExport;
use crate::genome::{GENOME_LENGTH, Genome, GenomeId, GenomeStorage};
use crate::ground::{GroundCell, GroundLedger};
use crate::organism::{Organism, ResourceTransfer};
use crate::resources::{Inventory, Quantity, ResourceKind, ResourceTable};
use crate::{CellId, CellMap, OrganismId, Tick, WorldStateError};

/// Pipeline states, entered strictly in declaration order every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TickStage {
    CleanupTurn,
    ExecuteCellGenomes,
    ExecuteTypeActions,
    CreateNewCells,
    SpreadResources,
    DrainResources,
    MoveCells,
    RemoveCells,
}

impl TickStage {
    pub const ALL: [TickStage; 8] = [
        TickStage::CleanupTurn,
        TickStage::ExecuteCellGenomes,
        TickStage::ExecuteTypeActions,
        TickStage::CreateNewCells,
        TickStage::SpreadResources,
        TickStage::DrainResources,
        TickStage::MoveCells,
        TickStage::RemoveCells,
    ];

    /// Stage that follows this one; `RemoveCells` wraps to the next tick's `CleanupTurn`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            TickStage::CleanupTurn => TickStage::ExecuteCellGenomes,
            TickStage::ExecuteCellGenomes => TickStage::ExecuteTypeActions,
            TickStage::ExecuteTypeActions => TickStage::CreateNewCells,
            TickStage::CreateNewCells => TickStage::SpreadResources,
            TickStage::SpreadResources => TickStage::DrainResources,
            TickStage::DrainResources => TickStage::MoveCells,
            TickStage::MoveCells => TickStage::RemoveCells,
            TickStage::RemoveCells => TickStage::CleanupTurn,
        }
    }
}

/// A cell staged for creation, committed during `CreateNewCells` if its position is still free.
#[derive(Debug, Clone)]
pub struct PendingSpawn {
    pub position: Position,
    pub cell: Cell,
    /// Genome the new cell runs; registered only if the spawn commits.
    pub genome: Arc<Genome>,
}

/// Everything one cell task produced during a parallel stage.
struct CellOutcome {
    id: CellId,
    cell: Cell,
    spawns: Vec<PendingSpawn>,
    destination: Option<Position>,
}

/// Read-only view of the world handed to one cell during a parallel stage.
///
/// Ground harvesting goes through per-position locks; spawns and moves are buffered here and
/// merged by the world once every task has finished.
pub(crate) struct CellTask<'w> {
    world: &'w World,
    position: Position,
    rng: SmallRng,
    spawns: Vec<PendingSpawn>,
    destination: Option<Position>,
}

impl<'w> CellTask<'w> {
    fn new(world: &'w World, id: CellId, position: Position, base_seed: u64) -> Self {
        let mixed = base_seed ^ id.data().as_ffi().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            world,
            position,
            rng: SmallRng::seed_from_u64(mixed),
            spawns: Vec::new(),
            destination: None,
        }
    }

    fn into_outcome(self, id: CellId, cell: Cell) -> CellOutcome {
        CellOutcome {
            id,
            cell,
            spawns: self.spawns,
            destination: self.destination,
        }
    }

    pub(crate) fn config(&self) -> &'w MulticellConfig {
        &self.world.config
    }

    pub(crate) fn genomes(&self) -> &'w GenomeStorage {
        &self.world.genomes
    }

    pub(crate) fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    pub(crate) fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn position_towards(&self, direction: Direction) -> Position {
        self.position.moved(direction, self.world.size())
    }

    /// The cell's own position followed by its four neighbours.
    pub(crate) fn footprint(&self) -> [Position; 5] {
        let [west, north, east, south] = self.position.neighbours(self.world.size());
        [self.position, west, north, east, south]
    }

    /// Neighbours in [`Direction::ALL`] order, as they stood when the stage began.
    pub(crate) fn neighbours(&self) -> [(Direction, Position, Option<&'w Cell>); 4] {
        let world = self.world;
        world
            .neighbours_of(self.position)
            .map(|(direction, position, occupant)| {
                (direction, position, occupant.and_then(|id| world.cells.get(id)))
            })
    }

    /// Unoccupied in the live grid and not already claimed by this task.
    pub(crate) fn is_free(&self, position: Position) -> bool {
        !self.world.grid.is_occupied(position)
            && !self.spawns.iter().any(|spawn| spawn.position == position)
    }

    pub(crate) fn ground(&self, position: Position) -> MutexGuard<'w, GroundCell> {
        self.world.ground.lock(position)
    }

    /// Copy-on-mutation child of the registered genome `parent`.
    pub(crate) fn offspring_genome(&mut self, parent: GenomeId) -> Arc<Genome> {
        let parent = self.world.genomes.resolve(parent);
        self.world
            .genomes
            .reproduce(&parent, self.world.config.mutation_chance, &mut self.rng)
    }

    pub(crate) fn new_organism_id(&self) -> OrganismId {
        self.world.allocate_organism()
    }

    pub(crate) fn stage_spawn(&mut self, position: Position, cell: Cell, genome: Arc<Genome>) {
        self.spawns.push(PendingSpawn {
            position,
            cell,
            genome,
        });
    }

    pub(crate) fn request_move(&mut self, destination: Position) {
        self.destination = Some(destination);
    }
}

/// Aggregate simulation state: the live-cell table, its positions, the ground and the genomes.
pub struct World {
    config: MulticellConfig,
    tick: Tick,
    stage: TickStage,
    rng: SmallRng,
    cells: SlotMap<CellId, Cell>,
    positions: CellMap<Position>,
    grid: OccupancyGrid<CellId>,
    ground: GroundLedger,
    genomes: GenomeStorage,
    next_organism: AtomicU64,
    pending_spawns: Vec<PendingSpawn>,
    pending_moves: Vec<(CellId, Position)>,
    last_births: usize,
    last_deaths: usize,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("size", &self.config.world_size)
            .field("tick", &self.tick)
            .field("stage", &self.stage)
            .field("cell_count", &self.cells.len())
            .field("genome_count", &self.genomes.len())
            .finish()
    }
}

impl World {
    /// Build an empty world from `config`; call [`World::seed`] to populate it.
    pub fn new(config: MulticellConfig) -> Result<Self, WorldStateError> {
        config.validate()?;
        let grid = OccupancyGrid::new(config.world_size)?;
        let ground = GroundLedger::new(
            config.world_size,
            GroundCell {
                sunlight: config.sunlight_level,
                organic: config.starting_organic,
                water: config.starting_ground_water,
            },
        );
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            tick: Tick::zero(),
            stage: TickStage::CleanupTurn,
            rng,
            cells: SlotMap::with_key(),
            positions: CellMap::new(),
            grid,
            ground,
            genomes: GenomeStorage::new(),
            next_organism: AtomicU64::new(0),
            pending_spawns: Vec::new(),
            pending_moves: Vec::new(),
            last_births: 0,
            last_deaths: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &MulticellConfig {
        &self.config
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Stage the pipeline expects next.
    #[must_use]
    pub const fn stage(&self) -> TickStage {
        self.stage
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.config.world_size
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells.iter()
    }

    #[must_use]
    pub fn position_of(&self, id: CellId) -> Option<Position> {
        self.positions.get(id).copied()
    }

    /// Position of a live cell.
    ///
    /// # Panics
    /// When `id` has no position; every live cell has one.
    #[must_use]
    pub fn expect_position(&self, id: CellId) -> Position {
        self.position_of(id)
            .unwrap_or_else(|| panic!("live cell {id:?} has no position"))
    }

    #[must_use]
    pub fn occupant(&self, position: Position) -> Option<CellId> {
        self.grid.get(position)
    }

    /// The four neighbours of `position` in [`Direction::ALL`] order with their occupants.
    #[must_use]
    pub fn neighbours_of(&self, position: Position) -> [(Direction, Position, Option<CellId>); 4] {
        let mut found = [(Direction::West, position, None); 4];
        let mut slot = 0;
        self.grid
            .visit_neighbours(position, &mut |direction, neighbour, occupant| {
                found[slot] = (direction, neighbour, occupant);
                slot += 1;
            });
        found
    }

    #[must_use]
    pub fn cell_at(&self, position: Position) -> Option<&Cell> {
        self.occupant(position).and_then(|id| self.cells.get(id))
    }

    #[must_use]
    pub fn ground(&self, position: Position) -> GroundCell {
        self.ground.get(position)
    }

    pub fn ground_mut(&mut self, position: Position) -> &mut GroundCell {
        self.ground.get_mut(position)
    }

    #[must_use]
    pub const fn genomes(&self) -> &GenomeStorage {
        &self.genomes
    }

    /// Spawns staged during the current tick and not yet committed.
    #[must_use]
    pub fn pending_spawns(&self) -> &[PendingSpawn] {
        &self.pending_spawns
    }

    /// Moves staged during the current tick and not yet resolved.
    #[must_use]
    pub fn pending_moves(&self) -> &[(CellId, Position)] {
        &self.pending_moves
    }

    pub(crate) fn allocate_organism(&self) -> OrganismId {
        OrganismId(self.next_organism.fetch_add(1, Ordering::Relaxed))
    }

    /// Sum of every resource kind held by live cells.
    #[must_use]
    pub fn cell_totals(&self) -> ResourceTable<i64> {
        let mut totals = ResourceTable::splat(0_i64);
        for cell in self.cells.values() {
            for kind in ResourceKind::ALL {
                totals[kind] += i64::from(cell.inventory.get(kind));
            }
        }
        totals
    }

    /// Place `cell` at `position` and register its genome.
    pub fn place_cell(
        &mut self,
        position: Position,
        cell: Cell,
        genome: Arc<Genome>,
    ) -> Result<CellId, WorldStateError> {
        if cell.genome != genome.id() {
            return Err(WorldStateError::InvalidConfig(
                "cell genome does not match the supplied genome",
            ));
        }
        let id = self.insert_cell(position, cell)?;
        self.genomes.register(genome);
        Ok(id)
    }

    /// Place a founding cell with a fresh random genome and organism.
    pub fn place_founder(
        &mut self,
        position: Position,
        cell_type: CellType,
        energy: Quantity,
        water: Quantity,
    ) -> Result<CellId, WorldStateError> {
        let genome = self.genomes.founding(&mut self.rng);
        self.place_new_organism(position, cell_type, energy, water, genome)
    }

    /// Place a founding cell running an explicit genome tape.
    pub fn place_with_tape(
        &mut self,
        position: Position,
        cell_type: CellType,
        energy: Quantity,
        water: Quantity,
        tape: [u8; GENOME_LENGTH],
    ) -> Result<CellId, WorldStateError> {
        let genome = self.genomes.from_tape(None, tape);
        self.place_new_organism(position, cell_type, energy, water, genome)
    }

    fn place_new_organism(
        &mut self,
        position: Position,
        cell_type: CellType,
        energy: Quantity,
        water: Quantity,
        genome: Arc<Genome>,
    ) -> Result<CellId, WorldStateError> {
        let inventory = Inventory::stocked(self.config.cell_capacity(), energy, water);
        let cell = Cell::new(cell_type, genome.id(), self.allocate_organism(), inventory);
        self.place_cell(position, cell, genome)
    }

    /// Scatter founding seeds over free positions with the configured density.
    ///
    /// Each seed carries a fresh founding genome, its own organism and full resources.
    pub fn seed(&mut self) -> usize {
        let density = self.config.seeding_density;
        let energy = self.config.max_energy;
        let water = self.config.max_water;
        let free: Vec<Position> = self
            .grid
            .positions()
            .filter(|position| !self.grid.is_occupied(*position))
            .collect();
        let mut placed = 0;
        for position in free {
            if self.rng.random::<f64>() >= density {
                continue;
            }
            match self.place_founder(position, CellType::Seed, energy, water) {
                Ok(_) => placed += 1,
                Err(err) => debug!(%position, %err, "skipped founding seed"),
            }
        }
        info!(tick = self.tick.0, placed, "seeded world");
        placed
    }

    fn insert_cell(&mut self, position: Position, cell: Cell) -> Result<CellId, WorldStateError> {
        let id = self.cells.insert(cell);
        if let Err(err) = self.grid.place(position, id) {
            self.cells.remove(id);
            return Err(err.into());
        }
        self.positions.insert(id, position);
        Ok(id)
    }

    fn begin(&self, stage: TickStage) -> Instant {
        if self.stage != stage {
            panic!(
                "tick stage {stage:?} entered while {:?} was due (tick {})",
                self.stage, self.tick
            );
        }
        Instant::now()
    }

    fn finish(&mut self, stage: TickStage, started: Instant) {
        self.stage = stage.next();
        trace!(
            tick = self.tick.0,
            ?stage,
            elapsed_us = started.elapsed().as_micros() as u64,
            cells = self.cells.len(),
            "stage complete"
        );
    }

    /// Run `behaviour` for every live cell in parallel against the unmodified world, then write
    /// the updated cells back and merge their staged requests.
    fn run_cells<F>(&mut self, behaviour: F)
    where
        F: Fn(&mut Cell, &mut CellTask<'_>) + Sync,
    {
        let base_seed: u64 = self.rng.random();
        let handles: Vec<CellId> = self.cells.keys().collect();
        let world = &*self;
        let outcomes: Vec<CellOutcome> = handles
            .par_iter()
            .map(|&id| {
                let position = world.expect_position(id);
                let mut cell = world.cells[id].clone();
                let mut task = CellTask::new(world, id, position, base_seed);
                behaviour(&mut cell, &mut task);
                task.into_outcome(id, cell)
            })
            .collect();
        for outcome in outcomes {
            self.cells[outcome.id] = outcome.cell;
            self.pending_spawns.extend(outcome.spawns);
            if let Some(destination) = outcome.destination {
                self.pending_moves.push((outcome.id, destination));
            }
        }
    }

    /// Reset the per-tick scratch buffers.
    pub fn cleanup_turn(&mut self) {
        let started = self.begin(TickStage::CleanupTurn);
        self.pending_spawns.clear();
        self.pending_moves.clear();
        self.last_births = 0;
        self.last_deaths = 0;
        self.finish(TickStage::CleanupTurn, started);
    }

    pub fn execute_cell_genomes(&mut self) {
        let started = self.begin(TickStage::ExecuteCellGenomes);
        self.run_cells(Cell::execute_genome);
        self.finish(TickStage::ExecuteCellGenomes, started);
    }

    pub fn execute_type_actions(&mut self) {
        let started = self.begin(TickStage::ExecuteTypeActions);
        self.run_cells(Cell::execute_type_action);
        self.finish(TickStage::ExecuteTypeActions, started);
    }

    /// Commit staged spawns whose target is still free; the rest are dropped with their genomes.
    pub fn create_new_cells(&mut self) {
        let started = self.begin(TickStage::CreateNewCells);
        let spawns = std::mem::take(&mut self.pending_spawns);
        let mut dropped = 0_usize;
        for spawn in spawns {
            if self.grid.is_occupied(spawn.position) {
                dropped += 1;
                continue;
            }
            let PendingSpawn {
                position,
                cell,
                genome,
            } = spawn;
            match self.insert_cell(position, cell) {
                Ok(_) => {
                    self.genomes.register(genome);
                    self.last_births += 1;
                }
                Err(err) => panic!("spawn at free position {position} failed: {err}"),
            }
        }
        if dropped > 0 {
            trace!(tick = self.tick.0, dropped, "dropped conflicting spawns");
        }
        self.finish(TickStage::CreateNewCells, started);
    }

    /// Balance resources inside every organism.
    ///
    /// # Panics
    /// When applying the planned transfers changes the total of any resource kind.
    pub fn spread_resources(&mut self) {
        let started = self.begin(TickStage::SpreadResources);
        let organisms = Organism::group(self);
        let before = self.cell_totals();
        let world = &*self;
        let transfers: Vec<ResourceTransfer> = organisms
            .par_iter()
            .flat_map_iter(|organism| organism.plan_transfers(world))
            .collect();
        let planned = transfers.len();
        let applied = transfers
            .into_iter()
            .filter(|transfer| self.apply_transfer(transfer))
            .count();
        let after = self.cell_totals();
        if before != after {
            panic!("resource totals changed while spreading: {before:?} -> {after:?}");
        }
        trace!(tick = self.tick.0, planned, applied, "resources spread");
        self.finish(TickStage::SpreadResources, started);
    }

    fn apply_transfer(&mut self, transfer: &ResourceTransfer) -> bool {
        let ResourceTransfer {
            donor,
            recipient,
            kind,
            amount,
        } = *transfer;
        if donor == recipient {
            return false;
        }
        let feasible = match (self.cells.get(donor), self.cells.get(recipient)) {
            (Some(from), Some(to)) => {
                from.inventory.get(kind) >= amount && to.inventory.headroom(kind) >= amount
            }
            _ => false,
        };
        if !feasible {
            return false;
        }
        self.cells[donor].inventory.take(kind, amount);
        self.cells[recipient].inventory.add(kind, amount);
        true
    }

    /// Levy the per-tick taxes and let ground water recover.
    pub fn drain_resources(&mut self) {
        let started = self.begin(TickStage::DrainResources);
        let water_tax = self.config.water_tax;
        for cell in self.cells.values_mut() {
            let energy_tax = self.config.energy_tax_for(cell.cell_type);
            cell.inventory.take(ResourceKind::Energy, energy_tax);
            cell.inventory.take(ResourceKind::Water, water_tax);
        }
        self.ground
            .regenerate_water(self.config.water_regeneration, self.config.max_ground_water);
        self.finish(TickStage::DrainResources, started);
    }

    /// Resolve staged moves in arrival order; blocked seeds bruise soft occupants.
    pub fn move_cells(&mut self) {
        let started = self.begin(TickStage::MoveCells);
        let moves = std::mem::take(&mut self.pending_moves);
        let penalty = self.config.seed_spawn_energy;
        let (mut moved, mut blocked) = (0_usize, 0_usize);
        for (id, destination) in moves {
            let Some(mover) = self.cells.get(id).map(|cell| cell.cell_type) else {
                continue;
            };
            let origin = self.expect_position(id);
            if let Some(occupant) = self.grid.get(destination) {
                blocked += 1;
                if occupant == id || mover != CellType::Seed {
                    continue;
                }
                if let Some(target) = self.cells.get_mut(occupant) {
                    if !matches!(target.cell_type, CellType::Trunk | CellType::Seed) {
                        target.inventory.take(ResourceKind::Energy, penalty);
                    }
                }
                continue;
            }
            match self.grid.relocate(origin, destination) {
                Ok(_) => {
                    self.positions.insert(id, destination);
                    moved += 1;
                }
                Err(err) => panic!("cell {id:?} could not leave {origin}: {err}"),
            }
        }
        trace!(tick = self.tick.0, moved, blocked, "moves resolved");
        self.finish(TickStage::MoveCells, started);
    }

    /// Age every cell and return the dead to the ground.
    pub fn remove_cells(&mut self) {
        let started = self.begin(TickStage::RemoveCells);
        let mut dead = Vec::new();
        for (id, cell) in &mut self.cells {
            cell.age = cell.age.saturating_add(1);
            if cell.energy() <= 0
                || cell.water() <= 0
                || cell.age > self.config.max_age_for(cell.cell_type)
            {
                dead.push(id);
            }
        }
        for id in dead {
            let Some(cell) = self.cells.remove(id) else {
                continue;
            };
            let Some(position) = self.positions.remove(id) else {
                panic!("dead cell {id:?} had no position");
            };
            self.grid.vacate(position);
            let ground = self.ground.get_mut(position);
            ground.organic = ground
                .organic
                .saturating_add(self.config.rot_value(cell.cell_type));
            ground.water = ground.water.saturating_add(cell.water());
            self.last_deaths += 1;
        }
        self.tick = self.tick.next();
        self.finish(TickStage::RemoveCells, started);
    }

    /// Run one full tick through every stage.
    pub fn step(&mut self) {
        self.cleanup_turn();
        self.execute_cell_genomes();
        self.execute_type_actions();
        self.create_new_cells();
        self.spread_resources();
        self.drain_resources();
        self.move_cells();
        self.remove_cells();
    }

    /// Copy the observable state into an immutable snapshot.
    #[must_use]
    pub fn export(&self) -> WorldExport {
        WorldExport::capture(self)
    }

    /// Aggregate statistics for the tick just completed.
    #[must_use]
    pub fn summary(&self) -> TickSummary {
        let mut type_counts = [0_usize; CellType::COUNT as usize];
        for cell in self.cells.values() {
            type_counts[cell.cell_type.index()] += 1;
        }
        TickSummary {
            tick: self.tick,
            cell_count: self.cells.len(),
            births: self.last_births,
            deaths: self.last_deaths,
            organisms: Organism::group(self).len(),
            genomes: self.genomes.len(),
            totals: self.cell_totals(),
            ground: self.ground.totals(),
            type_counts,
        }
    }
}
