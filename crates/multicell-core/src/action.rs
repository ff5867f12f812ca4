//! Decoded genome effects and their application to a cell.

use multicell_index::Direction;

use crate::cell::{Cell, CellType, Relation};
use crate::resources::{Inventory, Quantity, ResourceKind};
use crate::world::CellTask;

/// Predicate decoded from an `If` gene, evaluated when the action is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Energy below `threshold` when `less`, otherwise at or above it.
    EnergyLevel { threshold: Quantity, less: bool },
    /// Cell type equal to `target` when `equal`, otherwise different.
    CellType { target: CellType, equal: bool },
    /// Number of neighbours standing in `relation` to the cell, compared against `threshold`.
    NeighboursCount {
        threshold: u8,
        less: bool,
        relation: Relation,
    },
}

impl Condition {
    pub(crate) fn evaluate(&self, cell: &Cell, task: &CellTask<'_>) -> bool {
        match *self {
            Condition::EnergyLevel { threshold, less } => {
                if less {
                    cell.energy() < threshold
                } else {
                    cell.energy() >= threshold
                }
            }
            Condition::CellType { target, equal } => (cell.cell_type == target) == equal,
            Condition::NeighboursCount {
                threshold,
                less,
                relation,
            } => {
                let count = task
                    .neighbours()
                    .iter()
                    .filter_map(|(_, _, occupant)| *occupant)
                    .filter(|neighbour| relation.matches(cell, neighbour))
                    .count();
                if less {
                    count < usize::from(threshold)
                } else {
                    count >= usize::from(threshold)
                }
            }
        }
    }
}

/// Ready-to-apply effect of one genome instruction.
///
/// Every variant moves the instruction pointer; some also change the cell or stage world
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DoNothing {
        next: u8,
    },
    CompareForCell {
        condition: Condition,
        if_true: u8,
        if_false: u8,
    },
    ChangeCellType {
        target: CellType,
        next: u8,
        sprout_count: u8,
        seed_flight_ticks: u32,
    },
    Move {
        next: u8,
    },
    Rotate {
        left: bool,
        next: u8,
    },
}

impl Action {
    /// Every instruction pointer this action may leave behind.
    pub fn next_positions(&self) -> impl Iterator<Item = u8> {
        let (first, second) = match *self {
            Action::CompareForCell {
                if_true, if_false, ..
            } => (if_true, Some(if_false)),
            Action::DoNothing { next }
            | Action::ChangeCellType { next, .. }
            | Action::Move { next }
            | Action::Rotate { next, .. } => (next, None),
        };
        std::iter::once(first).chain(second)
    }

    pub(crate) fn apply(&self, cell: &mut Cell, task: &mut CellTask<'_>) {
        match *self {
            Action::DoNothing { next } => cell.genome_position = next,
            Action::CompareForCell {
                condition,
                if_true,
                if_false,
            } => {
                cell.genome_position = if condition.evaluate(cell, task) {
                    if_true
                } else {
                    if_false
                };
            }
            Action::ChangeCellType {
                target,
                next,
                sprout_count,
                seed_flight_ticks,
            } => {
                cell.genome_position = next;
                change_cell_type(cell, task, target, sprout_count, seed_flight_ticks);
            }
            Action::Move { next } => {
                cell.genome_position = next;
                if cell.cell_type != CellType::Sprout {
                    let destination = task.position_towards(cell.direction);
                    task.request_move(destination);
                }
            }
            Action::Rotate { left, next } => {
                cell.direction = if left {
                    cell.direction.rotated_left()
                } else {
                    cell.direction.rotated_right()
                };
                cell.genome_position = next;
            }
        }
    }
}

fn change_cell_type(
    cell: &mut Cell,
    task: &mut CellTask<'_>,
    target: CellType,
    sprout_count: u8,
    seed_flight_ticks: u32,
) {
    if cell.cell_type == target || target == CellType::Seed || !cell.cell_type.is_undifferentiated()
    {
        return;
    }
    let config = task.config();
    let mut cost = config.spawn_cost(target);
    if target == CellType::Trunk {
        cost += Quantity::from(sprout_count) * config.sprout_spawn_energy;
    }
    if !cell.inventory.exceeds(ResourceKind::Energy, cost) {
        return;
    }
    cell.cell_type = target;
    cell.inventory.take(ResourceKind::Energy, cost);
    match target {
        CellType::Flower => {
            cell.flower_timer = task.config().flower_cooldown;
            cell.seed_flying_timer = seed_flight_ticks;
        }
        CellType::Trunk => stage_sprouts(cell, task, sprout_count),
        _ => {}
    }
}

/// Stage up to `count` sprouts around a fresh trunk, one per free neighbour.
fn stage_sprouts(trunk: &mut Cell, task: &mut CellTask<'_>, count: u8) {
    let free: Vec<(Direction, _)> = task
        .neighbours()
        .iter()
        .filter(|(_, _, occupant)| occupant.is_none())
        .map(|(direction, position, _)| (*direction, *position))
        .take(usize::from(count))
        .collect();
    for (direction, position) in free {
        let genome = task.offspring_genome(trunk.genome);
        let water = trunk
            .inventory
            .take(ResourceKind::Water, task.config().sprout_spawn_water);
        let inventory = Inventory::stocked(
            task.config().cell_capacity(),
            task.config().sprout_spawn_energy,
            water,
        );
        let mut sprout = Cell::new(CellType::Sprout, genome.id(), trunk.organism, inventory);
        sprout.direction = direction;
        sprout.genome_position = trunk.genome_position;
        task.stage_spawn(position, sprout, genome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GENOME_LENGTH;
    use crate::{MulticellConfig, World};
    use multicell_index::Position;

    fn config() -> MulticellConfig {
        MulticellConfig {
            world_size: 8,
            rng_seed: Some(5),
            mutation_chance: 0.0,
            seeding_density: 0.0,
            ..MulticellConfig::default()
        }
    }

    /// Place a sprout whose genome starts with the given genes (rest zero, i.e. `Pass`).
    fn sprout_with_genes(
        world: &mut World,
        position: Position,
        energy: Quantity,
        genes: &[u8],
    ) -> crate::CellId {
        let mut tape = [0_u8; GENOME_LENGTH];
        tape[..genes.len()].copy_from_slice(genes);
        world
            .place_with_tape(position, CellType::Sprout, energy, 100, tape)
            .expect("placement")
    }

    #[test]
    fn trunk_with_three_sprouts_stages_three_distinct_directions() {
        let mut world = World::new(config()).expect("world");
        // 22 decodes to Trunk (22 % 7 == 1) with 22 % 4 + 1 == 3 sprouts.
        let trunk = sprout_with_genes(&mut world, Position::new(4, 4), 500, &[3, 22, 0]);
        world.cleanup_turn();
        world.execute_cell_genomes();

        let cell = world.cell(trunk).expect("trunk");
        assert_eq!(cell.cell_type, CellType::Trunk);
        assert_eq!(cell.energy(), 500 - 10 - 3 * 5);
        assert_eq!(cell.genome_position, 1);

        let spawns = world.pending_spawns();
        assert_eq!(spawns.len(), 3);
        let mut directions: Vec<u8> = spawns.iter().map(|s| s.cell.direction.index()).collect();
        directions.sort_unstable();
        directions.dedup();
        assert_eq!(directions.len(), 3);
        for spawn in spawns {
            assert_eq!(spawn.cell.cell_type, CellType::Sprout);
            assert_eq!(spawn.cell.organism, cell.organism);
            assert_eq!(
                spawn.position,
                Position::new(4, 4).moved(spawn.cell.direction, 8)
            );
        }
    }

    #[test]
    fn trunk_skips_occupied_neighbours() {
        let mut world = World::new(config()).expect("world");
        let origin = Position::new(4, 4);
        // 15 decodes to Trunk with 15 % 4 + 1 == 4 sprouts.
        sprout_with_genes(&mut world, origin, 500, &[3, 15, 0]);
        world
            .place_founder(origin.moved(Direction::West, 8), CellType::Leaf, 100, 100)
            .expect("blocker");
        world.cleanup_turn();
        world.execute_cell_genomes();
        let spawns = world.pending_spawns();
        assert_eq!(spawns.len(), 3);
        assert!(
            spawns
                .iter()
                .all(|spawn| spawn.position != origin.moved(Direction::West, 8))
        );
    }

    #[test]
    fn change_requires_more_energy_than_cost() {
        let mut world = World::new(config()).expect("world");
        // 1 decodes to Trunk with 2 sprouts: cost 10 + 2 * 5 == 20.
        let sprout = sprout_with_genes(&mut world, Position::new(1, 1), 20, &[3, 1, 0]);
        world.cleanup_turn();
        world.execute_cell_genomes();
        let cell = world.cell(sprout).expect("sprout");
        assert_eq!(cell.cell_type, CellType::Sprout);
        assert_eq!(cell.energy(), 20);
        assert_eq!(cell.genome_position, 1);
        assert!(world.pending_spawns().is_empty());
    }

    #[test]
    fn becoming_a_flower_arms_its_timers() {
        let mut world = World::new(config()).expect("world");
        // 2 decodes to Flower; flight 13 % 20.
        let sprout = sprout_with_genes(&mut world, Position::new(1, 1), 100, &[3, 2, 13]);
        world.cleanup_turn();
        world.execute_cell_genomes();
        let cell = world.cell(sprout).expect("flower");
        assert_eq!(cell.cell_type, CellType::Flower);
        assert_eq!(cell.energy(), 80);
        assert_eq!(cell.flower_timer, 20);
        assert_eq!(cell.seed_flying_timer, 13);
    }

    #[test]
    fn sprouts_do_not_move_but_advance() {
        let mut world = World::new(config()).expect("world");
        let sprout = sprout_with_genes(&mut world, Position::new(1, 1), 100, &[4]);
        world.cleanup_turn();
        world.execute_cell_genomes();
        assert_eq!(world.cell(sprout).expect("sprout").genome_position, 1);
        assert!(world.pending_moves().is_empty());
    }

    #[test]
    fn rotate_turns_and_advances() {
        let mut world = World::new(config()).expect("world");
        let sprout = sprout_with_genes(&mut world, Position::new(1, 1), 100, &[5, 1]);
        world.cleanup_turn();
        world.execute_cell_genomes();
        let cell = world.cell(sprout).expect("sprout");
        assert_eq!(cell.direction, Direction::South);
        assert_eq!(cell.genome_position, 1);
    }

    #[test]
    fn energy_condition_is_decided_at_apply_time() {
        let mut world = World::new(config()).expect("world");
        // If, selector 1 (threshold 1 * 1024 / 255 == 4), gene 0 -> `less`.
        let starving = sprout_with_genes(&mut world, Position::new(1, 1), 3, &[1, 1, 0]);
        let fed = sprout_with_genes(&mut world, Position::new(5, 5), 300, &[1, 1, 0]);
        world.cleanup_turn();
        world.execute_cell_genomes();
        assert_eq!(world.cell(starving).expect("starving").genome_position, 3);
        assert_eq!(world.cell(fed).expect("fed").genome_position, 5);
    }

    #[test]
    fn cell_type_condition_reads_the_applying_cell() {
        let mut world = World::new(config()).expect("world");
        // If, selector 18 (CompareCellType, target 18 % 7 == Sprout), gene 0 -> `equal`.
        let genes = [1, 18, 0];
        let sprout = sprout_with_genes(&mut world, Position::new(1, 1), 100, &genes);
        let mut tape = [0_u8; GENOME_LENGTH];
        tape[..genes.len()].copy_from_slice(&genes);
        let seed = world
            .place_with_tape(Position::new(5, 5), CellType::Seed, 100, 100, tape)
            .expect("seed");
        world.cleanup_turn();
        world.execute_cell_genomes();
        assert_eq!(world.cell(sprout).expect("sprout").genome_position, 3);
        assert_eq!(world.cell(seed).expect("seed").genome_position, 5);
    }

    #[test]
    fn neighbour_count_condition_counts_live_neighbours() {
        let mut world = World::new(config()).expect("world");
        // If, selector 7 (CompareNeighboursCount, threshold 7 % 5 == 2), gene 1 -> at least,
        // relation gene 4 == Any.
        let crowded = sprout_with_genes(&mut world, Position::new(2, 2), 100, &[1, 7, 1, 4]);
        let lonely = sprout_with_genes(&mut world, Position::new(6, 6), 100, &[1, 7, 1, 4]);
        // relation gene 0 == SameOrganism: foreign neighbours are not counted
        let picky = sprout_with_genes(&mut world, Position::new(2, 5), 100, &[1, 7, 1, 0]);
        for position in [
            Position::new(1, 2),
            Position::new(3, 2),
            Position::new(1, 5),
            Position::new(3, 5),
        ] {
            world
                .place_founder(position, CellType::Leaf, 100, 100)
                .expect("neighbour");
        }
        world.cleanup_turn();
        world.execute_cell_genomes();
        assert_eq!(world.cell(crowded).expect("crowded").genome_position, 4);
        assert_eq!(world.cell(lonely).expect("lonely").genome_position, 6);
        assert_eq!(world.cell(picky).expect("picky").genome_position, 6);
    }

    #[test]
    fn next_positions_lists_both_branches() {
        let action = Action::CompareForCell {
            condition: Condition::CellType {
                target: CellType::Leaf,
                equal: true,
            },
            if_true: 7,
            if_false: 9,
        };
        assert_eq!(action.next_positions().collect::<Vec<_>>(), vec![7, 9]);
        assert_eq!(
            Action::Move { next: 0 }.next_positions().collect::<Vec<_>>(),
            vec![0]
        );
    }
}
