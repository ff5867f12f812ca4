//! Per-tick organism grouping and the resource-balancing protocol.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cell::{Cell, CellType, Relation};
use crate::resources::{Quantity, ResourceKind};
use crate::world::World;
use crate::{CellId, OrganismId};

/// One exchange decided during balancing, applied after every donor was evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceTransfer {
    pub donor: CellId,
    pub recipient: CellId,
    pub kind: ResourceKind,
    pub amount: Quantity,
}

/// All live cells sharing an organism identity at the moment of grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organism {
    id: OrganismId,
    members: Vec<CellId>,
}

impl Organism {
    /// Group the world's live cells by organism, ordered by identity.
    #[must_use]
    pub fn group(world: &World) -> Vec<Organism> {
        let mut groups: BTreeMap<OrganismId, Vec<CellId>> = BTreeMap::new();
        for (id, cell) in world.cells() {
            groups.entry(cell.organism).or_default().push(id);
        }
        groups
            .into_iter()
            .map(|(id, members)| Organism { id, members })
            .collect()
    }

    #[must_use]
    pub const fn id(&self) -> OrganismId {
        self.id
    }

    #[must_use]
    pub fn members(&self) -> &[CellId] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Evaluate every member against the current (unmodified) world and collect its transfers.
    #[must_use]
    pub fn plan_transfers(&self, world: &World) -> Vec<ResourceTransfer> {
        if self.members.len() <= 1 {
            return Vec::new();
        }
        self.members
            .par_iter()
            .flat_map_iter(|&donor| donor_transfers(world, donor))
            .collect()
    }
}

fn donor_transfers(world: &World, donor_id: CellId) -> Vec<ResourceTransfer> {
    let Some(donor) = world.cell(donor_id) else {
        return Vec::new();
    };
    if donor.cell_type == CellType::Flower {
        return Vec::new();
    }
    let position = world.expect_position(donor_id);
    let neighbours: Vec<(CellId, &Cell)> = world
        .neighbours_of(position)
        .into_iter()
        .filter_map(|(_, _, occupant)| occupant)
        .filter_map(|id| world.cell(id).map(|cell| (id, cell)))
        .filter(|(_, cell)| may_exchange(world, donor, cell))
        .collect();

    let mut transfers = Vec::new();
    for (kind, step) in world.config().transfer_steps().iter() {
        let held = donor.inventory.get(kind);
        if held < 2 * step {
            continue;
        }
        let mut poorest: Option<(CellId, Quantity)> = None;
        for (id, cell) in &neighbours {
            let amount = cell.inventory.get(kind);
            if poorest.is_none_or(|(_, least)| amount < least) {
                poorest = Some((*id, amount));
            }
        }
        if let Some((recipient, least)) = poorest {
            if least < held {
                transfers.push(ResourceTransfer {
                    donor: donor_id,
                    recipient,
                    kind,
                    amount: step,
                });
            }
        }
    }
    transfers
}

/// Exchange eligibility between two adjacent cells.
///
/// Without a connector both must belong to the same organism. A connector filters the other party
/// through the relation encoded at its current instruction pointer; when both are connectors both
/// filters apply.
fn may_exchange(world: &World, donor: &Cell, recipient: &Cell) -> bool {
    let donor_gate = donor.cell_type == CellType::Connector;
    let recipient_gate = recipient.cell_type == CellType::Connector;
    if !donor_gate && !recipient_gate {
        return donor.organism == recipient.organism;
    }
    (!donor_gate || connector_relation(world, donor).matches(donor, recipient))
        && (!recipient_gate || connector_relation(world, recipient).matches(recipient, donor))
}

fn connector_relation(world: &World, connector: &Cell) -> Relation {
    let genome = world.genomes().resolve(connector.genome);
    Relation::decode(genome.gene(connector.genome_position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MulticellConfig;
    use crate::genome::GENOME_LENGTH;
    use multicell_index::{Direction, Position};

    fn world() -> World {
        World::new(MulticellConfig {
            world_size: 10,
            rng_seed: Some(21),
            seeding_density: 0.0,
            mutation_chance: 0.0,
            ..MulticellConfig::default()
        })
        .expect("world")
    }

    fn place(world: &mut World, position: Position, cell_type: CellType, energy: Quantity) -> CellId {
        world
            .place_founder(position, cell_type, energy, 100)
            .expect("placement")
    }

    fn join(world: &mut World, member: CellId, organism: OrganismId) {
        world.cell_mut(member).expect("member").organism = organism;
    }

    fn organism_of(world: &World, id: CellId) -> OrganismId {
        world.cell(id).expect("cell").organism
    }

    fn plan(world: &World) -> Vec<ResourceTransfer> {
        Organism::group(world)
            .iter()
            .flat_map(|organism| organism.plan_transfers(world))
            .collect()
    }

    #[test]
    fn grouping_collects_members_by_organism() {
        let mut world = world();
        let a = place(&mut world, Position::new(1, 1), CellType::Root, 100);
        let b = place(&mut world, Position::new(2, 1), CellType::Leaf, 100);
        let c = place(&mut world, Position::new(7, 7), CellType::Leaf, 100);
        let organism = organism_of(&world, a);
        join(&mut world, b, organism);
        let groups = Organism::group(&world);
        assert_eq!(groups.len(), 2);
        let shared = groups
            .iter()
            .find(|organism| organism.id() == organism_of(&world, a))
            .expect("shared organism");
        assert_eq!(shared.len(), 2);
        assert!(shared.members().contains(&b));
        assert!(groups.iter().any(|organism| organism.members() == [c]));
    }

    #[test]
    fn richer_member_feeds_poorest_friend() {
        let mut world = world();
        let rich = place(&mut world, Position::new(4, 4), CellType::Root, 300);
        let poor = place(&mut world, Position::new(5, 4), CellType::Leaf, 10);
        let middling = place(&mut world, Position::new(4, 5), CellType::Leaf, 50);
        let organism = organism_of(&world, rich);
        join(&mut world, poor, organism);
        join(&mut world, middling, organism);

        let transfers = plan(&world);
        assert!(transfers.contains(&ResourceTransfer {
            donor: rich,
            recipient: poor,
            kind: ResourceKind::Energy,
            amount: 20,
        }));
        // equal water everywhere: nobody is poorer
        assert!(transfers.iter().all(|t| t.kind == ResourceKind::Energy));
        // a poorer neighbour than the donor itself is required
        assert!(transfers.iter().all(|t| t.donor != poor));
    }

    #[test]
    fn strangers_and_singletons_do_not_exchange() {
        let mut world = world();
        place(&mut world, Position::new(4, 4), CellType::Root, 300);
        place(&mut world, Position::new(5, 4), CellType::Leaf, 10);
        assert!(plan(&world).is_empty());
    }

    #[test]
    fn flowers_never_donate_and_low_holdings_wait() {
        let mut world = world();
        let flower = place(&mut world, Position::new(4, 4), CellType::Flower, 900);
        let leaf = place(&mut world, Position::new(5, 4), CellType::Leaf, 39);
        let friend = place(&mut world, Position::new(6, 4), CellType::Leaf, 0);
        let organism = organism_of(&world, flower);
        join(&mut world, leaf, organism);
        join(&mut world, friend, organism);
        let transfers = plan(&world);
        assert!(transfers.iter().all(|t| t.donor != flower));
        assert!(
            transfers
                .iter()
                .all(|t| !(t.donor == leaf && t.kind == ResourceKind::Energy))
        );
    }

    #[test]
    fn connector_relation_gates_foreign_recipients() {
        let mut world = world();
        let donor = place(&mut world, Position::new(4, 4), CellType::Root, 300);
        let companion = place(&mut world, Position::new(0, 0), CellType::Leaf, 100);
        let organism = organism_of(&world, donor);
        join(&mut world, companion, organism);

        // relation gene 4 == Any: the connector accepts the foreign donor
        let open = world
            .place_with_tape(
                Position::new(4, 4).moved(Direction::East, 10),
                CellType::Connector,
                0,
                100,
                [4; GENOME_LENGTH],
            )
            .expect("connector");
        // relation gene 0 == SameOrganism: refuses
        let closed = world
            .place_with_tape(
                Position::new(4, 4).moved(Direction::West, 10),
                CellType::Connector,
                0,
                100,
                [0; GENOME_LENGTH],
            )
            .expect("connector");

        let transfers = plan(&world);
        let energy: Vec<_> = transfers
            .iter()
            .filter(|t| t.kind == ResourceKind::Energy)
            .collect();
        assert_eq!(energy.len(), 1);
        assert_eq!(energy[0].recipient, open);
        assert!(transfers.iter().all(|t| t.recipient != closed));
    }

    #[test]
    fn connector_relation_gates_its_own_donations() {
        let mut world = world();
        // relation gene 4 == Any: feeds the foreign leaf
        let open = world
            .place_with_tape(Position::new(2, 2), CellType::Connector, 300, 100, [4; GENOME_LENGTH])
            .expect("open connector");
        // relation gene 0 == SameOrganism: keeps to itself
        let closed = world
            .place_with_tape(Position::new(6, 6), CellType::Connector, 300, 100, [0; GENOME_LENGTH])
            .expect("closed connector");
        let fed = place(&mut world, Position::new(3, 2), CellType::Leaf, 10);
        place(&mut world, Position::new(7, 6), CellType::Leaf, 10);
        for (connector, far) in [(open, Position::new(0, 8)), (closed, Position::new(4, 8))] {
            let companion = place(&mut world, far, CellType::Leaf, 100);
            let organism = organism_of(&world, connector);
            join(&mut world, companion, organism);
        }

        let transfers = plan(&world);
        assert_eq!(
            transfers,
            vec![ResourceTransfer {
                donor: open,
                recipient: fed,
                kind: ResourceKind::Energy,
                amount: 20,
            }]
        );
        assert!(transfers.iter().all(|t| t.donor != closed));
    }

    #[test]
    fn applying_a_plan_preserves_totals() {
        let mut world = world();
        let mut organism = None;
        for x in 0..6_u32 {
            let energy = 40 + 90 * (x % 3) as Quantity;
            let id = place(&mut world, Position::new(x, 3), CellType::Root, energy);
            let shared = *organism.get_or_insert(organism_of(&world, id));
            join(&mut world, id, shared);
        }
        let before = world.cell_totals();
        world.cleanup_turn();
        world.execute_cell_genomes();
        world.execute_type_actions();
        world.create_new_cells();
        let harvested = world.cell_totals();
        world.spread_resources();
        assert_eq!(world.cell_totals(), harvested);
        assert_ne!(before, harvested);
    }
}
