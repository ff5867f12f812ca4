//! Byte-coded genomes, their interpreter and the shared genome registry.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::action::{Action, Condition};
use crate::cell::{CellType, Relation};
use crate::resources::Quantity;

/// Number of genes on every genome tape.
pub const GENOME_LENGTH: usize = 256;

/// Identity of a registered (or staged) genome.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct GenomeId(pub u64);

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Top-level command encoded by a gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneCommand {
    Pass,
    If,
    GoTo,
    TurnTo,
    Move,
    Rotate,
}

impl GeneCommand {
    pub const COUNT: u8 = 6;

    #[must_use]
    pub const fn decode(gene: u8) -> Option<Self> {
        match gene % Self::COUNT {
            0 => Some(Self::Pass),
            1 => Some(Self::If),
            2 => Some(Self::GoTo),
            3 => Some(Self::TurnTo),
            4 => Some(Self::Move),
            5 => Some(Self::Rotate),
            _ => None,
        }
    }
}

/// Condition selector following an `If` gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    CompareNextTwoGenes,
    CompareEnergyLevel,
    CompareCellType,
    CompareNeighboursCount,
}

impl ConditionKind {
    pub const COUNT: u8 = 4;

    #[must_use]
    pub const fn decode(gene: u8) -> Option<Self> {
        match gene % Self::COUNT {
            0 => Some(Self::CompareNextTwoGenes),
            1 => Some(Self::CompareEnergyLevel),
            2 => Some(Self::CompareCellType),
            3 => Some(Self::CompareNeighboursCount),
            _ => None,
        }
    }
}

/// World constants the interpreter needs while decoding operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    pub max_energy: Quantity,
    pub max_seed_flying_distance: u8,
}

/// Immutable instruction tape shared by every cell that carries it.
#[derive(Clone, PartialEq, Eq)]
pub struct Genome {
    id: GenomeId,
    parent: Option<GenomeId>,
    tape: Box<[u8]>,
}

impl fmt::Debug for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Genome")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("head", &&self.tape[..8])
            .finish()
    }
}

impl Genome {
    fn new(id: GenomeId, parent: Option<GenomeId>, tape: [u8; GENOME_LENGTH]) -> Self {
        Self {
            id,
            parent,
            tape: Box::new(tape),
        }
    }

    #[must_use]
    pub const fn id(&self) -> GenomeId {
        self.id
    }

    /// Genome this one was mutated from; `None` for founding genomes.
    #[must_use]
    pub const fn parent(&self) -> Option<GenomeId> {
        self.parent
    }

    #[must_use]
    pub fn tape(&self) -> &[u8] {
        &self.tape
    }

    /// Gene at `position`; every byte is a valid position.
    #[inline]
    #[must_use]
    pub fn gene(&self, position: u8) -> u8 {
        self.tape[usize::from(position)]
    }

    #[inline]
    fn gene_after(&self, position: u8, offset: u8) -> u8 {
        self.gene(position.wrapping_add(offset))
    }

    /// Decode the instruction at `position` into a ready-to-apply [`Action`].
    ///
    /// Never fails: every byte decodes to something, and all pointer arithmetic wraps at the
    /// tape length.
    pub fn execute_position<R: Rng + ?Sized>(
        &self,
        position: u8,
        params: DecodeParams,
        rng: &mut R,
    ) -> Action {
        let next = position.wrapping_add(1);
        match GeneCommand::decode(self.gene(position)) {
            Some(GeneCommand::Pass) => Action::DoNothing { next },
            Some(GeneCommand::If) => self.decode_if(position, params),
            Some(GeneCommand::GoTo) => Action::DoNothing {
                next: self.gene_after(position, 1),
            },
            Some(GeneCommand::TurnTo) => self.decode_turn_to(position, params, rng),
            Some(GeneCommand::Move) => Action::Move { next },
            Some(GeneCommand::Rotate) => Action::Rotate {
                left: self.gene_after(position, 1) % 2 == 1,
                next,
            },
            None => Action::DoNothing { next },
        }
    }

    fn decode_if(&self, position: u8, params: DecodeParams) -> Action {
        let selector = self.gene_after(position, 1);
        let branch = |offset: u8| position.wrapping_add(offset);
        match ConditionKind::decode(selector) {
            Some(ConditionKind::CompareNextTwoGenes) => {
                let first = self.gene_after(position, 2);
                let second = self.gene_after(position, 3);
                let greater = self.gene_after(position, 4) % 2 == 0;
                let take_first = if greater {
                    first > second
                } else {
                    first <= second
                };
                Action::DoNothing {
                    next: if take_first { branch(2) } else { branch(3) },
                }
            }
            Some(ConditionKind::CompareEnergyLevel) => {
                let scaled =
                    i64::from(selector) * i64::from(params.max_energy) / i64::from(u8::MAX);
                let threshold = Quantity::try_from(scaled).unwrap_or(params.max_energy);
                Action::CompareForCell {
                    condition: Condition::EnergyLevel {
                        threshold,
                        less: self.gene_after(position, 2) % 2 == 0,
                    },
                    if_true: branch(3),
                    if_false: branch(5),
                }
            }
            Some(ConditionKind::CompareCellType) => Action::CompareForCell {
                condition: Condition::CellType {
                    target: CellType::decode(selector),
                    equal: self.gene_after(position, 2) % 2 == 0,
                },
                if_true: branch(3),
                if_false: branch(5),
            },
            Some(ConditionKind::CompareNeighboursCount) => Action::CompareForCell {
                condition: Condition::NeighboursCount {
                    threshold: selector % 5,
                    less: self.gene_after(position, 2) % 2 == 0,
                    relation: Relation::decode(self.gene_after(position, 3)),
                },
                if_true: branch(4),
                if_false: branch(6),
            },
            None => Action::DoNothing { next: branch(1) },
        }
    }

    fn decode_turn_to<R: Rng + ?Sized>(
        &self,
        position: u8,
        params: DecodeParams,
        rng: &mut R,
    ) -> Action {
        let operand = self.gene_after(position, 1);
        let mut target = CellType::decode(operand);
        if target == CellType::Seed {
            // Seeds only come from flowers; substitute a random differentiated type.
            target = CellType::decode(rng.random_range(0..CellType::COUNT));
            if target == CellType::Seed {
                target = CellType::decode(CellType::Seed as u8 + 1);
            }
        }
        Action::ChangeCellType {
            target,
            next: position.wrapping_add(1),
            sprout_count: operand % 4 + 1,
            seed_flight_ticks: u32::from(
                self.gene_after(position, 2) % params.max_seed_flying_distance.max(1),
            ),
        }
    }
}

/// Concurrent registry of genomes keyed by identity.
///
/// Append-only within a run: dead genomes stay registered so lookups from concurrently running
/// cells never dangle.
#[derive(Debug, Default)]
pub struct GenomeStorage {
    genomes: RwLock<HashMap<GenomeId, Arc<Genome>>>,
    next_id: AtomicU64,
}

impl GenomeStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> GenomeId {
        GenomeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// A uniformly random founding genome; not registered until [`Self::register`].
    pub fn founding<R: Rng + ?Sized>(&self, rng: &mut R) -> Arc<Genome> {
        let mut tape = [0_u8; GENOME_LENGTH];
        rng.fill(&mut tape[..]);
        Arc::new(Genome::new(self.allocate_id(), None, tape))
    }

    /// A genome with an explicit tape; not registered until [`Self::register`].
    pub fn from_tape(&self, parent: Option<GenomeId>, tape: [u8; GENOME_LENGTH]) -> Arc<Genome> {
        Arc::new(Genome::new(self.allocate_id(), parent, tape))
    }

    /// Copy-on-mutation reproduction.
    ///
    /// Every gene is independently replaced with probability `mutation_chance`. When nothing was
    /// replaced the parent itself is returned (same allocation, same identity) and no id is
    /// consumed.
    pub fn reproduce<R: Rng + ?Sized>(
        &self,
        parent: &Arc<Genome>,
        mutation_chance: f64,
        rng: &mut R,
    ) -> Arc<Genome> {
        let mut tape = [0_u8; GENOME_LENGTH];
        tape.copy_from_slice(parent.tape());
        let mut mutated = false;
        for gene in &mut tape {
            if rng.random::<f64>() < mutation_chance {
                *gene = rng.random();
                mutated = true;
            }
        }
        if !mutated {
            return Arc::clone(parent);
        }
        Arc::new(Genome::new(self.allocate_id(), Some(parent.id()), tape))
    }

    /// Register `genome`; returns `false` if its identity was already present.
    pub fn register(&self, genome: Arc<Genome>) -> bool {
        let mut genomes = self.genomes.write().unwrap_or_else(PoisonError::into_inner);
        match genomes.entry(genome.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(genome);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: GenomeId) -> Option<Arc<Genome>> {
        self.genomes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Lookup for a genome referenced by a live cell.
    ///
    /// # Panics
    /// When `id` is not registered; live cells always reference registered genomes.
    #[must_use]
    pub fn resolve(&self, id: GenomeId) -> Arc<Genome> {
        self.get(id)
            .unwrap_or_else(|| panic!("genome {id} referenced by a live cell is not registered"))
    }

    #[must_use]
    pub fn contains(&self, id: GenomeId) -> bool {
        self.genomes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.genomes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    const PARAMS: DecodeParams = DecodeParams {
        max_energy: 1024,
        max_seed_flying_distance: 20,
    };

    fn tape_with(genes: &[(u8, u8)]) -> [u8; GENOME_LENGTH] {
        let mut tape = [0_u8; GENOME_LENGTH];
        for (position, gene) in genes {
            tape[usize::from(*position)] = *gene;
        }
        tape
    }

    fn decode(storage: &GenomeStorage, genes: &[(u8, u8)], position: u8) -> Action {
        let genome = storage.from_tape(None, tape_with(genes));
        let mut rng = SmallRng::seed_from_u64(3);
        genome.execute_position(position, PARAMS, &mut rng)
    }

    #[test]
    fn pass_goto_move_and_rotate_decode() {
        let storage = GenomeStorage::new();
        assert_eq!(decode(&storage, &[], 10), Action::DoNothing { next: 11 });
        assert_eq!(
            decode(&storage, &[(10, 2), (11, 99)], 10),
            Action::DoNothing { next: 99 }
        );
        assert_eq!(decode(&storage, &[(10, 4)], 10), Action::Move { next: 11 });
        assert_eq!(
            decode(&storage, &[(10, 5), (11, 3)], 10),
            Action::Rotate {
                left: true,
                next: 11
            }
        );
        assert_eq!(decode(&storage, &[(255, 6)], 255), Action::DoNothing { next: 0 });
    }

    #[test]
    fn compare_next_two_genes_branches_on_raw_bytes() {
        let storage = GenomeStorage::new();
        // selector 0, first 9 > second 3, greater-than mode
        let genes = [(0, 1), (1, 0), (2, 9), (3, 3), (4, 0)];
        assert_eq!(decode(&storage, &genes, 0), Action::DoNothing { next: 2 });
        // less-or-equal mode flips the outcome
        let genes = [(0, 1), (1, 0), (2, 9), (3, 3), (4, 1)];
        assert_eq!(decode(&storage, &genes, 0), Action::DoNothing { next: 3 });
    }

    #[test]
    fn conditional_operands_wrap_around_the_tape() {
        let storage = GenomeStorage::new();
        let genes = [(254, 1), (255, 3), (0, 6), (1, 1)];
        assert_eq!(
            decode(&storage, &genes, 254),
            Action::CompareForCell {
                condition: Condition::NeighboursCount {
                    threshold: 3,
                    less: true,
                    relation: Relation::SameGenome,
                },
                if_true: 2,
                if_false: 4,
            }
        );
    }

    #[test]
    fn energy_threshold_scales_selector_into_energy_range() {
        let storage = GenomeStorage::new();
        let action = decode(&storage, &[(0, 1), (1, 253), (2, 1)], 0);
        assert_eq!(
            action,
            Action::CompareForCell {
                condition: Condition::EnergyLevel {
                    threshold: 253 * 1024 / 255,
                    less: false,
                },
                if_true: 3,
                if_false: 5,
            }
        );
    }

    #[test]
    fn turn_to_never_targets_seed() {
        let storage = GenomeStorage::new();
        // operand 3 decodes to Seed
        let genome = storage.from_tape(None, tape_with(&[(0, 3), (1, 3), (2, 45)]));
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..64 {
            match genome.execute_position(0, PARAMS, &mut rng) {
                Action::ChangeCellType {
                    target,
                    next,
                    sprout_count,
                    seed_flight_ticks,
                } => {
                    assert_ne!(target, CellType::Seed);
                    assert_eq!(next, 1);
                    assert_eq!(sprout_count, 4);
                    assert_eq!(seed_flight_ticks, 5);
                }
                other => panic!("unexpected action {other:?}"),
            }
        }
    }

    #[test]
    fn every_position_decodes_to_a_valid_action() {
        let storage = GenomeStorage::new();
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        for _ in 0..16 {
            let genome = storage.founding(&mut rng);
            for position in 0..=u8::MAX {
                let action = genome.execute_position(position, PARAMS, &mut rng);
                for next in action.next_positions() {
                    assert!(usize::from(next) < GENOME_LENGTH);
                }
            }
        }
    }

    #[test]
    fn reproduction_without_mutation_reuses_parent() {
        let storage = GenomeStorage::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let parent = storage.founding(&mut rng);
        let child = storage.reproduce(&parent, 0.0, &mut rng);
        assert!(Arc::ptr_eq(&parent, &child));
        assert_eq!(child.id(), parent.id());
    }

    #[test]
    fn reproduction_with_certain_mutation_yields_new_genome() {
        let storage = GenomeStorage::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let parent = storage.founding(&mut rng);
        let child = storage.reproduce(&parent, 1.0, &mut rng);
        assert_ne!(child.id(), parent.id());
        assert_eq!(child.parent(), Some(parent.id()));
        let differing = parent
            .tape()
            .iter()
            .zip(child.tape())
            .filter(|(a, b)| a != b)
            .count();
        assert!(differing > 230, "only {differing} genes changed");
    }

    #[test]
    fn registry_is_append_only() {
        let storage = GenomeStorage::new();
        let mut rng = SmallRng::seed_from_u64(4);
        let genome = storage.founding(&mut rng);
        assert!(!storage.contains(genome.id()));
        assert!(storage.register(Arc::clone(&genome)));
        assert!(!storage.register(Arc::clone(&genome)));
        assert_eq!(storage.len(), 1);
        assert!(Arc::ptr_eq(&storage.resolve(genome.id()), &genome));
        assert!(storage.get(GenomeId(999)).is_none());
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn resolving_unknown_genome_is_fatal() {
        let storage = GenomeStorage::new();
        let _ = storage.resolve(GenomeId(5));
    }
}
