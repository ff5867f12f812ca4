//! Core engine for the Multicell artificial-life sandbox.
//!
//! A toroidal grid of genome-driven cells advanced through an eight-stage tick pipeline.
//! Parallel stages evaluate every cell against an immutable view of the world and stage their
//! side effects; serial stages merge those effects at a single point.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, new_key_type};
use std::fmt;
use thiserror::Error;

pub mod action;
pub mod cell;
pub mod config;
pub mod driver;
pub mod export;
pub mod genome;
pub mod ground;
pub mod organism;
pub mod resources;
pub mod world;

pub use action::{Action, Condition};
pub use cell::{Cell, CellType, Relation};
pub use config::MulticellConfig;
pub use driver::{Simulation, TickSummary};
pub use export::{ExportedCell, WorldExport};
pub use genome::{DecodeParams, GENOME_LENGTH, Genome, GenomeId, GenomeStorage};
pub use ground::{GroundCell, GroundLedger};
pub use multicell_index::{Direction, IndexError, Position};
pub use organism::{Organism, ResourceTransfer};
pub use resources::{Inventory, Quantity, ResourceKind, ResourceTable};
pub use world::{PendingSpawn, TickStage, World};

new_key_type! {
    /// Stable handle for cells backed by a generational slot map.
    pub struct CellId;
}

/// Convenience alias for associating side data with cells.
pub type CellMap<T> = SecondaryMap<CellId, T>;

/// Simulation clock (ticks completed since the world was built).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity shared by every cell of one organism.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct OrganismId(pub u64);

impl fmt::Display for OrganismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Errors that can occur when constructing or seeding world state.
#[derive(Debug, Error)]
pub enum WorldStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Grid placement failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}
