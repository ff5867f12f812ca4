//! Read-only per-tick snapshot for renderers and reporting.

use multicell_index::Position;
use serde::{Deserialize, Serialize};

use crate::cell::CellType;
use crate::genome::GenomeId;
use crate::resources::Quantity;
use crate::world::World;
use crate::{OrganismId, Tick};

/// Copied state of one occupied position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedCell {
    pub position: Position,
    pub cell_type: CellType,
    pub energy: Quantity,
    pub water: Quantity,
    pub organism: OrganismId,
    pub genome: GenomeId,
}

/// Immutable snapshot keyed by position. Holds no references into the live world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldExport {
    pub tick: Tick,
    pub size: u32,
    /// Occupied positions in ascending position order.
    cells: Vec<ExportedCell>,
}

impl WorldExport {
    pub(crate) fn capture(world: &World) -> Self {
        let mut cells: Vec<ExportedCell> = world
            .cells()
            .map(|(id, cell)| ExportedCell {
                position: world.expect_position(id),
                cell_type: cell.cell_type,
                energy: cell.energy(),
                water: cell.water(),
                organism: cell.organism,
                genome: cell.genome,
            })
            .collect();
        cells.sort_unstable_by_key(|cell| cell.position);
        Self {
            tick: world.tick(),
            size: world.size(),
            cells,
        }
    }

    /// Occupant of `position`, if any.
    #[must_use]
    pub fn get(&self, position: Position) -> Option<&ExportedCell> {
        self.cells
            .binary_search_by_key(&position, |cell| cell.position)
            .ok()
            .map(|idx| &self.cells[idx])
    }

    pub fn cells(&self) -> impl Iterator<Item = &ExportedCell> + '_ {
        self.cells.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
