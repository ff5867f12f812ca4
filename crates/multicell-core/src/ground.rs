//! Per-position ground resources.

use multicell_index::Position;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::resources::{Quantity, ResourceTable};

/// Resources lying on one grid position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundCell {
    /// Energy potential harvested by leaves; never depleted.
    pub sunlight: Quantity,
    pub organic: Quantity,
    pub water: Quantity,
}

/// Dense ledger of [`GroundCell`]s, one lock per position.
///
/// Parallel harvesters hold at most one position lock at a time.
#[derive(Debug)]
pub struct GroundLedger {
    size: u32,
    cells: Vec<Mutex<GroundCell>>,
}

impl GroundLedger {
    #[must_use]
    pub fn new(size: u32, initial: GroundCell) -> Self {
        let count = (size as usize) * (size as usize);
        Self {
            size,
            cells: (0..count).map(|_| Mutex::new(initial)).collect(),
        }
    }

    /// Positions outside the grid are reduced onto the torus first.
    #[inline]
    fn offset(&self, position: Position) -> usize {
        let Position { x, y } = if position.x < self.size && position.y < self.size {
            position
        } else {
            Position::wrapped(i64::from(position.x), i64::from(position.y), self.size)
        };
        (y as usize) * (self.size as usize) + (x as usize)
    }

    /// Exclusive access to one position.
    pub fn lock(&self, position: Position) -> MutexGuard<'_, GroundCell> {
        self.cells[self.offset(position)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the resources at `position`.
    #[must_use]
    pub fn get(&self, position: Position) -> GroundCell {
        *self.lock(position)
    }

    /// Mutable access when no other thread can hold a lock.
    pub fn get_mut(&mut self, position: Position) -> &mut GroundCell {
        let offset = self.offset(position);
        self.cells[offset]
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore `amount` water everywhere, never beyond `ceiling`.
    pub fn regenerate_water(&mut self, amount: Quantity, ceiling: Quantity) {
        for cell in &mut self.cells {
            let ground = cell.get_mut().unwrap_or_else(PoisonError::into_inner);
            if ground.water < ceiling {
                ground.water = ground.water.saturating_add(amount).min(ceiling);
            }
        }
    }

    /// Ground totals; sunlight is reported as the summed potential.
    #[must_use]
    pub fn totals(&self) -> ResourceTable<i64> {
        let mut totals = ResourceTable::splat(0_i64);
        for cell in &self.cells {
            let ground = cell.lock().unwrap_or_else(PoisonError::into_inner);
            totals.energy += i64::from(ground.sunlight);
            totals.water += i64::from(ground.water);
            totals.organic += i64::from(ground.organic);
        }
        totals
    }
}
