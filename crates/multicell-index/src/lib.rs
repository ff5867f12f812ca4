//! Toroidal grid coordinates and occupancy indexing for the Multicell world.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors emitted by grid index implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., a zero-sized grid).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A key was placed onto a slot that already holds one.
    #[error("position {0} is already occupied")]
    Occupied(Position),
    /// A key was expected at a slot that is empty.
    #[error("position {0} is vacant")]
    Vacant(Position),
    /// The position does not belong to a grid of the given size.
    #[error("position {position} lies outside a grid of size {size}")]
    OutOfBounds { position: Position, size: u32 },
}

/// One of the four orthogonal headings on the grid.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    West,
    North,
    East,
    South,
}

impl Direction {
    /// All headings in neighbour order.
    pub const ALL: [Direction; 4] = [
        Direction::West,
        Direction::North,
        Direction::East,
        Direction::South,
    ];

    /// Number of headings.
    pub const COUNT: u8 = 4;

    /// Decode a heading from an arbitrary byte (taken modulo four).
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index % Self::COUNT {
            0 => Direction::West,
            1 => Direction::North,
            2 => Direction::East,
            _ => Direction::South,
        }
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Heading after a quarter turn counter-clockwise.
    #[must_use]
    pub const fn rotated_left(self) -> Self {
        Self::from_index(self.index() + Self::COUNT - 1)
    }

    /// Heading after a quarter turn clockwise.
    #[must_use]
    pub const fn rotated_right(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    const fn offset(self) -> (i64, i64) {
        match self {
            Direction::West => (-1, 0),
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
        }
    }
}

/// Integer grid coordinate, always reduced onto the torus it was produced for.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    /// Construct a position from already-wrapped coordinates.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Reduce arbitrary signed coordinates onto a torus of edge `size`.
    #[must_use]
    pub fn wrapped(x: i64, y: i64, size: u32) -> Self {
        let extent = i64::from(size.max(1));
        Self {
            x: x.rem_euclid(extent) as u32,
            y: y.rem_euclid(extent) as u32,
        }
    }

    /// The adjacent position one step towards `direction`.
    #[must_use]
    pub fn moved(self, direction: Direction, size: u32) -> Self {
        let (dx, dy) = direction.offset();
        Self::wrapped(i64::from(self.x) + dx, i64::from(self.y) + dy, size)
    }

    /// Von Neumann neighbourhood in [`Direction::ALL`] order.
    #[must_use]
    pub fn neighbours(self, size: u32) -> [Position; 4] {
        Direction::ALL.map(|direction| self.moved(direction, size))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Common behaviour exposed by neighbourhood indices.
pub trait NeighborhoodIndex {
    /// Handle stored per occupied slot.
    type Key: Copy;

    /// Key stored at `position`, if any.
    fn occupant(&self, position: Position) -> Option<Self::Key>;

    /// Visit the four orthogonal neighbours of `position`, occupied or not.
    fn visit_neighbours(
        &self,
        position: Position,
        visitor: &mut dyn FnMut(Direction, Position, Option<Self::Key>),
    );
}

/// Dense square grid holding at most one key per position.
#[derive(Debug, Clone)]
pub struct OccupancyGrid<K> {
    size: u32,
    slots: Vec<Option<K>>,
    occupied: usize,
}

impl<K: Copy + PartialEq> OccupancyGrid<K> {
    /// Create an empty grid with edge length `size`.
    pub fn new(size: u32) -> Result<Self, IndexError> {
        if size == 0 {
            return Err(IndexError::InvalidConfig("grid size must be non-zero"));
        }
        Ok(Self {
            size,
            slots: vec![None; (size as usize) * (size as usize)],
            occupied: 0,
        })
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Number of occupied positions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.occupied
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    #[inline]
    fn offset(&self, position: Position) -> Result<usize, IndexError> {
        if position.x >= self.size || position.y >= self.size {
            return Err(IndexError::OutOfBounds {
                position,
                size: self.size,
            });
        }
        Ok((position.y as usize) * (self.size as usize) + (position.x as usize))
    }

    /// Key stored at `position`; out-of-bounds positions are treated as empty.
    #[must_use]
    pub fn get(&self, position: Position) -> Option<K> {
        self.offset(position).ok().and_then(|idx| self.slots[idx])
    }

    #[must_use]
    pub fn is_occupied(&self, position: Position) -> bool {
        self.get(position).is_some()
    }

    /// Place `key` at `position`, refusing to overwrite an occupant.
    pub fn place(&mut self, position: Position, key: K) -> Result<(), IndexError> {
        let idx = self.offset(position)?;
        if self.slots[idx].is_some() {
            return Err(IndexError::Occupied(position));
        }
        self.slots[idx] = Some(key);
        self.occupied += 1;
        Ok(())
    }

    /// Remove and return whatever occupies `position`.
    pub fn vacate(&mut self, position: Position) -> Option<K> {
        let idx = self.offset(position).ok()?;
        let removed = self.slots[idx].take();
        if removed.is_some() {
            self.occupied -= 1;
        }
        removed
    }

    /// Move the occupant of `from` onto the empty slot `to`.
    pub fn relocate(&mut self, from: Position, to: Position) -> Result<K, IndexError> {
        let from_idx = self.offset(from)?;
        let to_idx = self.offset(to)?;
        if self.slots[to_idx].is_some() {
            return Err(IndexError::Occupied(to));
        }
        let key = self.slots[from_idx].take().ok_or(IndexError::Vacant(from))?;
        self.slots[to_idx] = Some(key);
        Ok(key)
    }

    /// Every position of the grid in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + use<K> {
        let size = self.size;
        (0..size).flat_map(move |y| (0..size).map(move |x| Position::new(x, y)))
    }
}

impl<K: Copy + PartialEq> NeighborhoodIndex for OccupancyGrid<K> {
    type Key = K;

    fn occupant(&self, position: Position) -> Option<K> {
        self.get(position)
    }

    fn visit_neighbours(
        &self,
        position: Position,
        visitor: &mut dyn FnMut(Direction, Position, Option<K>),
    ) {
        for direction in Direction::ALL {
            let neighbour = position.moved(direction, self.size);
            visitor(direction, neighbour, self.get(neighbour));
        }
    }
}
