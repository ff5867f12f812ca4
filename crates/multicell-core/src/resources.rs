//! Resource kinds, per-kind tables and clamped cell inventories.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Integer amount of a single resource.
pub type Quantity = i32;

/// Independently tracked resource kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Energy,
    Water,
    Organic,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Energy,
        ResourceKind::Water,
        ResourceKind::Organic,
    ];

    pub const COUNT: usize = 3;

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }
}

/// One value per [`ResourceKind`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceTable<T> {
    pub energy: T,
    pub water: T,
    pub organic: T,
}

impl<T: Copy> ResourceTable<T> {
    #[must_use]
    pub const fn new(energy: T, water: T, organic: T) -> Self {
        Self {
            energy,
            water,
            organic,
        }
    }

    /// Same value for every kind.
    #[must_use]
    pub const fn splat(value: T) -> Self {
        Self::new(value, value, value)
    }

    /// Iterate `(kind, value)` pairs in [`ResourceKind::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, T)> + '_ {
        ResourceKind::ALL.into_iter().map(|kind| (kind, self[kind]))
    }
}

impl<T> Index<ResourceKind> for ResourceTable<T> {
    type Output = T;

    fn index(&self, kind: ResourceKind) -> &T {
        match kind {
            ResourceKind::Energy => &self.energy,
            ResourceKind::Water => &self.water,
            ResourceKind::Organic => &self.organic,
        }
    }
}

impl<T> IndexMut<ResourceKind> for ResourceTable<T> {
    fn index_mut(&mut self, kind: ResourceKind) -> &mut T {
        match kind {
            ResourceKind::Energy => &mut self.energy,
            ResourceKind::Water => &mut self.water,
            ResourceKind::Organic => &mut self.organic,
        }
    }
}

/// Resource holdings of one cell.
///
/// Every mutation clamps the stored amount into `[0, capacity]` for its kind, so readers never
/// observe negative or overfull holdings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    amounts: [Quantity; ResourceKind::COUNT],
    capacity: ResourceTable<Quantity>,
}

impl Inventory {
    /// Empty inventory bounded by `capacity`.
    #[must_use]
    pub fn empty(capacity: ResourceTable<Quantity>) -> Self {
        Self {
            amounts: [0; ResourceKind::COUNT],
            capacity: ResourceTable::new(
                capacity.energy.max(0),
                capacity.water.max(0),
                capacity.organic.max(0),
            ),
        }
    }

    /// Inventory starting with the given energy and water, clamped to capacity.
    #[must_use]
    pub fn stocked(capacity: ResourceTable<Quantity>, energy: Quantity, water: Quantity) -> Self {
        let mut inventory = Self::empty(capacity);
        inventory.set(ResourceKind::Energy, energy);
        inventory.set(ResourceKind::Water, water);
        inventory
    }

    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> Quantity {
        self.amounts[kind.slot()]
    }

    #[must_use]
    pub fn capacity(&self, kind: ResourceKind) -> Quantity {
        self.capacity[kind]
    }

    /// Room left before `kind` hits capacity.
    #[must_use]
    pub fn headroom(&self, kind: ResourceKind) -> Quantity {
        self.capacity[kind] - self.get(kind)
    }

    #[must_use]
    pub fn energy(&self) -> Quantity {
        self.get(ResourceKind::Energy)
    }

    #[must_use]
    pub fn water(&self) -> Quantity {
        self.get(ResourceKind::Water)
    }

    /// Strictly more than `amount` of `kind` is held.
    #[must_use]
    pub fn exceeds(&self, kind: ResourceKind, amount: Quantity) -> bool {
        self.get(kind) > amount
    }

    pub fn set(&mut self, kind: ResourceKind, value: Quantity) {
        self.amounts[kind.slot()] = value.clamp(0, self.capacity[kind]);
    }

    /// Add a signed `delta`, returning the change actually applied after clamping.
    pub fn add(&mut self, kind: ResourceKind, delta: Quantity) -> Quantity {
        let before = self.get(kind);
        self.set(kind, before.saturating_add(delta));
        self.get(kind) - before
    }

    /// Remove up to `amount` of `kind`, returning what was removed.
    pub fn take(&mut self, kind: ResourceKind, amount: Quantity) -> Quantity {
        -self.add(kind, -amount.max(0))
    }
}
