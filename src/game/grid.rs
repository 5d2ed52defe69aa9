//! Spatial grid module
//!
//! Tracks which characters stand on which map cell. The grid is an index
//! over character locations; the registry keeps the two in step by
//! relocating through a single grid operation. Everything sits behind one
//! lock so a cross-cell move never exposes a half-applied state.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::game::world::Location;

/// A single grid cell, keyed by map and tile coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub map: String,
    pub x: i32,
    pub y: i32,
}

impl CellKey {
    pub fn new(map: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            map: map.into(),
            x,
            y,
        }
    }

    pub fn of(location: &Location) -> Self {
        Self {
            map: location.map.clone(),
            x: location.x,
            y: location.y,
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.map, self.y, self.x)
    }
}

/// Index of cell occupants
#[derive(Default)]
pub struct SpatialGrid {
    cells: RwLock<HashMap<CellKey, Vec<Uuid>>>,
}

impl SpatialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a character to a cell. Adding an already-present character
    /// changes nothing.
    pub fn add(&self, cell: CellKey, user_id: Uuid) {
        let mut cells = self.cells.write();
        let occupants = cells.entry(cell).or_default();
        if !occupants.contains(&user_id) {
            occupants.push(user_id);
        }
    }

    /// Remove a character from a cell. Removing an absent character
    /// changes nothing; emptied cells are dropped from the table.
    pub fn remove(&self, cell: &CellKey, user_id: Uuid) {
        let mut cells = self.cells.write();
        if let Some(occupants) = cells.get_mut(cell) {
            occupants.retain(|id| *id != user_id);
            if occupants.is_empty() {
                cells.remove(cell);
            }
        }
    }

    /// Move a character between cells in one critical section, so no
    /// reader ever sees it in both cells or neither.
    pub fn relocate(&self, from: &CellKey, to: CellKey, user_id: Uuid) {
        let mut cells = self.cells.write();
        if let Some(occupants) = cells.get_mut(from) {
            occupants.retain(|id| *id != user_id);
            if occupants.is_empty() {
                cells.remove(from);
            }
        }
        let occupants = cells.entry(to).or_default();
        if !occupants.contains(&user_id) {
            occupants.push(user_id);
        }
    }

    /// Ids of every character standing on a cell
    pub fn occupants(&self, cell: &CellKey) -> Vec<Uuid> {
        self.cells.read().get(cell).cloned().unwrap_or_default()
    }

    /// Number of cells with at least one occupant
    pub fn occupied_cells(&self) -> usize {
        self.cells.read().len()
    }
}
