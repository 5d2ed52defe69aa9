//! Structure module
//!
//! Structures are immovable fixtures placed on cells: shopfronts, wells,
//! signposts. They never change after boot, so the index is a plain map
//! from cell to fixtures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::grid::CellKey;

/// Static structure definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDef {
    pub id: String,
    pub name: String,

    /// What the fixture is, for client rendering
    #[serde(default)]
    pub kind: String,

    pub map: String,
    pub x: i32,
    pub y: i32,
}

impl StructureDef {
    fn new(id: &str, name: &str, kind: &str, map: &str, x: i32, y: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            map: map.to_string(),
            x,
            y,
        }
    }

    /// Fixtures of the built-in world
    pub fn builtin() -> Vec<StructureDef> {
        vec![
            StructureDef::new("anvil-front", "The Rusty Anvil", "shop", "city", 4, 3),
            StructureDef::new("candle-front", "The Last Candle", "shop", "city", 7, 5),
            StructureDef::new("old-well", "Old Well", "well", "city", 2, 3),
            StructureDef::new("gallows-sign", "Weathered Signpost", "sign", "city", 12, 12),
            StructureDef::new("hollow-shrine", "Hollow Shrine", "shrine", "darkwood", 16, 16),
        ]
    }
}

/// What a client sees of one fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureView {
    pub id: String,
    pub name: String,
    pub kind: String,
}

/// Fixtures grouped by cell
pub struct StructureIndex {
    cells: HashMap<CellKey, Vec<StructureDef>>,
}

impl StructureIndex {
    pub fn new(defs: Vec<StructureDef>) -> Self {
        let mut cells: HashMap<CellKey, Vec<StructureDef>> = HashMap::new();
        for def in defs {
            let key = CellKey::new(def.map.clone(), def.x, def.y);
            cells.entry(key).or_default().push(def);
        }
        Self { cells }
    }

    /// Fixtures standing on a cell
    pub fn at(&self, cell: &CellKey) -> Vec<StructureView> {
        self.cells
            .get(cell)
            .map(|defs| {
                defs.iter()
                    .map(|d| StructureView {
                        id: d.id.clone(),
                        name: d.name.clone(),
                        kind: d.kind.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn structure_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }
}
