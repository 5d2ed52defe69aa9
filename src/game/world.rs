//! World module
//!
//! The world is a set of named maps, each a bounded grid of walkable tiles.
//! This module owns map definitions, location arithmetic, and the compass
//! used by movement messages. World data is loaded from `data/world.toml`
//! with a built-in fallback world.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::game::faction::{FactionDef, FactionRegistry};
use crate::game::item::{ItemCatalog, ItemDef};
use crate::game::shop::{ShopDef, ShopRegistry};
use crate::game::skills::SkillTable;
use crate::game::structures::{StructureDef, StructureIndex};

/// A position on a named map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub map: String,
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub fn new(map: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            map: map.into(),
            x,
            y,
        }
    }

    /// Canonical room identifier for event fan-out. Every client in the
    /// same cell subscribes to this id.
    pub fn room_id(&self) -> String {
        format!("{}_{}_{}", self.map, self.y, self.x)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.map, self.x, self.y)
    }
}

/// Movement axis as clients name it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

/// Compass direction of a single-step move.
///
/// The map origin is the top-left corner, so increasing y walks South and
/// increasing x walks East.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Resolve a step on an axis to a compass direction. Steps other than
    /// one tile are not a direction.
    pub fn from_step(axis: Axis, delta: i32) -> Option<Self> {
        match (axis, delta) {
            (Axis::Y, 1) => Some(Direction::South),
            (Axis::Y, -1) => Some(Direction::North),
            (Axis::X, 1) => Some(Direction::East),
            (Axis::X, -1) => Some(Direction::West),
            _ => None,
        }
    }

    /// The direction an observer in the destination sees the mover arrive
    /// from.
    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::South => "South",
            Direction::East => "East",
            Direction::West => "West",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Respawn point of a map
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RespawnPoint {
    pub x: i32,
    pub y: i32,
}

/// A single map definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDef {
    /// Map identifier used in locations and room ids
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Width in tiles (valid x is 0..width)
    pub width: i32,

    /// Height in tiles (valid y is 0..height)
    pub height: i32,

    /// Where characters dying on this map come back
    pub respawn: RespawnPoint,
}

/// The complete world data file (`data/world.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldData {
    #[serde(default)]
    pub maps: Vec<MapDef>,

    #[serde(default)]
    pub items: Vec<ItemDef>,

    #[serde(default)]
    pub factions: Vec<FactionDef>,

    #[serde(default)]
    pub shops: Vec<ShopDef>,

    #[serde(default)]
    pub structures: Vec<StructureDef>,
}

static DEFAULT_WORLD: Lazy<WorldData> = Lazy::new(WorldData::builtin);

impl WorldData {
    /// Load world data from `<data_path>/world.toml`, falling back to the
    /// built-in world when the file is absent or unreadable.
    pub fn load(data_path: &Path) -> Self {
        let file = data_path.join("world.toml");
        match std::fs::read_to_string(&file) {
            Ok(content) => match toml::from_str::<WorldData>(&content) {
                Ok(data) => {
                    info!(
                        path = %file.display(),
                        maps = data.maps.len(),
                        items = data.items.len(),
                        "Loaded world data"
                    );
                    data
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "World data unparsable, using built-in world");
                    DEFAULT_WORLD.clone()
                }
            },
            Err(_) => {
                warn!(path = %file.display(), "World data not found, using built-in world");
                DEFAULT_WORLD.clone()
            }
        }
    }

    /// The built-in fallback world: one city map and the woods around it,
    /// with just enough items and fixtures to walk around.
    pub fn builtin() -> Self {
        Self {
            maps: vec![
                MapDef {
                    id: "city".to_string(),
                    name: "Duskmere City".to_string(),
                    width: 24,
                    height: 24,
                    respawn: RespawnPoint { x: 2, y: 3 },
                },
                MapDef {
                    id: "darkwood".to_string(),
                    name: "The Darkwood".to_string(),
                    width: 32,
                    height: 32,
                    respawn: RespawnPoint { x: 16, y: 16 },
                },
            ],
            items: ItemDef::builtin(),
            factions: FactionDef::builtin(),
            shops: ShopDef::builtin(),
            structures: StructureDef::builtin(),
        }
    }
}

/// Everything the boot sequence loads, bundled for the systems that
/// consult it after boot
pub struct WorldContext {
    pub atlas: WorldAtlas,
    pub catalog: ItemCatalog,
    pub factions: FactionRegistry,
    pub shops: ShopRegistry,
    pub structures: StructureIndex,
    pub skills: SkillTable,
}

/// Atlas of loaded maps, checked on every movement and respawn
pub struct WorldAtlas {
    maps: HashMap<String, MapDef>,
}

impl WorldAtlas {
    pub fn new(maps: Vec<MapDef>) -> Self {
        let maps = maps.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self { maps }
    }

    /// Look up a map definition
    pub fn map(&self, id: &str) -> Option<&MapDef> {
        self.maps.get(id)
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Bounds-check a coordinate pair against a map. Returns the resolved
    /// location only when the tile exists.
    pub fn resolve(&self, map: &str, x: i32, y: i32) -> Option<Location> {
        let def = self.maps.get(map)?;
        if x < 0 || y < 0 || x >= def.width || y >= def.height {
            return None;
        }
        Some(Location::new(map, x, y))
    }

    /// The respawn location of a map
    pub fn respawn_of(&self, map: &str) -> Option<Location> {
        let def = self.maps.get(map)?;
        Some(Location::new(map, def.respawn.x, def.respawn.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_atlas() -> WorldAtlas {
        WorldAtlas::new(vec![MapDef {
            id: "city".to_string(),
            name: String::new(),
            width: 10,
            height: 10,
            respawn: RespawnPoint { x: 2, y: 3 },
        }])
    }

    #[test]
    fn test_room_id_format() {
        // Room ids interleave y before x
        let loc = Location::new("city", 6, 5);
        assert_eq!(loc.room_id(), "city_5_6");
    }

    #[test]
    fn test_resolve_bounds() {
        let atlas = test_atlas();
        assert!(atlas.resolve("city", 0, 0).is_some());
        assert!(atlas.resolve("city", 9, 9).is_some());
        assert!(atlas.resolve("city", -1, 0).is_none());
        assert!(atlas.resolve("city", 0, 10).is_none());
        assert!(atlas.resolve("nowhere", 0, 0).is_none());
    }

    #[test]
    fn test_respawn_lookup() {
        let atlas = test_atlas();
        let respawn = atlas.respawn_of("city").unwrap();
        assert_eq!((respawn.x, respawn.y), (2, 3));
        assert!(atlas.respawn_of("nowhere").is_none());
    }

    #[test]
    fn test_direction_naming() {
        assert_eq!(Direction::from_step(Axis::X, 1), Some(Direction::East));
        assert_eq!(Direction::from_step(Axis::X, -1), Some(Direction::West));
        assert_eq!(Direction::from_step(Axis::Y, 1), Some(Direction::South));
        assert_eq!(Direction::from_step(Axis::Y, -1), Some(Direction::North));
        assert_eq!(Direction::from_step(Axis::X, 2), None);
        assert_eq!(Direction::from_step(Axis::Y, 0), None);
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::East.opposite(), Direction::West);
        assert_eq!(Direction::South.opposite(), Direction::North);
        assert_eq!(Direction::East.to_string(), "East");
    }

    #[test]
    fn test_builtin_world() {
        let data = WorldData::builtin();
        let atlas = WorldAtlas::new(data.maps);
        assert!(atlas.map("city").is_some());
        assert!(atlas.resolve("city", 5, 5).is_some());
    }
}
