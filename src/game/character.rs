//! Character module
//!
//! The live in-memory model of a connected player or server-run NPC.
//! Mutable fields sit behind their own locks on a shared `Arc<Character>`;
//! accessors copy values out so no caller holds a lock longer than a read.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::grid::CellKey;
use crate::game::item::{Inventory, ItemCatalog, ItemStack, ItemView};
use crate::game::world::Location;
use crate::storage::CharacterRecord;

/// Whether a character is driven by a player or by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterKind {
    Player,
    Npc,
}

/// Numeric character stats, grouped under one lock
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stats {
    pub health: u32,
    pub health_max: u32,
    /// Level progress, forfeited on death
    pub experience: u64,
    /// Lifetime experience, never reduced
    pub experience_total: u64,
    pub enhancement_points: u32,
    /// Carried coins, lost on death
    pub cash: u64,
    /// Banked coins, safe from death
    pub bank: u64,
    /// Inventory slots
    pub capacity: u32,
}

impl Stats {
    pub fn fresh(capacity: u32) -> Self {
        Self {
            health: 50,
            health_max: 50,
            experience: 0,
            experience_total: 0,
            enhancement_points: 0,
            cash: 0,
            bank: 0,
            capacity,
        }
    }
}

/// What a death leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLoot {
    pub items: Vec<ItemStack>,
    pub cash: u64,
    pub experience: u64,
}

/// A character in the world
pub struct Character {
    /// Stable identity across sessions
    pub user_id: Uuid,
    /// Display name, unique among online characters
    pub name: String,
    pub kind: CharacterKind,
    pub stats: RwLock<Stats>,
    pub location: RwLock<Location>,
    /// Faction id, when enrolled
    pub faction: RwLock<Option<String>>,
    /// Who this character has locked onto
    pub targeting: RwLock<Option<Uuid>>,
    /// Who has locked onto this character
    pub targeted_by: RwLock<Vec<Uuid>>,
    pub hidden: RwLock<bool>,
    pub inventory: RwLock<Inventory>,
}

impl Character {
    /// Create a fresh player character
    pub fn new(user_id: Uuid, name: impl Into<String>, location: Location, capacity: u32) -> Self {
        Self {
            user_id,
            name: name.into(),
            kind: CharacterKind::Player,
            stats: RwLock::new(Stats::fresh(capacity)),
            location: RwLock::new(location),
            faction: RwLock::new(None),
            targeting: RwLock::new(None),
            targeted_by: RwLock::new(Vec::new()),
            hidden: RwLock::new(false),
            inventory: RwLock::new(Inventory::new()),
        }
    }

    /// Create a server-run NPC
    pub fn npc(name: impl Into<String>, location: Location) -> Self {
        let mut character = Self::new(Uuid::new_v4(), name, location, 10);
        character.kind = CharacterKind::Npc;
        character
    }

    /// Rebuild a character from its stored record and item rows
    pub fn from_record(record: CharacterRecord, stacks: Vec<ItemStack>) -> Self {
        Self {
            user_id: record.user_id,
            name: record.name,
            kind: CharacterKind::Player,
            stats: RwLock::new(Stats {
                health: record.health,
                health_max: record.health_max,
                experience: record.experience,
                experience_total: record.experience_total,
                enhancement_points: record.enhancement_points,
                cash: record.cash,
                bank: record.bank,
                capacity: record.capacity,
            }),
            location: RwLock::new(Location::new(record.map, record.x, record.y)),
            faction: RwLock::new(record.faction),
            targeting: RwLock::new(None),
            targeted_by: RwLock::new(Vec::new()),
            hidden: RwLock::new(false),
            inventory: RwLock::new(Inventory::from_stacks(stacks)),
        }
    }

    /// Snapshot the character into its storage record shape
    pub fn to_record(&self) -> CharacterRecord {
        let stats = *self.stats.read();
        let location = self.location.read().clone();
        CharacterRecord {
            user_id: self.user_id,
            name: self.name.clone(),
            health: stats.health,
            health_max: stats.health_max,
            experience: stats.experience,
            experience_total: stats.experience_total,
            enhancement_points: stats.enhancement_points,
            cash: stats.cash,
            bank: stats.bank,
            capacity: stats.capacity,
            map: location.map,
            x: location.x,
            y: location.y,
            faction: self.faction.read().clone(),
            created_at: None,
            last_seen: None,
        }
    }

    pub fn is_player(&self) -> bool {
        self.kind == CharacterKind::Player
    }

    pub fn location(&self) -> Location {
        self.location.read().clone()
    }

    pub fn set_location(&self, location: Location) {
        *self.location.write() = location;
    }

    pub fn cell(&self) -> CellKey {
        CellKey::of(&self.location.read())
    }

    pub fn stats(&self) -> Stats {
        *self.stats.read()
    }

    pub fn is_hidden(&self) -> bool {
        *self.hidden.read()
    }

    pub fn set_hidden(&self, hidden: bool) {
        *self.hidden.write() = hidden;
    }

    pub fn faction(&self) -> Option<String> {
        self.faction.read().clone()
    }

    pub fn set_faction(&self, faction: Option<String>) {
        *self.faction.write() = faction;
    }

    /// Ids currently locking this character in place
    pub fn lockers(&self) -> Vec<Uuid> {
        self.targeted_by.read().clone()
    }

    /// Record an incoming lock. Locking twice changes nothing.
    pub fn add_locker(&self, user_id: Uuid) {
        let mut lockers = self.targeted_by.write();
        if !lockers.contains(&user_id) {
            lockers.push(user_id);
        }
    }

    pub fn remove_locker(&self, user_id: Uuid) {
        self.targeted_by.write().retain(|id| *id != user_id);
    }

    /// Drop every incoming lock, returning who held one
    pub fn clear_lockers(&self) -> Vec<Uuid> {
        std::mem::take(&mut *self.targeted_by.write())
    }

    /// Replace the incoming lock set wholesale (session replacement)
    pub fn set_lockers(&self, lockers: Vec<Uuid>) {
        *self.targeted_by.write() = lockers;
    }

    pub fn targeting(&self) -> Option<Uuid> {
        *self.targeting.read()
    }

    pub fn set_targeting(&self, target: Option<Uuid>) {
        *self.targeting.write() = target;
    }

    /// Take the outgoing lock, returning who it pointed at
    pub fn clear_targeting(&self) -> Option<Uuid> {
        self.targeting.write().take()
    }

    pub fn add_cash(&self, amount: u64) {
        let mut stats = self.stats.write();
        stats.cash = stats.cash.saturating_add(amount);
    }

    /// Award experience; both the spendable and lifetime counters grow.
    pub fn add_experience(&self, amount: u64) {
        let mut stats = self.stats.write();
        stats.experience = stats.experience.saturating_add(amount);
        stats.experience_total = stats.experience_total.saturating_add(amount);
    }

    /// The death transition: carried items, carried cash, and level
    /// progress are forfeit; banked coins and lifetime experience stay.
    /// Health comes back in full. Returns what fell on the floor.
    pub fn die(&self) -> DroppedLoot {
        let items = self.inventory.write().drain_all();
        let mut stats = self.stats.write();
        let cash = std::mem::take(&mut stats.cash);
        let experience = std::mem::take(&mut stats.experience);
        stats.health = stats.health_max;
        DroppedLoot {
            items,
            cash,
            experience,
        }
    }

    /// Minimal projection for room occupant lists
    pub fn summary(&self) -> CharacterSummary {
        CharacterSummary {
            user_id: self.user_id,
            name: self.name.clone(),
        }
    }

    /// Full projection pushed to the owning client
    pub fn state(&self, catalog: &ItemCatalog, level: u32) -> CharacterState {
        let stats = *self.stats.read();
        CharacterState {
            user_id: self.user_id,
            name: self.name.clone(),
            kind: self.kind,
            level,
            health: stats.health,
            health_max: stats.health_max,
            experience: stats.experience,
            experience_total: stats.experience_total,
            enhancement_points: stats.enhancement_points,
            cash: stats.cash,
            bank: stats.bank,
            capacity: stats.capacity,
            location: self.location.read().clone(),
            faction: self.faction.read().clone(),
            hidden: *self.hidden.read(),
            inventory: self.inventory.read().view(catalog),
        }
    }
}

impl std::fmt::Debug for Character {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Character")
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("location", &self.location())
            .finish()
    }
}

/// Identity projection for occupant lists and appearance events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub user_id: Uuid,
    pub name: String,
}

/// Full client-facing character state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub user_id: Uuid,
    pub name: String,
    pub kind: CharacterKind,
    pub level: u32,
    pub health: u32,
    pub health_max: u32,
    pub experience: u64,
    pub experience_total: u64,
    pub enhancement_points: u32,
    pub cash: u64,
    pub bank: u64,
    pub capacity: u32,
    pub location: Location,
    pub faction: Option<String>,
    pub hidden: bool,
    pub inventory: Vec<ItemView>,
}
