//! Item module
//!
//! Covers the item catalog, per-character inventories, and loose items
//! lying on the ground. The catalog is loaded at the first boot stage so
//! every later subsystem can resolve item ids.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::game::grid::CellKey;

/// Slots a character can equip items into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipSlot {
    Head,
    Body,
    Legs,
    Feet,
    Hands,
    Weapon,
    Shield,
    Amulet,
    Ring,
}

impl EquipSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Head => "Head",
            Self::Body => "Body",
            Self::Legs => "Legs",
            Self::Feet => "Feet",
            Self::Hands => "Hands",
            Self::Weapon => "Weapon",
            Self::Shield => "Shield",
            Self::Amulet => "Amulet",
            Self::Ring => "Ring",
        }
    }
}

/// Item definition from the world data file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    /// Item ID
    pub id: u32,

    /// Item name
    pub name: String,

    /// Examine text
    #[serde(default)]
    pub description: String,

    /// Base value in coins
    #[serde(default = "default_value")]
    pub value: u64,

    /// Whether the item stacks in inventory
    #[serde(default)]
    pub stackable: bool,

    /// Equipment slot, when equippable
    #[serde(default)]
    pub slot: Option<EquipSlot>,
}

fn default_value() -> u64 {
    1
}

impl ItemDef {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            value: 1,
            stackable: false,
            slot: None,
        }
    }

    pub fn is_equippable(&self) -> bool {
        self.slot.is_some()
    }

    /// Builder method - set stackable
    pub fn stackable(mut self, stackable: bool) -> Self {
        self.stackable = stackable;
        self
    }

    /// Builder method - set value
    pub fn value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    /// Builder method - set equipment slot
    pub fn slot(mut self, slot: EquipSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Builder method - set description
    pub fn description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// The built-in item set used when no world data file is present.
    pub fn builtin() -> Vec<ItemDef> {
        vec![
            ItemDef::new(1, "Rusty sword")
                .value(26)
                .slot(EquipSlot::Weapon)
                .description("It has seen better centuries."),
            ItemDef::new(2, "Iron dagger")
                .value(91)
                .slot(EquipSlot::Weapon)
                .description("Short, sharp, and honest."),
            ItemDef::new(3, "Wooden buckler")
                .value(20)
                .slot(EquipSlot::Shield)
                .description("A plank with delusions of grandeur."),
            ItemDef::new(4, "Traveler's cloak")
                .value(15)
                .slot(EquipSlot::Body)
                .description("Smells of road dust and rain."),
            ItemDef::new(5, "Leather jerkin")
                .value(160)
                .slot(EquipSlot::Body)
                .description("Stiff but serviceable."),
            ItemDef::new(6, "Patched trousers")
                .value(12)
                .slot(EquipSlot::Legs)
                .description("More patch than trouser."),
            ItemDef::new(7, "Old boots")
                .value(6)
                .slot(EquipSlot::Feet)
                .description("They kept someone else dry once."),
            ItemDef::new(8, "Woolen gloves")
                .value(6)
                .slot(EquipSlot::Hands)
                .description("Knitted by somebody's grandmother."),
            ItemDef::new(9, "Copper ring")
                .value(35)
                .slot(EquipSlot::Ring)
                .description("It turns your finger green."),
            ItemDef::new(10, "Ember charm")
                .value(900)
                .slot(EquipSlot::Amulet)
                .description("Warm to the touch, always."),
            ItemDef::new(11, "Bread loaf")
                .value(12)
                .description("Nice fresh bread."),
            ItemDef::new(12, "Healing draught")
                .value(50)
                .description("Tastes of nettles and hope."),
            ItemDef::new(13, "Torch")
                .value(4)
                .description("Keeps the dark at arm's length."),
            ItemDef::new(14, "Lockpick")
                .value(30)
                .description("For doors that forgot their manners."),
            ItemDef::new(15, "Wolf pelt")
                .value(18)
                .description("Coarse grey fur."),
            ItemDef::new(16, "Tallow candle")
                .stackable(true)
                .value(2)
                .description("Burns fast and smoky."),
        ]
    }
}

/// Catalog of item definitions, built once at boot
pub struct ItemCatalog {
    items: HashMap<u32, ItemDef>,
}

impl ItemCatalog {
    pub fn new(defs: Vec<ItemDef>) -> Self {
        let items = defs.into_iter().map(|d| (d.id, d)).collect();
        Self { items }
    }

    /// Get an item definition by ID
    pub fn get(&self, id: u32) -> Option<&ItemDef> {
        self.items.get(&id)
    }

    pub fn exists(&self, id: u32) -> bool {
        self.items.contains_key(&id)
    }

    pub fn slot_of(&self, id: u32) -> Option<EquipSlot> {
        self.items.get(&id).and_then(|d| d.slot)
    }

    pub fn name_of(&self, id: u32) -> &str {
        self.items.get(&id).map(|d| d.name.as_str()).unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A stack of items held by a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item ID
    pub item: u32,

    /// Stack size (1 for non-stackable items)
    pub qty: u32,

    /// Whether the stack is currently worn
    #[serde(default)]
    pub equipped: bool,
}

impl ItemStack {
    pub fn new(item: u32, qty: u32) -> Self {
        Self {
            item,
            qty,
            equipped: false,
        }
    }
}

/// Client-facing view of one inventory slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub slot: usize,
    pub item: u32,
    pub name: String,
    pub qty: u32,
    pub equipped: bool,
}

/// A character's carried items
///
/// Capacity counts slots, not units; a stackable pile fills one slot no
/// matter its size.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    stacks: Vec<ItemStack>,
}

impl Inventory {
    pub fn new() -> Self {
        Self { stacks: Vec::new() }
    }

    pub fn from_stacks(stacks: Vec<ItemStack>) -> Self {
        Self { stacks }
    }

    pub fn used_slots(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.stacks.get(slot)
    }

    pub fn stacks(&self) -> &[ItemStack] {
        &self.stacks
    }

    /// Add items, merging into an existing stack for stackable defs.
    /// Fails without mutating when a fresh slot would exceed capacity.
    pub fn give(
        &mut self,
        def: &ItemDef,
        qty: u32,
        capacity: u32,
    ) -> Result<usize, GameError> {
        if def.stackable {
            if let Some(pos) = self
                .stacks
                .iter()
                .position(|s| s.item == def.id && !s.equipped)
            {
                self.stacks[pos].qty = self.stacks[pos].qty.saturating_add(qty);
                return Ok(pos);
            }
        }
        if self.stacks.len() >= capacity as usize {
            return Err(GameError::InventoryFull);
        }
        self.stacks.push(ItemStack::new(def.id, qty));
        Ok(self.stacks.len() - 1)
    }

    /// Mark the stack in `slot` as worn. Any other stack worn in the same
    /// equipment slot comes off first.
    pub fn equip(&mut self, slot: usize, catalog: &ItemCatalog) -> Result<(), GameError> {
        let stack = *self
            .stacks
            .get(slot)
            .ok_or(GameError::EmptySlot(slot))?;
        let equip_slot = catalog
            .slot_of(stack.item)
            .ok_or(GameError::NotEquippable)?;

        for other in self.stacks.iter_mut() {
            if other.equipped && catalog.slot_of(other.item) == Some(equip_slot) {
                other.equipped = false;
            }
        }
        self.stacks[slot].equipped = true;
        Ok(())
    }

    /// Take the stack in `slot` off
    pub fn unequip(&mut self, slot: usize) -> Result<(), GameError> {
        let stack = self
            .stacks
            .get_mut(slot)
            .ok_or(GameError::EmptySlot(slot))?;
        stack.equipped = false;
        Ok(())
    }

    /// Empty the inventory, returning every stack with equip flags cleared
    pub fn drain_all(&mut self) -> Vec<ItemStack> {
        let mut stacks = std::mem::take(&mut self.stacks);
        for stack in stacks.iter_mut() {
            stack.equipped = false;
        }
        stacks
    }

    /// Client projection of the whole inventory
    pub fn view(&self, catalog: &ItemCatalog) -> Vec<ItemView> {
        self.stacks
            .iter()
            .enumerate()
            .map(|(slot, s)| ItemView {
                slot,
                item: s.item,
                name: catalog.name_of(s.item).to_string(),
                qty: s.qty,
                equipped: s.equipped,
            })
            .collect()
    }
}

/// Client-facing view of one ground stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundItemView {
    pub item: u32,
    pub name: String,
    pub qty: u32,
}

/// Items lying on the floor, keyed by grid cell
///
/// Ground stacks are world state, not character state; they live in memory
/// only and vanish on restart.
#[derive(Default)]
pub struct GroundItems {
    cells: RwLock<HashMap<CellKey, Vec<ItemStack>>>,
}

impl GroundItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop stacks onto a cell
    pub fn drop_at(&self, cell: CellKey, stacks: Vec<ItemStack>) {
        if stacks.is_empty() {
            return;
        }
        let mut cells = self.cells.write();
        cells.entry(cell).or_default().extend(stacks);
    }

    /// Everything lying on a cell
    pub fn list_at(&self, cell: &CellKey) -> Vec<ItemStack> {
        self.cells.read().get(cell).cloned().unwrap_or_default()
    }

    /// Client projection of a cell's floor
    pub fn view_at(&self, cell: &CellKey, catalog: &ItemCatalog) -> Vec<GroundItemView> {
        self.list_at(cell)
            .into_iter()
            .map(|s| GroundItemView {
                item: s.item,
                name: catalog.name_of(s.item).to_string(),
                qty: s.qty,
            })
            .collect()
    }
}
