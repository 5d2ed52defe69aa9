//! Storage module
//!
//! The load/save contract between the game and whatever holds character
//! data at rest. The game only ever talks to the [`CharacterStore`] trait;
//! Postgres backs it in production and an in-memory table backs it in dev
//! mode and tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::game::item::ItemStack;
use crate::game::world::Location;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle to the active storage backend
pub type SharedStore = Arc<dyn CharacterStore>;

/// A character at rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub user_id: Uuid,
    pub name: String,
    pub health: u32,
    pub health_max: u32,
    pub experience: u64,
    pub experience_total: u64,
    pub enhancement_points: u32,
    pub cash: u64,
    pub bank: u64,
    pub capacity: u32,
    pub map: String,
    pub x: i32,
    pub y: i32,
    pub faction: Option<String>,
    /// Set by the backend, never by the game
    pub created_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl CharacterRecord {
    /// The record of a brand-new character standing on its spawn tile
    pub fn fresh(user_id: Uuid, name: &str, spawn: &Location, capacity: u32) -> Self {
        Self {
            user_id,
            name: name.to_string(),
            health: 50,
            health_max: 50,
            experience: 0,
            experience_total: 0,
            enhancement_points: 0,
            cash: 0,
            bank: 0,
            capacity,
            map: spawn.map.clone(),
            x: spawn.x,
            y: spawn.y,
            faction: None,
            created_at: None,
            last_seen: None,
        }
    }
}

/// The load/save contract for character data
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Load a character record by stable identity
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CharacterRecord>, StorageError>;

    /// Load a character record by name, case-insensitive
    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StorageError>;

    /// Write a record, inserting or replacing as needed
    async fn save(&self, record: &CharacterRecord) -> Result<(), StorageError>;

    /// Create a brand-new character on its spawn tile
    async fn create(
        &self,
        user_id: Uuid,
        name: &str,
        spawn: &Location,
        capacity: u32,
    ) -> Result<CharacterRecord, StorageError>;

    /// Load a character's item stacks in slot order
    async fn load_items(&self, user_id: Uuid) -> Result<Vec<ItemStack>, StorageError>;

    /// Replace a character's item stacks
    async fn save_items(&self, user_id: Uuid, stacks: &[ItemStack]) -> Result<(), StorageError>;
}
