//! In-memory storage backend
//!
//! Backs dev mode and tests. Behaves like the Postgres store from the
//! game's side of the contract, minus durability.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StorageError;
use crate::game::item::ItemStack;
use crate::game::world::Location;
use crate::storage::{CharacterRecord, CharacterStore};

/// Character store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, CharacterRecord>>,
    items: RwLock<HashMap<Uuid, Vec<ItemStack>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored characters
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CharacterRecord>, StorageError> {
        Ok(self.records.read().get(&user_id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StorageError> {
        let lower = name.to_lowercase();
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.name.to_lowercase() == lower)
            .cloned())
    }

    async fn save(&self, record: &CharacterRecord) -> Result<(), StorageError> {
        let mut records = self.records.write();
        let mut stored = record.clone();
        let now = Utc::now();
        stored.created_at = records
            .get(&record.user_id)
            .and_then(|r| r.created_at)
            .or(Some(now));
        stored.last_seen = Some(now);
        records.insert(record.user_id, stored);
        Ok(())
    }

    async fn create(
        &self,
        user_id: Uuid,
        name: &str,
        spawn: &Location,
        capacity: u32,
    ) -> Result<CharacterRecord, StorageError> {
        let record = CharacterRecord::fresh(user_id, name, spawn, capacity);
        self.save(&record).await?;
        Ok(record)
    }

    async fn load_items(&self, user_id: Uuid) -> Result<Vec<ItemStack>, StorageError> {
        Ok(self.items.read().get(&user_id).cloned().unwrap_or_default())
    }

    async fn save_items(&self, user_id: Uuid, stacks: &[ItemStack]) -> Result<(), StorageError> {
        self.items.write().insert(user_id, stacks.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_round_trip() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let spawn = Location::new("city", 2, 3);

        assert!(store.find_by_user_id(user_id).await.unwrap().is_none());

        let record = store.create(user_id, "Maren", &spawn, 20).await.unwrap();
        assert_eq!(record.map, "city");

        let loaded = store.find_by_user_id(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Maren");
        assert!(loaded.created_at.is_some());
    }

    #[tokio::test]
    async fn test_find_by_name_is_case_insensitive() {
        let store = MemoryStore::new();
        let spawn = Location::new("city", 2, 3);
        store
            .create(Uuid::new_v4(), "Maren", &spawn, 20)
            .await
            .unwrap();

        assert!(store.find_by_name("maren").await.unwrap().is_some());
        assert!(store.find_by_name("MAREN").await.unwrap().is_some());
        assert!(store.find_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_preserves_created_at() {
        let store = MemoryStore::new();
        let spawn = Location::new("city", 2, 3);
        let mut record = store
            .create(Uuid::new_v4(), "Maren", &spawn, 20)
            .await
            .unwrap();

        let created = store
            .find_by_user_id(record.user_id)
            .await
            .unwrap()
            .unwrap()
            .created_at;

        record.cash = 40;
        store.save(&record).await.unwrap();

        let loaded = store.find_by_user_id(record.user_id).await.unwrap().unwrap();
        assert_eq!(loaded.cash, 40);
        assert_eq!(loaded.created_at, created);
    }

    #[tokio::test]
    async fn test_items_round_trip() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();

        assert!(store.load_items(user_id).await.unwrap().is_empty());

        let stacks = vec![ItemStack::new(1, 1), ItemStack::new(16, 4)];
        store.save_items(user_id, &stacks).await.unwrap();

        let loaded = store.load_items(user_id).await.unwrap();
        assert_eq!(loaded, stacks);
    }
}
