//! PostgreSQL storage backend
//!
//! Backs the character store with two tables: `characters` (one row per
//! character, keyed by `user_id`) and `character_items` (one row per
//! inventory slot). Timestamps are owned by the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::game::item::ItemStack;
use crate::game::world::Location;
use crate::storage::{CharacterRecord, CharacterStore};

/// Database row for a character
#[derive(Debug, FromRow)]
struct CharacterRow {
    user_id: Uuid,
    name: String,
    health: i32,
    health_max: i32,
    experience: i64,
    experience_total: i64,
    enhancement_points: i32,
    cash: i64,
    bank: i64,
    capacity: i32,
    map: String,
    x: i32,
    y: i32,
    faction: Option<String>,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl CharacterRow {
    fn into_record(self) -> CharacterRecord {
        CharacterRecord {
            user_id: self.user_id,
            name: self.name,
            health: self.health.max(0) as u32,
            health_max: self.health_max.max(0) as u32,
            experience: self.experience.max(0) as u64,
            experience_total: self.experience_total.max(0) as u64,
            enhancement_points: self.enhancement_points.max(0) as u32,
            cash: self.cash.max(0) as u64,
            bank: self.bank.max(0) as u64,
            capacity: self.capacity.max(0) as u32,
            map: self.map,
            x: self.x,
            y: self.y,
            faction: self.faction,
            created_at: Some(self.created_at),
            last_seen: Some(self.last_seen),
        }
    }
}

/// Database row for one inventory slot
#[derive(Debug, FromRow)]
struct ItemRow {
    item_id: i64,
    qty: i32,
    equipped: bool,
}

const CHARACTER_COLUMNS: &str = "user_id, name, health, health_max, experience, \
     experience_total, enhancement_points, cash, bank, capacity, map, x, y, faction, \
     created_at, last_seen";

/// PostgreSQL-backed character store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CharacterStore for PgStore {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CharacterRecord>, StorageError> {
        let row: Option<CharacterRow> = sqlx::query_as(&format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load character: {}", e);
            StorageError::Database(e)
        })?;

        Ok(row.map(CharacterRow::into_record))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StorageError> {
        let row: Option<CharacterRow> = sqlx::query_as(&format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters WHERE LOWER(name) = LOWER($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load character by name: {}", e);
            StorageError::Database(e)
        })?;

        Ok(row.map(CharacterRow::into_record))
    }

    async fn save(&self, record: &CharacterRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO characters (
                user_id, name, health, health_max, experience, experience_total,
                enhancement_points, cash, bank, capacity, map, x, y, faction
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id) DO UPDATE SET
                name = $2,
                health = $3,
                health_max = $4,
                experience = $5,
                experience_total = $6,
                enhancement_points = $7,
                cash = $8,
                bank = $9,
                capacity = $10,
                map = $11,
                x = $12,
                y = $13,
                faction = $14,
                last_seen = NOW()
            "#,
        )
        .bind(record.user_id)
        .bind(&record.name)
        .bind(record.health as i32)
        .bind(record.health_max as i32)
        .bind(record.experience as i64)
        .bind(record.experience_total as i64)
        .bind(record.enhancement_points as i32)
        .bind(record.cash as i64)
        .bind(record.bank as i64)
        .bind(record.capacity as i32)
        .bind(&record.map)
        .bind(record.x)
        .bind(record.y)
        .bind(&record.faction)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save character: {}", e);
            StorageError::Database(e)
        })?;

        debug!(user_id = %record.user_id, name = %record.name, "Saved character");
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

        info!(user_id = %user_id, name = %name, "Created new character");
        Ok(record)
    }

    async fn load_items(&self, user_id: Uuid) -> Result<Vec<ItemStack>, StorageError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT item_id, qty, equipped
            FROM character_items
            WHERE user_id = $1
            ORDER BY slot
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load items: {}", e);
            StorageError::Database(e)
        })?;

        Ok(rows
            .into_iter()
            .map(|r| ItemStack {
                item: r.item_id.max(0) as u32,
                qty: r.qty.max(0) as u32,
                equipped: r.equipped,
            })
            .collect())
    }

    async fn save_items(&self, user_id: Uuid, stacks: &[ItemStack]) -> Result<(), StorageError> {
        // Replace wholesale; slot order is the stack order
        sqlx::query("DELETE FROM character_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to clear items: {}", e);
                StorageError::Database(e)
            })?;

        for (slot, stack) in stacks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO character_items (user_id, slot, item_id, qty, equipped)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user_id)
            .bind(slot as i32)
            .bind(stack.item as i64)
            .bind(stack.qty as i32)
            .bind(stack.equipped)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to save item at slot {}: {}", slot, e);
                StorageError::Database(e)
            })?;
        }

        Ok(())
    }
}
