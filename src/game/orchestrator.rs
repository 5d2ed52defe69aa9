//! Game orchestrator module
//!
//! Boots the game world in a fixed stage order, owns every runtime
//! component, and runs the named maintenance timers. The network layer
//! talks to the game only through this type.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actions::{self, ClientAction};
use crate::config::ServerConfig;
use crate::error::{GameError, Result};
use crate::events::{ClientEvent, ConnectionId, EventBus};
use crate::game::character::Character;
use crate::game::cooldown::{CooldownLedger, CooldownWindows};
use crate::game::faction::FactionRegistry;
use crate::game::grid::SpatialGrid;
use crate::game::item::{GroundItems, ItemCatalog};
use crate::game::registry::CharacterRegistry;
use crate::game::shop::ShopRegistry;
use crate::game::skills::SkillTable;
use crate::game::structures::StructureIndex;
use crate::game::world::{WorldAtlas, WorldContext, WorldData};
use crate::storage::SharedStore;

/// The running game
pub struct Game {
    config: ServerConfig,
    world: Arc<WorldContext>,
    grid: Arc<SpatialGrid>,
    bus: Arc<EventBus>,
    registry: Arc<CharacterRegistry>,
    /// In-game day counter, bumped by the new-day timer
    day: AtomicU64,
    booted_at: Instant,
}

impl Game {
    /// Boot the world stage by stage: items, world, factions, shops,
    /// structures, commands, characters, skills. Later stages may read
    /// what earlier stages loaded.
    pub async fn boot(config: ServerConfig, store: SharedStore) -> Result<Arc<Self>> {
        let booted_at = Instant::now();
        info!(server = %config.server_name, "Booting game world");

        let data = WorldData::load(&config.data_path);

        let catalog = ItemCatalog::new(data.items);
        info!(stage = "items", items = catalog.len(), "Boot stage complete");

        let atlas = WorldAtlas::new(data.maps);
        let starting = atlas
            .respawn_of(&config.game.starting_map)
            .ok_or(GameError::WorldNotReady)?;
        info!(
            stage = "world",
            maps = atlas.map_count(),
            starting_map = %config.game.starting_map,
            spawn = %starting,
            "Boot stage complete"
        );

        let factions = FactionRegistry::new(data.factions);
        info!(stage = "factions", factions = factions.faction_count(), "Boot stage complete");

        let shops = ShopRegistry::new(data.shops);
        info!(stage = "shops", shops = shops.shop_count(), "Boot stage complete");

        let structures = StructureIndex::new(data.structures);
        info!(
            stage = "structures",
            structures = structures.structure_count(),
            "Boot stage complete"
        );

        // The action set is closed at compile time; nothing to load here.
        info!(stage = "commands", "Boot stage complete");

        let grid = Arc::new(SpatialGrid::new());
        let ground = Arc::new(GroundItems::new());
        let cooldowns = Arc::new(CooldownLedger::new(CooldownWindows::from_config(
            &config.game,
        )));
        info!(stage = "characters", "Boot stage complete");

        let skills = SkillTable::builtin();
        info!(stage = "skills", levels = skills.level_count(), "Boot stage complete");

        let world = Arc::new(WorldContext {
            atlas,
            catalog,
            factions,
            shops,
            structures,
            skills,
        });
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(CharacterRegistry::new(
            Arc::clone(&world),
            Arc::clone(&grid),
            ground,
            Arc::clone(&bus),
            cooldowns,
            store,
            &config.game,
        ));
        debug!("Game components assembled");

        info!(
            server = %config.server_name,
            elapsed_ms = booted_at.elapsed().as_millis() as u64,
            "Game world booted"
        );
        Ok(Arc::new(Self {
            config,
            world,
            grid,
            bus,
            registry,
            day: AtomicU64::new(0),
            booted_at,
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CharacterRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn world(&self) -> &WorldContext {
        &self.world
    }

    /// Start every enabled timer from config. Unknown names are logged
    /// and skipped so a typo cannot take the server down.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for timer in &self.config.timers {
            if !timer.enabled {
                info!(timer = %timer.name, "Timer disabled");
                continue;
            }
            let period = Duration::from_secs(timer.interval_secs);
            match timer.name.as_str() {
                "autosave" => {
                    let game = Arc::clone(self);
                    info!(timer = "autosave", period_secs = timer.interval_secs, "Timer started");
                    handles.push(tokio::spawn(async move {
                        let mut ticker = Self::ticker(period);
                        loop {
                            ticker.tick().await;
                            game.autosave_sweep().await;
                        }
                    }));
                }
                "new-day" => {
                    let game = Arc::clone(self);
                    info!(timer = "new-day", period_secs = timer.interval_secs, "Timer started");
                    handles.push(tokio::spawn(async move {
                        let mut ticker = Self::ticker(period);
                        loop {
                            ticker.tick().await;
                            game.new_day();
                        }
                    }));
                }
                other => warn!(timer = %other, "Unknown timer name, skipping"),
            }
        }
        handles
    }

    /// An interval that first fires one period from now and skips missed
    /// ticks instead of bursting to catch up.
    fn ticker(period: Duration) -> tokio::time::Interval {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Save every online character. One character failing to save never
    /// stops the sweep. Returns how many saved and how many failed.
    pub async fn autosave_sweep(&self) -> (usize, usize) {
        let characters = self.registry.snapshot();
        let mut saved = 0;
        let mut failed = 0;
        for character in characters {
            match self.registry.save(character.user_id).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    failed += 1;
                    error!(
                        user_id = %character.user_id,
                        error = %e,
                        "Autosave failed for character"
                    );
                }
            }
        }
        info!(saved, failed, "Autosave sweep complete");
        (saved, failed)
    }

    /// Advance the in-game day: shops restock, everyone hears about it
    pub fn new_day(&self) -> u64 {
        let day = self.day.fetch_add(1, Ordering::SeqCst) + 1;
        self.world.shops.resupply_all();
        self.bus.to_server(ClientEvent::NewDay { day }, &[]);
        info!(day, "A new day dawns");
        day
    }

    /// Bring a user online: load or create the character, then show the
    /// client its own state, its cell, and who else is on.
    pub async fn begin_session(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> std::result::Result<Arc<Character>, GameError> {
        let character = self.registry.load_or_create(user_id, name).await?;
        self.registry.push_state(&character);
        self.registry.push_surroundings(&character);
        self.bus.to_user(
            user_id,
            ClientEvent::OnlineList {
                names: self.registry.online_names(),
            },
        );
        Ok(character)
    }

    /// Take a user offline
    pub async fn end_session(&self, user_id: Uuid) {
        self.registry.remove(user_id).await;
    }

    /// Run one client action
    pub async fn handle_action(&self, user_id: Uuid, action: ClientAction) {
        actions::route(&self.registry, &self.bus, user_id, action).await;
    }

    pub fn to_user(&self, user_id: Uuid, event: ClientEvent) {
        self.bus.to_user(user_id, event);
    }

    pub fn to_connection(&self, connection_id: ConnectionId, event: ClientEvent) {
        self.bus.to_connection(connection_id, event);
    }

    pub fn to_room(&self, room: &str, event: ClientEvent, exclude: &[Uuid]) {
        self.bus.to_room(room, event, exclude);
    }

    pub fn to_server(&self, event: ClientEvent, exclude: &[Uuid]) {
        self.bus.to_server(event, exclude);
    }

    /// Point-in-time numbers for the status API
    pub fn status(&self) -> GameStatus {
        GameStatus {
            server_name: self.config.server_name.clone(),
            online: self.registry.online_count(),
            connections: self.bus.connection_count(),
            day: self.day.load(Ordering::SeqCst),
            maps: self.world.atlas.map_count(),
            occupied_cells: self.grid.occupied_cells(),
            uptime_secs: self.booted_at.elapsed().as_secs(),
        }
    }

    /// Final save before the process exits
    pub async fn shutdown(&self) {
        info!("Shutting down, saving all characters");
        self.autosave_sweep().await;
    }
}

/// What the status API reports
#[derive(Debug, Clone, Serialize)]
pub struct GameStatus {
    pub server_name: String,
    pub online: usize,
    pub connections: usize,
    pub day: u64,
    pub maps: usize,
    pub occupied_cells: usize,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn game() -> Arc<Game> {
        let mut config = ServerConfig::default();
        // Force the built-in world regardless of what sits in ./data
        config.data_path = std::path::PathBuf::from("./no-such-dir");
        Game::boot(config, Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_boot_status() {
        let game = game().await;
        let status = game.status();
        assert_eq!(status.online, 0);
        assert_eq!(status.day, 0);
        assert!(status.maps >= 2);
    }

    #[tokio::test]
    async fn test_new_day_restocks_and_broadcasts() {
        let game = game().await;
        let connection_id = Uuid::new_v4();
        let mut rx = game.bus().register(connection_id);

        game.world().shops.take_stock("last-candle", 11, 8);
        let day = game.new_day();
        assert_eq!(day, 1);

        let stock = game.world().shops.stock_of("last-candle").unwrap();
        assert!(stock.iter().find(|l| l.item == 11).unwrap().qty >= 7);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClientEvent::NewDay { day: 1 }
        ));
    }

    #[tokio::test]
    async fn test_begin_session_pushes_initial_view() {
        let game = game().await;
        let user_id = Uuid::new_v4();
        let connection_id = Uuid::new_v4();
        let mut rx = game.bus().register(connection_id);
        game.bus().bind_user(user_id, connection_id);

        game.begin_session(user_id, "Maren").await.unwrap();

        let mut saw_state = false;
        let mut saw_surroundings = false;
        let mut saw_online = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ClientEvent::CharacterState(_) => saw_state = true,
                ClientEvent::Surroundings(_) => saw_surroundings = true,
                ClientEvent::OnlineList { names } => {
                    saw_online = true;
                    assert_eq!(names, vec!["Maren".to_string()]);
                }
                _ => {}
            }
        }
        assert!(saw_state && saw_surroundings && saw_online);
        assert_eq!(game.status().online, 1);
    }

    #[tokio::test]
    async fn test_autosave_sweep_counts() {
        let game = game().await;
        let user_id = Uuid::new_v4();
        game.begin_session(user_id, "Maren").await.unwrap();

        let (saved, failed) = game.autosave_sweep().await;
        assert_eq!(saved, 1);
        assert_eq!(failed, 0);
    }

    #[tokio::test]
    async fn test_boot_fails_without_starting_map() {
        let mut config = ServerConfig::default();
        config.data_path = std::path::PathBuf::from("./no-such-dir");
        config.game.starting_map = "the-void".to_string();
        let result = Game::boot(config, Arc::new(MemoryStore::new())).await;
        assert!(result.is_err());
    }
}
