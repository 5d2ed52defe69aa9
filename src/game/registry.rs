//! Character registry module
//!
//! The single owner of every online character. All session lifecycle,
//! movement, and death flows go through here so the registry can keep the
//! character table, the spatial grid, the faction rosters, and the event
//! bus in step with each other.
//!
//! Lock order: a character's `location` lock is taken before the grid
//! lock, never the other way around. Session lifecycle (load, manage,
//! remove) is single-flight per user id through an async gate, so two
//! connections racing the same account can never interleave.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::events::{ClientEvent, EventBus, Surroundings};
use crate::game::character::{Character, CharacterSummary};
use crate::game::cooldown::{ActionKind, CooldownLedger};
use crate::game::grid::{CellKey, SpatialGrid};
use crate::game::item::GroundItems;
use crate::game::world::{Axis, Direction, Location, WorldContext};
use crate::storage::SharedStore;

/// Registry of online characters
pub struct CharacterRegistry {
    /// Live characters by stable identity
    characters: DashMap<Uuid, Arc<Character>>,
    /// Lowercase name to identity
    names: DashMap<String, Uuid>,
    /// Per-user session gates; lifecycle ops for one user run one at a time
    gates: DashMap<Uuid, Arc<Mutex<()>>>,
    world: Arc<WorldContext>,
    grid: Arc<SpatialGrid>,
    ground: Arc<GroundItems>,
    bus: Arc<EventBus>,
    cooldowns: Arc<CooldownLedger>,
    store: SharedStore,
    starting_map: String,
    starting_capacity: u32,
}

impl CharacterRegistry {
    pub fn new(
        world: Arc<WorldContext>,
        grid: Arc<SpatialGrid>,
        ground: Arc<GroundItems>,
        bus: Arc<EventBus>,
        cooldowns: Arc<CooldownLedger>,
        store: SharedStore,
        config: &GameConfig,
    ) -> Self {
        Self {
            characters: DashMap::new(),
            names: DashMap::new(),
            gates: DashMap::new(),
            world,
            grid,
            ground,
            bus,
            cooldowns,
            store,
            starting_map: config.starting_map.clone(),
            starting_capacity: config.starting_capacity,
        }
    }

    fn gate(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.gates
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn cooldowns(&self) -> &CooldownLedger {
        &self.cooldowns
    }

    pub fn catalog(&self) -> &crate::game::item::ItemCatalog {
        &self.world.catalog
    }

    /// Look up an online character
    pub fn get(&self, user_id: Uuid) -> Option<Arc<Character>> {
        self.characters.get(&user_id).map(|e| Arc::clone(e.value()))
    }

    /// Look up an online character by name, case-insensitive
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Character>> {
        let user_id = *self.names.get(&name.to_lowercase())?;
        self.get(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.characters.len()
    }

    /// Names of everyone online, sorted for stable output
    pub fn online_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .characters
            .iter()
            .map(|e| e.value().name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every online character, for sweep-style iteration
    pub fn snapshot(&self) -> Vec<Arc<Character>> {
        self.characters
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Register a character as online.
    ///
    /// If a prior session for the same user is still live, its incoming
    /// combat locks carry over to the new session and the old one is fully
    /// finalized first. At no point are two entries for one user visible.
    pub async fn manage(&self, character: Arc<Character>) {
        let gate = self.gate(character.user_id);
        let _guard = gate.lock().await;
        self.manage_locked(character).await;
    }

    async fn manage_locked(&self, character: Arc<Character>) {
        let user_id = character.user_id;

        let previous = self.characters.get(&user_id).map(|e| Arc::clone(e.value()));
        if let Some(previous) = previous {
            character.set_lockers(previous.clear_lockers());
            info!(user_id = %user_id, "Replacing live session");
            self.finalize_locked(&previous).await;
        }

        self.characters.insert(user_id, Arc::clone(&character));
        if let Some(stale) = self.names.insert(character.name.to_lowercase(), user_id) {
            if stale != user_id {
                warn!(name = %character.name, "Name index entry replaced for a different user");
            }
        }

        if let Some(faction) = character.faction() {
            self.world.factions.link(&faction, user_id);
        }

        let location = character.location();
        let room = location.room_id();
        self.bus.to_room(
            &room,
            ClientEvent::CharacterAppeared(character.summary()),
            &[user_id],
        );
        self.grid.add(CellKey::of(&location), user_id);
        self.bus.join_room(&room, user_id);

        info!(user_id = %user_id, name = %character.name, room = %room, "Character online");
    }

    /// Take a character offline. Absent users are a no-op.
    pub async fn remove(&self, user_id: Uuid) {
        let gate = self.gate(user_id);
        let _guard = gate.lock().await;

        let character = self.characters.get(&user_id).map(|e| Arc::clone(e.value()));
        match character {
            Some(character) => self.finalize_locked(&character).await,
            None => debug!(user_id = %user_id, "Remove for a character not online"),
        }
    }

    /// Save, announce, and unlink one live session. The caller holds the
    /// user's gate.
    async fn finalize_locked(&self, character: &Arc<Character>) {
        let user_id = character.user_id;

        if let Err(e) = self.persist(character).await {
            error!(user_id = %user_id, error = %e, "Save on removal failed, continuing");
        }

        let location = character.location();
        let room = location.room_id();
        self.bus
            .to_room(&room, ClientEvent::CharacterGone { user_id }, &[user_id]);
        self.bus.leave_room(&room, user_id);
        self.grid.remove(&CellKey::of(&location), user_id);

        if let Some(faction) = character.faction() {
            self.world.factions.unlink(&faction, user_id);
        }

        // Release the outgoing combat lock so the target is not pinned by
        // a character that no longer exists.
        if let Some(target) = character.clear_targeting() {
            if let Some(target) = self.get(target) {
                target.remove_locker(user_id);
            }
        }

        self.characters.remove(&user_id);
        self.names
            .remove_if(&character.name.to_lowercase(), |_, id| *id == user_id);

        self.bus.to_server(
            ClientEvent::OnlineList {
                names: self.online_names(),
            },
            &[],
        );

        info!(user_id = %user_id, name = %character.name, "Character offline");
    }

    /// Load a character from storage, or create it on the starting map,
    /// then register it as online. Gateway entry point for a session.
    pub async fn load_or_create(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Arc<Character>, GameError> {
        let gate = self.gate(user_id);
        let _guard = gate.lock().await;

        let character = Arc::new(self.load_character(user_id, name).await?);
        self.manage_locked(Arc::clone(&character)).await;
        Ok(character)
    }

    async fn load_character(&self, user_id: Uuid, name: &str) -> Result<Character, GameError> {
        // A failed load reads as absent: the player gets a fresh character
        // rather than a refused session.
        let record = match self.store.find_by_user_id(user_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Character load failed, treating as new");
                None
            }
        };

        match record {
            Some(record) => {
                let stacks = match self.store.load_items(user_id).await {
                    Ok(stacks) => stacks,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Item load failed, starting empty");
                        Vec::new()
                    }
                };
                Ok(Character::from_record(record, stacks))
            }
            None => {
                let spawn = self
                    .world
                    .atlas
                    .respawn_of(&self.starting_map)
                    .ok_or_else(|| GameError::UnknownMap(self.starting_map.clone()))?;
                if let Err(e) = self
                    .store
                    .create(user_id, name, &spawn, self.starting_capacity)
                    .await
                {
                    error!(user_id = %user_id, error = %e, "Character create failed, session stays unsaved");
                }
                info!(user_id = %user_id, name = %name, "New character created");
                Ok(Character::new(
                    user_id,
                    name,
                    spawn,
                    self.starting_capacity,
                ))
            }
        }
    }

    /// Persist one character's record and items
    async fn persist(&self, character: &Character) -> Result<(), crate::error::StorageError> {
        let record = character.to_record();
        let stacks = character.inventory.read().stacks().to_vec();
        self.store.save(&record).await?;
        self.store.save_items(character.user_id, &stacks).await?;
        Ok(())
    }

    /// Autosave unit: persist one online character, skipping absent ones
    pub async fn save(&self, user_id: Uuid) -> Result<(), crate::error::StorageError> {
        match self.get(user_id) {
            Some(character) => self.persist(&character).await,
            None => {
                debug!(user_id = %user_id, "Save skipped, character went offline");
                Ok(())
            }
        }
    }

    /// Walk a character one tile along an axis.
    ///
    /// Validation happens in a fixed order before anything mutates: the
    /// session must be online, nobody may hold a combat lock on the mover,
    /// the mover must not be hidden, and the move cooldown must have
    /// elapsed. A destination off the map, or a step larger than one tile,
    /// is a silent no-op that consumes no cooldown.
    pub async fn move_character(
        &self,
        user_id: Uuid,
        axis: Axis,
        direction: i32,
    ) -> Result<(), GameError> {
        let character = self.get(user_id).ok_or(GameError::NotLoggedIn)?;

        let lockers = character.lockers();
        if !lockers.is_empty() {
            return Err(GameError::MovementLocked(self.locker_names(&lockers)));
        }
        if character.is_hidden() {
            return Err(GameError::Hidden);
        }
        let claim = self.cooldowns.reserve(user_id, ActionKind::Move)?;

        let from = character.location();
        let (to_x, to_y) = match axis {
            Axis::X => (from.x + direction, from.y),
            Axis::Y => (from.x, from.y + direction),
        };
        let Some(heading) = Direction::from_step(axis, direction) else {
            return Ok(());
        };
        let Some(to) = self.world.atlas.resolve(&from.map, to_x, to_y) else {
            return Ok(());
        };

        // The move is happening: walking away drops the mover's own
        // combat lock on whoever it was fighting.
        if let Some(target) = character.clear_targeting() {
            if let Some(target) = self.get(target) {
                target.remove_locker(user_id);
            }
        }

        let old_room = from.room_id();
        let new_room = to.room_id();
        self.bus.to_room(
            &old_room,
            ClientEvent::Message {
                text: format!("{} leaves to the {}.", character.name, heading),
            },
            &[user_id],
        );
        self.bus.leave_room(&old_room, user_id);

        self.relocate(&character, to);

        self.bus.to_room(
            &new_room,
            ClientEvent::Message {
                text: format!("{} strolls in from the {}.", character.name, heading.opposite()),
            },
            &[user_id],
        );
        self.bus.join_room(&new_room, user_id);

        self.push_state(&character);
        self.push_surroundings(&character);

        claim.start();
        debug!(user_id = %user_id, room = %new_room, "Character moved");
        Ok(())
    }

    /// Kill a character: loot falls where it stood, the spoils split among
    /// everyone holding a combat lock, and the victim comes back at the
    /// map's respawn point. Returns the room the victim died in.
    pub async fn kill(
        &self,
        user_id: Uuid,
        killer: Option<Uuid>,
    ) -> Result<String, GameError> {
        let victim = self
            .get(user_id)
            .ok_or_else(|| GameError::CharacterNotFound(user_id.to_string()))?;

        let from = victim.location();
        let old_room = from.room_id();
        let old_cell = CellKey::of(&from);
        let respawn = self
            .world
            .atlas
            .respawn_of(&from.map)
            .ok_or_else(|| GameError::UnknownMap(from.map.clone()))?;
        let respawn_room = respawn.room_id();

        let loot = victim.die();

        self.bus.leave_room(&old_room, user_id);
        self.relocate(&victim, respawn);

        if !loot.items.is_empty() {
            self.ground.drop_at(old_cell.clone(), loot.items);
        }

        let contributors = victim.clear_lockers();
        for contributor in &contributors {
            if let Some(contributor) = self.get(*contributor) {
                if contributor.targeting() == Some(user_id) {
                    contributor.clear_targeting();
                }
            }
        }

        // Spoils split evenly, remainders vanish. Server-run contributors
        // take their cash share but never experience.
        let count = contributors.len() as u64;
        if count > 0 {
            let cash_share = loot.cash / count;
            let experience_share = loot.experience / count;
            for contributor_id in &contributors {
                let Some(contributor) = self.get(*contributor_id) else {
                    debug!(user_id = %contributor_id, "Contributor went offline before the split");
                    continue;
                };
                contributor.add_cash(cash_share);
                self.push_field(&contributor, "cash", json!(contributor.stats().cash));
                if contributor.is_player() {
                    contributor.add_experience(experience_share);
                    self.push_field(
                        &contributor,
                        "experience",
                        json!(contributor.stats().experience),
                    );
                }
            }
        }

        // The killer hears the full purse, not their share.
        if let Some(killer_id) = killer {
            if let Some(killer) = self.get(killer_id) {
                if killer.is_player() {
                    self.bus.to_user(
                        killer_id,
                        ClientEvent::Message {
                            text: format!(
                                "You have slain {}! Their purse held {} coins.",
                                victim.name, loot.cash
                            ),
                        },
                    );
                }
            }
        }

        self.bus.to_room(
            &old_room,
            ClientEvent::GroundItems {
                map: from.map.clone(),
                x: from.x,
                y: from.y,
                items: self.ground.view_at(&old_cell, &self.world.catalog),
            },
            &[],
        );

        self.bus.to_room(
            &respawn_room,
            ClientEvent::CharacterAppeared(victim.summary()),
            &[user_id],
        );
        self.bus.join_room(&respawn_room, user_id);

        self.push_state(&victim);
        self.push_surroundings(&victim);

        info!(
            user_id = %user_id,
            name = %victim.name,
            cash = loot.cash,
            contributors = count,
            room = %old_room,
            "Character slain"
        );
        Ok(old_room)
    }

    /// Move a character's location and grid entry together. The location
    /// lock is held across the grid update so no reader ever sees the two
    /// disagree.
    fn relocate(&self, character: &Character, to: Location) {
        let mut location = character.location.write();
        let from_cell = CellKey::of(&location);
        let to_cell = CellKey::of(&to);
        self.grid.relocate(&from_cell, to_cell, character.user_id);
        *location = to;
    }

    /// Push a character's full state to its own client
    pub fn push_state(&self, character: &Character) {
        let level = self
            .world
            .skills
            .level_for(character.stats().experience_total);
        self.bus.to_user(
            character.user_id,
            ClientEvent::CharacterState(Box::new(character.state(&self.world.catalog, level))),
        );
    }

    fn push_field(&self, character: &Character, field: &str, value: serde_json::Value) {
        self.bus.to_user(
            character.user_id,
            ClientEvent::CharacterField {
                field: field.to_string(),
                value,
            },
        );
    }

    /// What a character currently sees in its cell. Hidden characters do
    /// not show in the occupant list.
    pub fn surroundings(&self, character: &Character) -> Surroundings {
        let location = character.location();
        let cell = CellKey::of(&location);
        let occupants: Vec<CharacterSummary> = self
            .grid
            .occupants(&cell)
            .into_iter()
            .filter(|id| *id != character.user_id)
            .filter_map(|id| self.get(id))
            .filter(|c| !c.is_hidden())
            .map(|c| c.summary())
            .collect();
        Surroundings {
            room: location.room_id(),
            occupants,
            ground_items: self.ground.view_at(&cell, &self.world.catalog),
            structures: self.world.structures.at(&cell),
        }
    }

    /// Push a character's surroundings to its own client
    pub fn push_surroundings(&self, character: &Character) {
        self.bus.to_user(
            character.user_id,
            ClientEvent::Surroundings(self.surroundings(character)),
        );
    }

    fn locker_names(&self, lockers: &[Uuid]) -> String {
        let names: Vec<String> = lockers
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|c| c.name.clone())
            .collect();
        if names.is_empty() {
            "someone".to_string()
        } else {
            names.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::game::cooldown::CooldownWindows;
    use crate::game::faction::FactionRegistry;
    use crate::game::item::ItemCatalog;
    use crate::game::shop::ShopRegistry;
    use crate::game::skills::SkillTable;
    use crate::game::structures::StructureIndex;
    use crate::game::world::{WorldAtlas, WorldData};
    use crate::storage::MemoryStore;

    fn world_context() -> WorldContext {
        let data = WorldData::builtin();
        WorldContext {
            atlas: WorldAtlas::new(data.maps),
            catalog: ItemCatalog::new(data.items),
            factions: FactionRegistry::new(data.factions),
            shops: ShopRegistry::new(data.shops),
            structures: StructureIndex::new(data.structures),
            skills: SkillTable::builtin(),
        }
    }

    fn registry_with_windows(windows: CooldownWindows) -> (Arc<CharacterRegistry>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let registry = CharacterRegistry::new(
            Arc::new(world_context()),
            Arc::new(SpatialGrid::new()),
            Arc::new(GroundItems::new()),
            Arc::clone(&bus),
            Arc::new(CooldownLedger::new(windows)),
            Arc::new(MemoryStore::new()),
            &GameConfig::default(),
        );
        (Arc::new(registry), bus)
    }

    fn registry() -> (Arc<CharacterRegistry>, Arc<EventBus>) {
        // Zero windows keep multi-step tests free of sleeps
        registry_with_windows(CooldownWindows {
            move_window: Duration::ZERO,
            equip_window: Duration::ZERO,
        })
    }

    /// Connect a named character: register a connection on the bus, bind
    /// the user, and manage the character at the given spot.
    async fn join(
        registry: &CharacterRegistry,
        bus: &EventBus,
        name: &str,
        x: i32,
        y: i32,
    ) -> (Arc<Character>, UnboundedReceiver<ClientEvent>) {
        let user_id = Uuid::new_v4();
        let connection_id = Uuid::new_v4();
        let rx = bus.register(connection_id);
        bus.bind_user(user_id, connection_id);
        let character = Arc::new(Character::new(
            user_id,
            name,
            Location::new("city", x, y),
            20,
        ));
        registry.manage(Arc::clone(&character)).await;
        (character, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_manage_announces_to_room() {
        let (registry, bus) = registry();
        let (_watcher, mut watcher_rx) = join(&registry, &bus, "Maren", 5, 5).await;

        let (newcomer, _rx) = join(&registry, &bus, "Teodric", 5, 5).await;

        let events = drain(&mut watcher_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ClientEvent::CharacterAppeared(s) if s.user_id == newcomer.user_id
        )));
        assert_eq!(registry.online_count(), 2);
        assert_eq!(registry.online_names(), vec!["Maren", "Teodric"]);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_single_entry_and_locks() {
        let (registry, bus) = registry();
        let (first, _rx) = join(&registry, &bus, "Maren", 5, 5).await;
        let attacker = Uuid::new_v4();
        first.add_locker(attacker);

        // Same user id arrives on a new connection
        let connection_id = Uuid::new_v4();
        let _rx2 = bus.register(connection_id);
        bus.bind_user(first.user_id, connection_id);
        let replacement = Arc::new(Character::new(
            first.user_id,
            "Maren",
            Location::new("city", 5, 5),
            20,
        ));
        registry.manage(Arc::clone(&replacement)).await;

        assert_eq!(registry.online_count(), 1);
        let live = registry.get(first.user_id).unwrap();
        assert_eq!(live.lockers(), vec![attacker]);
        assert!(registry.get_by_name("maren").is_some());
    }

    #[tokio::test]
    async fn test_remove_saves_and_broadcasts() {
        let (registry, bus) = registry();
        let (_watcher, mut watcher_rx) = join(&registry, &bus, "Maren", 5, 5).await;
        let (leaver, _rx) = join(&registry, &bus, "Teodric", 5, 5).await;
        leaver.add_cash(75);
        drain(&mut watcher_rx);

        registry.remove(leaver.user_id).await;

        assert_eq!(registry.online_count(), 1);
        assert!(registry.get_by_name("Teodric").is_none());
        let events = drain(&mut watcher_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ClientEvent::CharacterGone { user_id } if *user_id == leaver.user_id
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ClientEvent::OnlineList { names } if names == &vec!["Maren".to_string()]
        )));

        // The save ran before the entry vanished
        let restored = registry.load_or_create(leaver.user_id, "Teodric").await.unwrap();
        assert_eq!(restored.stats().cash, 75);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let (registry, _bus) = registry();
        registry.remove(Uuid::new_v4()).await;
        assert_eq!(registry.online_count(), 0);
    }

    #[tokio::test]
    async fn test_move_blocked_by_lockers() {
        let (registry, bus) = registry();
        let (mover, _a) = join(&registry, &bus, "Maren", 5, 5).await;
        let (attacker, _b) = join(&registry, &bus, "Teodric", 5, 5).await;
        mover.add_locker(attacker.user_id);

        let err = registry
            .move_character(mover.user_id, Axis::X, 1)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "You cannot move while Teodric still has you in their sights"
        );
        assert_eq!(mover.location(), Location::new("city", 5, 5));
    }

    #[tokio::test]
    async fn test_move_blocked_while_hidden() {
        let (registry, bus) = registry();
        let (mover, _rx) = join(&registry, &bus, "Maren", 5, 5).await;
        mover.set_hidden(true);

        let err = registry
            .move_character(mover.user_id, Axis::Y, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Hidden));
    }

    #[tokio::test]
    async fn test_move_cooldown_blocks_second_step() {
        let (registry, bus) = registry_with_windows(CooldownWindows {
            move_window: Duration::from_secs(60),
            equip_window: Duration::ZERO,
        });
        let (mover, _rx) = join(&registry, &bus, "Maren", 5, 5).await;

        registry
            .move_character(mover.user_id, Axis::X, 1)
            .await
            .unwrap();
        let err = registry
            .move_character(mover.user_id, Axis::X, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ActionTooSoon));
        assert_eq!(mover.location(), Location::new("city", 6, 5));
    }

    #[tokio::test]
    async fn test_move_off_the_map_is_silent() {
        let (registry, bus) = registry_with_windows(CooldownWindows {
            move_window: Duration::from_secs(60),
            equip_window: Duration::ZERO,
        });
        let (mover, _rx) = join(&registry, &bus, "Maren", 0, 5).await;

        // Walking off the west edge changes nothing and burns no cooldown
        registry
            .move_character(mover.user_id, Axis::X, -1)
            .await
            .unwrap();
        assert_eq!(mover.location(), Location::new("city", 0, 5));

        registry
            .move_character(mover.user_id, Axis::X, 1)
            .await
            .unwrap();
        assert_eq!(mover.location(), Location::new("city", 1, 5));
    }

    #[tokio::test]
    async fn test_move_messages_both_rooms() {
        let (registry, bus) = registry();
        let (mover, mut mover_rx) = join(&registry, &bus, "Maren", 5, 5).await;
        let (_stay, mut stay_rx) = join(&registry, &bus, "Teodric", 5, 5).await;
        let (_ahead, mut ahead_rx) = join(&registry, &bus, "Wilda", 6, 5).await;
        drain(&mut mover_rx);
        drain(&mut stay_rx);
        drain(&mut ahead_rx);

        registry
            .move_character(mover.user_id, Axis::X, 1)
            .await
            .unwrap();

        let stay_events = drain(&mut stay_rx);
        assert!(stay_events.iter().any(|e| matches!(
            e,
            ClientEvent::Message { text } if text == "Maren leaves to the East."
        )));

        let ahead_events = drain(&mut ahead_rx);
        assert!(ahead_events.iter().any(|e| matches!(
            e,
            ClientEvent::Message { text } if text == "Maren strolls in from the West."
        )));

        // The mover sees neither message, only its own refreshed view
        let mover_events = drain(&mut mover_rx);
        assert!(!mover_events
            .iter()
            .any(|e| matches!(e, ClientEvent::Message { .. })));
        assert!(mover_events
            .iter()
            .any(|e| matches!(e, ClientEvent::CharacterState(_))));
        let surroundings = mover_events.iter().find_map(|e| match e {
            ClientEvent::Surroundings(s) => Some(s),
            _ => None,
        });
        let surroundings = surroundings.unwrap();
        assert_eq!(surroundings.room, "city_5_6");
        assert_eq!(surroundings.occupants.len(), 1);
        assert_eq!(surroundings.occupants[0].name, "Wilda");
    }

    #[tokio::test]
    async fn test_move_releases_own_combat_lock() {
        let (registry, bus) = registry();
        let (mover, _a) = join(&registry, &bus, "Maren", 5, 5).await;
        let (prey, _b) = join(&registry, &bus, "Teodric", 5, 5).await;
        mover.set_targeting(Some(prey.user_id));
        prey.add_locker(mover.user_id);

        registry
            .move_character(mover.user_id, Axis::Y, -1)
            .await
            .unwrap();

        assert!(mover.targeting().is_none());
        assert!(prey.lockers().is_empty());
    }

    #[tokio::test]
    async fn test_kill_splits_spoils_and_respawns() {
        let (registry, bus) = registry();
        let (victim, _v) = join(&registry, &bus, "Maren", 10, 10).await;
        let (killer, mut killer_rx) = join(&registry, &bus, "Teodric", 10, 10).await;
        let npc = Arc::new(Character::npc("Gravehound", Location::new("city", 10, 10)));
        registry.manage(Arc::clone(&npc)).await;

        victim.add_cash(101);
        victim.add_experience(30);
        victim
            .inventory
            .write()
            .give(registry.world.catalog.get(1).unwrap(), 1, 20)
            .unwrap();
        victim.add_locker(killer.user_id);
        victim.add_locker(npc.user_id);
        killer.set_targeting(Some(victim.user_id));
        drain(&mut killer_rx);

        let room = registry
            .kill(victim.user_id, Some(killer.user_id))
            .await
            .unwrap();
        assert_eq!(room, "city_10_10");

        // Floor split: 101 over two contributors is 50 each
        assert_eq!(killer.stats().cash, 50);
        assert_eq!(killer.stats().experience, 15);
        assert_eq!(npc.stats().cash, 50);
        assert_eq!(npc.stats().experience, 0);

        // Victim stands on the respawn tile, whole again and penniless
        assert_eq!(victim.location(), Location::new("city", 2, 3));
        assert_eq!(victim.stats().cash, 0);
        assert!(victim.lockers().is_empty());
        assert!(killer.targeting().is_none());

        // The killer hears the full purse
        let killer_events = drain(&mut killer_rx);
        assert!(killer_events.iter().any(|e| matches!(
            e,
            ClientEvent::Message { text } if text.contains("101 coins")
        )));

        // The sword fell where Maren died
        let dropped = registry
            .ground
            .list_at(&CellKey::new("city", 10, 10));
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].item, 1);
    }

    #[tokio::test]
    async fn test_load_or_create_round_trip() {
        let (registry, bus) = registry();
        let user_id = Uuid::new_v4();
        let connection_id = Uuid::new_v4();
        let _rx = bus.register(connection_id);
        bus.bind_user(user_id, connection_id);

        let created = registry.load_or_create(user_id, "Maren").await.unwrap();
        assert_eq!(created.location(), Location::new("city", 2, 3));
        created.add_cash(40);
        registry.remove(user_id).await;

        let loaded = registry.load_or_create(user_id, "Maren").await.unwrap();
        assert_eq!(loaded.stats().cash, 40);
        assert_eq!(registry.online_count(), 1);
    }
}
