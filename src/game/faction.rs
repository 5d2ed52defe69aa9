//! Faction module
//!
//! Factions are static allegiances a character can carry. The registry
//! keeps the defs plus an online roster per faction, maintained as
//! characters come and go.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{ClientEvent, EventBus};

/// Static faction definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionDef {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,
}

impl FactionDef {
    fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// Factions of the built-in world
    pub fn builtin() -> Vec<FactionDef> {
        vec![
            FactionDef::new(
                "lamplighters",
                "The Lamplighters",
                "Keepers of the city wards against the dark.",
            ),
            FactionDef::new(
                "ashen-pact",
                "The Ashen Pact",
                "Scavengers and smugglers of the burned quarter.",
            ),
            FactionDef::new(
                "verdant-circle",
                "The Verdant Circle",
                "Wardens of the Darkwood who answer to no crown.",
            ),
        ]
    }
}

/// Faction defs plus the online roster of each
pub struct FactionRegistry {
    defs: HashMap<String, FactionDef>,
    rosters: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl FactionRegistry {
    pub fn new(defs: Vec<FactionDef>) -> Self {
        let defs = defs.into_iter().map(|f| (f.id.clone(), f)).collect();
        Self {
            defs,
            rosters: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&FactionDef> {
        self.defs.get(id)
    }

    pub fn faction_count(&self) -> usize {
        self.defs.len()
    }

    /// Put a character on its faction's online roster. Unknown factions
    /// are logged and skipped so one bad record cannot block a login.
    pub fn link(&self, faction_id: &str, user_id: Uuid) {
        if !self.defs.contains_key(faction_id) {
            warn!(faction = %faction_id, user_id = %user_id, "Character claims unknown faction");
            return;
        }
        let mut rosters = self.rosters.write();
        let members = rosters.entry(faction_id.to_string()).or_default();
        if !members.contains(&user_id) {
            members.push(user_id);
        }
        debug!(faction = %faction_id, user_id = %user_id, "Linked to faction roster");
    }

    /// Take a character off its faction's online roster
    pub fn unlink(&self, faction_id: &str, user_id: Uuid) {
        let mut rosters = self.rosters.write();
        if let Some(members) = rosters.get_mut(faction_id) {
            members.retain(|id| *id != user_id);
            if members.is_empty() {
                rosters.remove(faction_id);
            }
        }
    }

    /// Online members of a faction
    pub fn members(&self, faction_id: &str) -> Vec<Uuid> {
        self.rosters
            .read()
            .get(faction_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Send an event to every online member of a faction. Members without
    /// a connection are skipped by the bus, so a stale roster entry can
    /// never fail the others.
    pub fn broadcast(&self, bus: &EventBus, faction_id: &str, event: ClientEvent) {
        for user_id in self.members(faction_id) {
            bus.to_user(user_id, event.clone());
        }
    }
}
