//! Action module
//!
//! The closed set of actions a client can ask for, and the router that
//! runs them. Adding a variant without handling it is a compile error.
//! A rule rejection turns into a warning pushed back to the asking
//! client; anything else is a server problem and gets logged instead.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::GameError;
use crate::events::{ClientEvent, EventBus};
use crate::game::cooldown::ActionKind;
use crate::game::registry::CharacterRegistry;
use crate::game::world::Axis;

/// Everything a client can ask the game to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientAction {
    /// Walk one tile along an axis
    MoveCharacter { axis: Axis, direction: i32 },

    /// Equip the item in an inventory slot
    EquipItem { slot: usize },

    /// Unequip the item in an inventory slot
    UnequipItem { slot: usize },
}

/// Run one client action against the game.
///
/// Rule rejections become [`ClientEvent::Warning`] pushes to the asking
/// user and never mutate anything; server-side failures are logged and
/// abort just this action.
pub async fn route(
    registry: &Arc<CharacterRegistry>,
    bus: &EventBus,
    user_id: Uuid,
    action: ClientAction,
) {
    let outcome = match action {
        ClientAction::MoveCharacter { axis, direction } => {
            registry.move_character(user_id, axis, direction).await
        }
        ClientAction::EquipItem { slot } => equip(registry, user_id, slot, true),
        ClientAction::UnequipItem { slot } => equip(registry, user_id, slot, false),
    };

    if let Err(e) = outcome {
        if e.is_user_fault() {
            bus.to_user(
                user_id,
                ClientEvent::Warning {
                    text: e.to_string(),
                },
            );
        } else {
            error!(user_id = %user_id, error = %e, "Action failed");
        }
    }
}

/// Equip or unequip the stack in an inventory slot, then show the client
/// its refreshed state. Shares the equip cooldown in both directions.
fn equip(
    registry: &Arc<CharacterRegistry>,
    user_id: Uuid,
    slot: usize,
    equip: bool,
) -> Result<(), GameError> {
    let character = registry.get(user_id).ok_or(GameError::NotLoggedIn)?;
    let claim = registry.cooldowns().reserve(user_id, ActionKind::Equip)?;

    {
        let mut inventory = character.inventory.write();
        if equip {
            inventory.equip(slot, registry.catalog())?;
        } else {
            inventory.unequip(slot)?;
        }
    }

    registry.push_state(&character);
    claim.start();
    debug!(user_id = %user_id, slot, equip, "Equipment changed");
    Ok(())
}
