//! Game module
//!
//! This module contains the core game logic for the Duskmere server:
//! - Character lifecycle (sessions, movement, death)
//! - Spatial index over map cells
//! - Action cooldowns
//! - World data (maps, items, factions, shops, structures, skills)
//! - The boot orchestrator and its maintenance timers

pub mod character;
pub mod cooldown;
pub mod faction;
pub mod grid;
pub mod item;
pub mod orchestrator;
pub mod registry;
pub mod shop;
pub mod skills;
pub mod structures;
pub mod world;
