//! Duskmere Game Server Library
//!
//! This library provides the core functionality for the Duskmere game server:
//! the persistent world, character sessions, and the wire surface clients
//! talk to.
//!
//! ## Modules
//!
//! - `actions` - The closed set of client actions and their router
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `events` - Outbound client events and the fan-out bus
//! - `game` - Game world, characters, and the boot orchestrator
//! - `net` - WebSocket gateway and the status API
//! - `storage` - Character persistence behind one trait

pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod net;
pub mod storage;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{DuskmereError, Result};
pub use game::orchestrator::Game;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
