//! Error handling module
//!
//! Defines custom error types for the Duskmere server.

use std::io;

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the Duskmere server
#[derive(Error, Debug)]
pub enum DuskmereError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(Uuid),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Expected an identify frame")]
    IdentifyExpected,
}

/// Game logic errors
///
/// Display strings for the user-fault variants double as the text of the
/// warning event sent back to the acting client.
#[derive(Error, Debug)]
pub enum GameError {
    #[error("You are not logged in")]
    NotLoggedIn,

    #[error("You cannot move while {0} still has you in their sights")]
    MovementLocked(String),

    #[error("You cannot do that while hidden")]
    Hidden,

    #[error("You are still recovering from your last action")]
    ActionTooSoon,

    #[error("Your hands are too full to carry that")]
    InventoryFull,

    #[error("There is nothing in that slot")]
    EmptySlot(usize),

    #[error("That cannot be equipped")]
    NotEquippable,

    #[error("Character not found: {0}")]
    CharacterNotFound(String),

    #[error("Unknown map: {0}")]
    UnknownMap(String),

    #[error("Unknown item: {0}")]
    UnknownItem(u32),

    #[error("World not ready")]
    WorldNotReady,
}

impl GameError {
    /// Whether the failure is something the acting client caused and can
    /// correct. User faults become warning events and are never logged as
    /// server errors; everything else aborts the operation and is logged.
    pub fn is_user_fault(&self) -> bool {
        !matches!(
            self,
            GameError::CharacterNotFound(_)
                | GameError::UnknownMap(_)
                | GameError::UnknownItem(_)
                | GameError::WorldNotReady
        )
    }
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found for {0}")]
    RecordMissing(Uuid),

    #[error("Storage backend unavailable")]
    Unavailable,
}

/// Result type alias for Duskmere operations
pub type Result<T> = std::result::Result<T, DuskmereError>;
