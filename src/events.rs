//! Event module
//!
//! Outbound event envelopes and the bus that fans them out. Game code
//! addresses users, rooms, or the whole server; the bus resolves those to
//! per-connection channels. Sends are synchronous and never fail the
//! caller: a closed receiver just means the client is already gone.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::game::character::{CharacterState, CharacterSummary};
use crate::game::item::GroundItemView;
use crate::game::structures::StructureView;

/// Unique identifier of one client connection
pub type ConnectionId = Uuid;

/// What a client sees of its cell after moving or after the world changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surroundings {
    pub room: String,
    pub occupants: Vec<CharacterSummary>,
    pub ground_items: Vec<GroundItemView>,
    pub structures: Vec<StructureView>,
}

/// Events pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    /// The identify handshake succeeded
    Identified { user_id: Uuid, name: String },

    /// A character entered the recipient's room
    CharacterAppeared(CharacterSummary),

    /// A character left the recipient's room or the world
    CharacterGone { user_id: Uuid },

    /// Full state of the recipient's own character
    CharacterState(Box<CharacterState>),

    /// One field of the recipient's own character changed
    CharacterField {
        field: String,
        value: serde_json::Value,
    },

    /// The recipient's current cell
    Surroundings(Surroundings),

    /// The floor of a cell changed
    GroundItems {
        map: String,
        x: i32,
        y: i32,
        items: Vec<GroundItemView>,
    },

    /// Names of everyone online
    OnlineList { names: Vec<String> },

    /// Narrative text
    Message { text: String },

    /// A rejected action, phrased for the player
    Warning { text: String },

    /// A new in-game day began
    NewDay { day: u64 },
}

/// Fan-out bus over per-connection channels
#[derive(Default)]
pub struct EventBus {
    /// Outbound channel per connection
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ClientEvent>>,
    /// User to connection, bound at identify
    user_connections: DashMap<Uuid, ConnectionId>,
    /// Connection back to user, for exclusion checks
    connection_users: DashMap<ConnectionId, Uuid>,
    /// Room membership
    rooms: DashMap<String, Vec<ConnectionId>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id, tx);
        debug!(connection_id = %connection_id, "Connection registered on bus");
        rx
    }

    /// Drop a connection and every index entry pointing at it
    pub fn unregister(&self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
        if let Some((_, user_id)) = self.connection_users.remove(&connection_id) {
            // Only unbind if the user still points at this connection; a
            // replacement session may have rebound it already.
            self.user_connections
                .remove_if(&user_id, |_, conn| *conn == connection_id);
        }
        for mut room in self.rooms.iter_mut() {
            room.value_mut().retain(|id| *id != connection_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    /// Bind an identified user to a connection
    pub fn bind_user(&self, user_id: Uuid, connection_id: ConnectionId) {
        self.user_connections.insert(user_id, connection_id);
        self.connection_users.insert(connection_id, user_id);
    }

    /// The connection a user currently speaks through
    pub fn connection_of(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.user_connections.get(&user_id).map(|c| *c)
    }

    /// Add a user's connection to a room. Joining twice changes nothing;
    /// users without a connection (server-run characters) are skipped.
    pub fn join_room(&self, room: &str, user_id: Uuid) {
        let Some(connection_id) = self.connection_of(user_id) else {
            return;
        };
        let mut members = self.rooms.entry(room.to_string()).or_default();
        if !members.contains(&connection_id) {
            members.push(connection_id);
        }
    }

    /// Remove a user's connection from a room
    pub fn leave_room(&self, room: &str, user_id: Uuid) {
        let Some(connection_id) = self.connection_of(user_id) else {
            return;
        };
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|id| *id != connection_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove_if(room, |_, m| m.is_empty());
            }
        }
    }

    /// Deliver to one user, if connected
    pub fn to_user(&self, user_id: Uuid, event: ClientEvent) {
        if let Some(connection_id) = self.connection_of(user_id) {
            self.to_connection(connection_id, event);
        }
    }

    /// Deliver to one connection
    pub fn to_connection(&self, connection_id: ConnectionId, event: ClientEvent) {
        if let Some(tx) = self.connections.get(&connection_id) {
            let _ = tx.send(event);
        }
    }

    /// Deliver to every connection in a room, minus the excluded users
    pub fn to_room(&self, room: &str, event: ClientEvent, exclude: &[Uuid]) {
        let Some(members) = self.rooms.get(room).map(|m| m.clone()) else {
            return;
        };
        for connection_id in members {
            if self.is_excluded(connection_id, exclude) {
                continue;
            }
            self.to_connection(connection_id, event.clone());
        }
    }

    /// Deliver to every connection on the server, minus the excluded users
    pub fn to_server(&self, event: ClientEvent, exclude: &[Uuid]) {
        let connection_ids: Vec<ConnectionId> =
            self.connections.iter().map(|e| *e.key()).collect();
        for connection_id in connection_ids {
            if self.is_excluded(connection_id, exclude) {
                continue;
            }
            self.to_connection(connection_id, event.clone());
        }
    }

    fn is_excluded(&self, connection_id: ConnectionId, exclude: &[Uuid]) -> bool {
        if exclude.is_empty() {
            return false;
        }
        self.connection_users
            .get(&connection_id)
            .is_some_and(|user| exclude.contains(&user))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
