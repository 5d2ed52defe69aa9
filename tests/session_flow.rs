//! Integration tests for the session lifecycle and world rules
//!
//! These tests drive the public game API the same way the gateway does:
//! - Session begin/end and the events a fresh client sees
//! - Movement between cells and the narration rooms hear
//! - Combat locks, action cooldowns, and the death transition
//! - Character persistence across sessions

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use duskmere_server::actions::ClientAction;
use duskmere_server::config::ServerConfig;
use duskmere_server::events::{ClientEvent, ConnectionId};
use duskmere_server::game::world::Axis;
use duskmere_server::storage::MemoryStore;
use duskmere_server::Game;

/// One connected client as the tests see it
struct TestClient {
    user_id: Uuid,
    connection_id: ConnectionId,
    rx: UnboundedReceiver<ClientEvent>,
}

/// Boot a game against the built-in world and an in-memory store
async fn boot_game() -> Arc<Game> {
    let mut config = ServerConfig::default();
    // Force the built-in world so the tests do not depend on data files
    config.data_path = std::path::PathBuf::from("./no-such-dir");
    Game::boot(config, Arc::new(MemoryStore::new()))
        .await
        .expect("game should boot")
}

/// Register a connection and bring a user online, in the same order the
/// gateway does it: register, bind, then begin the session.
async fn connect(game: &Arc<Game>, name: &str) -> TestClient {
    let connection_id = Uuid::new_v4();
    let rx = game.bus().register(connection_id);
    let user_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.to_lowercase().as_bytes());
    game.bus().bind_user(user_id, connection_id);
    game.begin_session(user_id, name)
        .await
        .expect("session should begin");
    TestClient {
        user_id,
        connection_id,
        rx,
    }
}

/// Pull everything currently queued for a client
fn drain(client: &mut TestClient) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = client.rx.try_recv() {
        events.push(event);
    }
    events
}

/// Test that a first login creates a character at the starting map's
/// respawn point and shows the client its own state and cell
#[tokio::test]
async fn test_login_spawns_at_city_respawn() {
    let game = boot_game().await;
    let mut client = connect(&game, "Maren").await;

    let character = game
        .registry()
        .get(client.user_id)
        .expect("character should be online");
    let loc = character.location();
    assert_eq!(
        (loc.map.as_str(), loc.x, loc.y),
        ("city", 2, 3),
        "new characters start at the city respawn point"
    );

    let events = drain(&mut client);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::CharacterState(_))),
        "login should push the character's own state"
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::Surroundings(_))),
        "login should push the starting cell"
    );
    assert!(
        events.iter().any(
            |e| matches!(e, ClientEvent::OnlineList { names } if names == &vec!["Maren".to_string()])
        ),
        "login should push the online list"
    );
    assert_eq!(game.status().online, 1);
}

/// Test that stepping East crosses one cell, narrates the departure to
/// the old room, and shows the mover its new cell
#[tokio::test]
async fn test_move_crosses_cells_and_narrates() {
    let game = boot_game().await;
    let mut mover = connect(&game, "Maren").await;
    let mut watcher = connect(&game, "Teodric").await;
    drain(&mut mover);
    drain(&mut watcher);

    game.handle_action(
        mover.user_id,
        ClientAction::MoveCharacter {
            axis: Axis::X,
            direction: 1,
        },
    )
    .await;

    let loc = game.registry().get(mover.user_id).unwrap().location();
    assert_eq!((loc.x, loc.y), (3, 3), "East is one tile along +x");

    let watcher_events = drain(&mut watcher);
    assert!(
        watcher_events
            .iter()
            .any(|e| matches!(e, ClientEvent::Message { text } if text == "Maren leaves to the East.")),
        "the old room should hear the departure"
    );

    let mover_events = drain(&mut mover);
    assert!(
        mover_events
            .iter()
            .any(|e| matches!(e, ClientEvent::Surroundings(s) if s.room == "city_3_3")),
        "the mover should see its new cell"
    );
    assert!(
        !mover_events
            .iter()
            .any(|e| matches!(e, ClientEvent::Message { .. })),
        "the mover hears neither room message"
    );
}

/// Test that identifying again on a fresh connection replaces the old
/// session without losing the combat locks held on the character
#[tokio::test]
async fn test_reconnect_keeps_combat_locks() {
    let game = boot_game().await;
    let first = connect(&game, "Maren").await;
    let attacker = connect(&game, "Ragnar").await;

    // Ragnar pins Maren in combat
    let maren = game.registry().get(first.user_id).unwrap();
    maren.add_locker(attacker.user_id);

    // The same user identifies again on a new connection
    let second = connect(&game, "Maren").await;
    assert_eq!(
        second.user_id, first.user_id,
        "identity derives from the name"
    );
    assert_eq!(
        game.status().online,
        2,
        "the replaced session must not double-count"
    );

    let maren = game
        .registry()
        .get(second.user_id)
        .expect("character should still be online");
    assert_eq!(
        maren.lockers(),
        vec![attacker.user_id],
        "combat locks survive the reconnect"
    );

    assert_eq!(
        game.bus().connection_of(second.user_id),
        Some(second.connection_id),
        "the bus should route the user to the new connection"
    );
}

/// Test that a character held in combat cannot walk away, and that the
/// rejection names whoever holds the lock
#[tokio::test]
async fn test_move_rejected_while_locked() {
    let game = boot_game().await;
    let mut mover = connect(&game, "Maren").await;
    let attacker = connect(&game, "Teodric").await;
    game.registry()
        .get(mover.user_id)
        .unwrap()
        .add_locker(attacker.user_id);
    drain(&mut mover);

    game.handle_action(
        mover.user_id,
        ClientAction::MoveCharacter {
            axis: Axis::Y,
            direction: 1,
        },
    )
    .await;

    let events = drain(&mut mover);
    assert!(
        events.iter().any(|e| matches!(
            e,
            ClientEvent::Warning { text }
                if text == "You cannot move while Teodric still has you in their sights"
        )),
        "the warning should name the locker"
    );
    let loc = game.registry().get(mover.user_id).unwrap().location();
    assert_eq!((loc.x, loc.y), (2, 3), "a locked character does not move");
}

/// Test that a second step inside the cooldown window is rejected
#[tokio::test]
async fn test_move_cooldown_blocks_the_second_step() {
    let game = boot_game().await;
    let mut client = connect(&game, "Maren").await;
    drain(&mut client);

    let step = ClientAction::MoveCharacter {
        axis: Axis::X,
        direction: 1,
    };
    game.handle_action(client.user_id, step.clone()).await;
    game.handle_action(client.user_id, step).await;

    let loc = game.registry().get(client.user_id).unwrap().location();
    assert_eq!(
        (loc.x, loc.y),
        (3, 3),
        "only the first step lands inside the cooldown window"
    );

    let events = drain(&mut client);
    assert!(
        events.iter().any(|e| matches!(
            e,
            ClientEvent::Warning { text }
                if text == "You are still recovering from your last action"
        )),
        "the second step should draw a cooldown warning"
    );
}

/// Test that a step larger than one tile is ignored without consuming
/// the cooldown
#[tokio::test]
async fn test_overlong_step_is_silently_ignored() {
    let game = boot_game().await;
    let mut client = connect(&game, "Maren").await;
    drain(&mut client);

    game.handle_action(
        client.user_id,
        ClientAction::MoveCharacter {
            axis: Axis::X,
            direction: 5,
        },
    )
    .await;
    let events = drain(&mut client);
    assert!(events.is_empty(), "an impossible step draws no response");

    // The ignored step left the cooldown untouched
    game.handle_action(
        client.user_id,
        ClientAction::MoveCharacter {
            axis: Axis::X,
            direction: 1,
        },
    )
    .await;
    let loc = game.registry().get(client.user_id).unwrap().location();
    assert_eq!((loc.x, loc.y), (3, 3));
}

/// Test the death transition: the purse splits evenly among everyone
/// holding a combat lock, the killer hears the full amount, and the
/// victim comes back at the map's respawn point with nothing carried
#[tokio::test]
async fn test_kill_splits_the_purse_and_respawns() {
    let game = boot_game().await;
    let mut killer = connect(&game, "Ragnar").await;
    let accomplice = connect(&game, "Teodric").await;
    let victim = connect(&game, "Maren").await;

    // Walk the victim off the respawn tile so the respawn is observable
    game.registry()
        .move_character(victim.user_id, Axis::X, 1)
        .await
        .expect("the victim should step East");

    let maren = game.registry().get(victim.user_id).unwrap();
    maren.add_cash(101);
    maren.add_locker(killer.user_id);
    maren.add_locker(accomplice.user_id);
    drain(&mut killer);

    let died_in = game
        .registry()
        .kill(victim.user_id, Some(killer.user_id))
        .await
        .expect("the kill should resolve");
    assert_eq!(died_in, "city_3_3", "the kill reports the room died in");

    let maren = game.registry().get(victim.user_id).unwrap();
    let loc = maren.location();
    assert_eq!(
        (loc.x, loc.y),
        (2, 3),
        "the dead come back at the map respawn"
    );
    assert_eq!(maren.stats().cash, 0, "carried coins are forfeit");
    assert!(maren.lockers().is_empty(), "death clears the combat locks");

    let ragnar = game.registry().get(killer.user_id).unwrap();
    let teodric = game.registry().get(accomplice.user_id).unwrap();
    assert_eq!(
        ragnar.stats().cash,
        50,
        "the purse splits evenly, remainder withheld"
    );
    assert_eq!(teodric.stats().cash, 50);

    let killer_events = drain(&mut killer);
    assert!(
        killer_events.iter().any(|e| matches!(
            e,
            ClientEvent::Message { text }
                if text == "You have slain Maren! Their purse held 101 coins."
        )),
        "the killer hears the full purse, not their share"
    );
}

/// Test that progress written at logout is there again at the next login
#[tokio::test]
async fn test_logout_persists_progress() {
    let game = boot_game().await;
    let client = connect(&game, "Maren").await;
    game.registry().get(client.user_id).unwrap().add_cash(40);

    game.end_session(client.user_id).await;
    assert_eq!(game.status().online, 0);

    let client = connect(&game, "Maren").await;
    let maren = game.registry().get(client.user_id).unwrap();
    assert_eq!(
        maren.stats().cash,
        40,
        "progress should survive a logout"
    );
}

/// Test that equipping from an empty slot warns without ending the session
#[tokio::test]
async fn test_equip_empty_slot_warns() {
    let game = boot_game().await;
    let mut client = connect(&game, "Maren").await;
    drain(&mut client);

    game.handle_action(client.user_id, ClientAction::EquipItem { slot: 0 })
        .await;

    let events = drain(&mut client);
    assert!(
        events.iter().any(|e| matches!(
            e,
            ClientEvent::Warning { text } if text == "There is nothing in that slot"
        )),
        "an empty slot should draw a warning"
    );
    assert!(
        game.registry().get(client.user_id).is_some(),
        "the session should survive the rejected action"
    );
}

/// Test that turning the day over restocks the world and tells everyone
#[tokio::test]
async fn test_new_day_announced_to_everyone() {
    let game = boot_game().await;
    let mut client = connect(&game, "Maren").await;
    drain(&mut client);

    let day = game.new_day();
    assert_eq!(day, 1);

    let events = drain(&mut client);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::NewDay { day: 1 })),
        "everyone online should hear the new day"
    );
}

// Note: Full gateway integration tests would require:
// 1. Binding real sockets and speaking the WebSocket protocol
// 2. Driving the identify handshake from a scripted client
// 3. Port isolation between parallel test runs
//
// These tests instead enter through begin_session/handle_action, which is
// exactly what the gateway calls once a connection has identified.
