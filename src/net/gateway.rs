//! Gateway module
//!
//! The WebSocket door into the game. Each connection must identify itself
//! with its first frame; after that the gateway pumps JSON frames both
//! ways: inbound text becomes client actions, outbound bus events become
//! text frames. A dropped socket ends the session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actions::ClientAction;
use crate::error::{DuskmereError, NetworkError, Result};
use crate::events::ClientEvent;
use crate::game::orchestrator::Game;

/// How long a fresh connection may sit silent before identifying
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection-level frames, sent before a session exists
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
enum Hello {
    Identify { name: String },
}

/// Accept connections until shutdown. Each one runs on its own task.
pub async fn run(game: Arc<Game>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let address = format!("0.0.0.0:{}", game.config().gateway_port);
    let listener = TcpListener::bind(&address).await?;
    info!(address = %address, "Gateway listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let game = Arc::clone(&game);
                    tokio::spawn(async move {
                        match handle_connection(game, stream, peer).await {
                            Ok(()) => debug!(address = %peer, "Connection closed"),
                            Err(e) => debug!(address = %peer, error = %e, "Connection ended with error"),
                        }
                    });
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            },
            _ = shutdown.recv() => {
                info!("Gateway shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_connection(game: Arc<Game>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    stream.set_nodelay(true)?;
    let ws = accept_async(stream)
        .await
        .map_err(|e| NetworkError::WebSocket(e.to_string()))?;
    debug!(address = %peer, "WebSocket connection established");

    let (mut sink, mut source) = ws.split();

    // First frame decides who this is
    let name = match identify(&mut source).await {
        Ok(name) => name,
        Err(e) => {
            warn!(address = %peer, error = %e, "Identify failed");
            let _ = sink.close().await;
            return Err(e);
        }
    };

    if game.registry().online_count() >= game.config().max_players as usize {
        info!(address = %peer, "World full, turning connection away");
        send_event(
            &mut sink,
            &ClientEvent::Warning {
                text: "The world is full. Try again soon.".to_string(),
            },
        )
        .await?;
        let _ = sink.close().await;
        return Ok(());
    }

    // Identity is derived from the name until real accounts exist
    let user_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.to_lowercase().as_bytes());
    let connection_id = Uuid::new_v4();
    let mut outbound = game.bus().register(connection_id);
    game.bus().bind_user(user_id, connection_id);

    let character = match game.begin_session(user_id, &name).await {
        Ok(character) => character,
        Err(e) => {
            game.bus().unregister(connection_id);
            let _ = sink.close().await;
            return Err(DuskmereError::Game(e));
        }
    };
    info!(address = %peer, user_id = %user_id, name = %character.name, "Session started");

    send_event(
        &mut sink,
        &ClientEvent::Identified {
            user_id,
            name: character.name.clone(),
        },
    )
    .await?;

    // Pump until either side goes quiet
    loop {
        tokio::select! {
            event = outbound.recv() => match event {
                Some(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&game, user_id, &text).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    game.to_user(
                        user_id,
                        ClientEvent::Warning {
                            text: "Binary frames are not understood here.".to_string(),
                        },
                    );
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(user_id = %user_id, error = %e, "Socket read failed");
                    break;
                }
            }
        }
    }

    // A replacement session may own this user by now; only the owning
    // connection takes the character offline.
    if game.bus().connection_of(user_id) == Some(connection_id) {
        game.end_session(user_id).await;
    } else {
        debug!(user_id = %user_id, "Session was replaced, skipping removal");
    }
    game.bus().unregister(connection_id);
    let _ = sink.close().await;
    Ok(())
}

/// Read the identify frame, skipping control frames, within the timeout
async fn identify(source: &mut SplitStream<WebSocketStream<TcpStream>>) -> Result<String> {
    let deadline = tokio::time::sleep(IDENTIFY_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => return Err(NetworkError::IdentifyExpected.into()),
            frame = source.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(NetworkError::WebSocket(e.to_string()).into()),
                    None => return Err(NetworkError::ConnectionClosed.into()),
                };
                match message {
                    Message::Text(text) => {
                        let hello: Hello = serde_json::from_str(&text)
                            .map_err(|_| NetworkError::IdentifyExpected)?;
                        let Hello::Identify { name } = hello;
                        let name = name.trim();
                        if name.is_empty() || name.len() > 24 {
                            return Err(NetworkError::MalformedFrame(
                                "names are 1 to 24 characters".to_string(),
                            )
                            .into());
                        }
                        return Ok(name.to_string());
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    Message::Binary(_) => {
                        return Err(NetworkError::IdentifyExpected.into());
                    }
                    Message::Close(_) => return Err(NetworkError::ConnectionClosed.into()),
                }
            }
        }
    }
}

/// Parse and run one inbound action frame. Garbage frames earn the client
/// a warning, never a disconnect.
async fn handle_frame(game: &Arc<Game>, user_id: Uuid, text: &str) {
    match serde_json::from_str::<ClientAction>(text) {
        Ok(action) => game.handle_action(user_id, action).await,
        Err(e) => {
            debug!(user_id = %user_id, error = %e, "Unparsable action frame");
            game.to_user(
                user_id,
                ClientEvent::Warning {
                    text: "That action is not understood.".to_string(),
                },
            );
        }
    }
}

async fn send_event(
    sink: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    event: &ClientEvent,
) -> Result<()> {
    let json = serde_json::to_string(event)
        .map_err(|e| DuskmereError::Internal(format!("Event serialization failed: {e}")))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| NetworkError::WebSocket(e.to_string()))?;
    Ok(())
}
