//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! message parsing, and bidirectional communication with the registry.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::error::RelayError;
use crate::message::ClientMessage;
use crate::peer::Outbound;
use crate::registry::RegistryCommand;
use crate::types::ClientId;

/// Capacity of the per-connection outbound channel
///
/// A peer that falls this far behind has broadcasts dropped on the floor
/// rather than stalling the registry.
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the peer with the registry,
/// and runs the read/write tasks until either side closes. Whatever ends
/// the connection, the registry receives the same `Disconnect`.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<RegistryCommand>,
) -> Result<(), RelayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Peer {} connected from {}", client_id, peer_addr);

    // Registry -> write task channel
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER_SIZE);

    if cmd_tx
        .send(RegistryCommand::Connect {
            client_id,
            sender: out_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register peer {} - registry closed", client_id);
        return Err(RelayError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Read task (WebSocket -> RegistryCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    // Malformed or unknown frames are dropped without a reply
                    let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
                        debug!("Ignoring unparseable frame from {}", client_id);
                        continue;
                    };
                    let cmd = client_message_to_command(client_id, client_msg);
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Registry closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Ok(Message::Pong(_)) => {
                    // Liveness confirmation for the sweep
                    if cmd_tx_read
                        .send(RegistryCommand::Pong { client_id })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                }
                Ok(Message::Close(_)) => {
                    debug!("Peer {} sent close frame", client_id);
                    break;
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    debug!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Write task (Outbound -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            match out {
                Outbound::Frame(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket send failed, ending write task");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        // Continue - don't break on serialization errors
                    }
                },
                Outbound::Ping => {
                    if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    debug!("Registry requested close for {}", client_id);
                    break;
                }
            }
        }
        debug!("Write task ended for {}", client_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    // Ungraceful closure and explicit leave share the registry's cleanup path
    let _ = cmd_tx.send(RegistryCommand::Disconnect { client_id }).await;

    info!("Peer {} disconnected", client_id);

    Ok(())
}

/// Convert a ClientMessage to a RegistryCommand
fn client_message_to_command(client_id: ClientId, msg: ClientMessage) -> RegistryCommand {
    match msg {
        ClientMessage::ListRooms => RegistryCommand::ListRooms { client_id },
        ClientMessage::CreateRoom { room } => RegistryCommand::CreateRoom { client_id, room },
        ClientMessage::Join { room, username } => RegistryCommand::Join {
            client_id,
            room,
            username,
        },
        ClientMessage::Leave { room, username } => RegistryCommand::Leave {
            client_id,
            room,
            username,
        },
        ClientMessage::Message { text } => RegistryCommand::Message { client_id, text },
    }
}
