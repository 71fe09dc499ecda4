//! WebSocket connection handler
//!
//! Decodes remote calls from one WebSocket connection, runs each against
//! the `ChatServer` in its own task and writes the replies back. Holds no
//! chat state of its own beyond the tokens minted on this connection,
//! which are quit when the connection drops.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, ChatError};
use crate::message::{Call, ErrorCode, Outcome, Request, Response};
use crate::server::ChatServer;
use crate::types::{ConnectionId, Token};

/// Buffer size for replies waiting to be written
const RESPONSE_BUFFER_SIZE: usize = 64;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, then serves calls until either side
/// closes. Outstanding calls (typically parked long-polls) are aborted on
/// disconnect.
pub async fn handle_connection(stream: TcpStream, server: ChatServer) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Channel for call tasks -> writer
    let (resp_tx, mut resp_rx) = mpsc::channel::<Response>(RESPONSE_BUFFER_SIZE);
    let minted: Arc<Mutex<Vec<Token>>> = Arc::new(Mutex::new(Vec::new()));

    // Spawn read task (WebSocket -> one task per call)
    let read_server = server.clone();
    let read_minted = minted.clone();
    let mut read_task = tokio::spawn(async move {
        let mut calls = JoinSet::new();

        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<Request>(&text) {
                    Ok(request) => {
                        debug!(
                            "Connection {} call #{} {}",
                            connection_id,
                            request.id,
                            request.call.method()
                        );
                        calls.spawn(serve_call(
                            read_server.clone(),
                            request,
                            read_minted.clone(),
                            resp_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Invalid request from {}: {}", connection_id, e);
                        let response = Response {
                            id: request_id(&text),
                            outcome: Outcome::Error {
                                code: ErrorCode::InvalidRequest,
                                message: format!("Error: Invalid request: {}", e),
                            },
                        };
                        if resp_tx.send(response).await.is_err() {
                            break;
                        }
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", connection_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong is handled automatically by tungstenite
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }

            // Reap finished calls so the set does not grow without bound
            while calls.try_join_next().is_some() {}
        }

        debug!(
            "Read task ended for {}, aborting {} outstanding calls",
            connection_id,
            calls.len()
        );
        calls.shutdown().await;
    });

    // Spawn write task (Response -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(response) = resp_rx.recv().await {
            match serde_json::to_string(&response) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", connection_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", connection_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", connection_id);
            read_task.abort();
        }
    }

    // Sessions do not outlive the connection that minted them
    let tokens = std::mem::take(&mut *minted.lock().await);
    for token in tokens {
        match server.quit(token.as_str()).await {
            Ok(()) => debug!("Quit session {} on disconnect", token),
            Err(ChatError::UnknownToken) => {}
            Err(e) => warn!("Failed to quit session {}: {}", token, e),
        }
    }

    info!("Connection {} closed", connection_id);

    Ok(())
}

/// Run one call and queue its reply
async fn serve_call(
    server: ChatServer,
    request: Request,
    minted: Arc<Mutex<Vec<Token>>>,
    resp_tx: mpsc::Sender<Response>,
) {
    let outcome = match dispatch(&server, request.call, &minted).await {
        Ok(value) => Outcome::Ok { value },
        Err(e) => e.into(),
    };

    let _ = resp_tx
        .send(Response {
            id: request.id,
            outcome,
        })
        .await;
}

/// Route a call to the matching `ChatServer` operation
async fn dispatch(
    server: &ChatServer,
    call: Call,
    minted: &Mutex<Vec<Token>>,
) -> Result<Option<String>, ChatError> {
    match call {
        Call::Connect => {
            let token = server.connect().await?;
            minted.lock().await.push(token.clone());
            Ok(Some(token.as_str().to_string()))
        }
        Call::SendMessage { token, text } => server.send_message(&token, &text).await.map(|_| None),
        Call::CreateRoom { token, name } => server.create_room(&token, &name).await.map(|_| None),
        Call::ListRooms { token } => server.list_rooms(&token).await.map(|_| None),
        Call::JoinRoom { token, name } => server.join_room(&token, &name).await.map(|_| None),
        Call::LeaveRoom { token } => server.leave_room(&token).await.map(|_| None),
        Call::ChangeName { token, name } => server.change_name(&token, &name).await.map(|_| None),
        Call::Quit { token } => server.quit(&token).await.map(|_| None),
        Call::ReceiveMessage { token } => server.receive_message(&token).await.map(Some),
    }
}

/// Best-effort extraction of the `id` field from a malformed request
fn request_id(text: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("id")?.as_u64())
        .unwrap_or(0)
}
