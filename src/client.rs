//! Remote-call client
//!
//! Speaks the JSON call protocol over one WebSocket connection. Calls may
//! be issued concurrently from clones of the handle; replies are matched
//! back to callers by request id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::message::{Call, Outcome, Request, Response};

/// Buffer size for calls waiting to be written
const CALL_BUFFER_SIZE: usize = 32;

#[derive(Debug)]
struct PendingCall {
    request: Request,
    respond_to: oneshot::Sender<Outcome>,
}

/// Handle to a connection task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RpcClient {
    sender: mpsc::Sender<PendingCall>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Connect to a server at `addr` (`host:port`)
    pub async fn connect(addr: &str) -> Result<Self, AppError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr)).await?;
        debug!("Connected to {}", addr);

        let (sender, receiver) = mpsc::channel(CALL_BUFFER_SIZE);
        tokio::spawn(run_connection(ws_stream, receiver));

        Ok(Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Issue a call and wait for its outcome
    pub async fn call(&self, call: Call) -> Result<Outcome, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(PendingCall {
                request: Request { id, call },
                respond_to: tx,
            })
            .await
            .map_err(|_| AppError::ChannelSend)?;

        rx.await.map_err(|_| AppError::ChannelSend)
    }
}

/// Connection task: writes queued calls, routes replies by id
async fn run_connection(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut calls: mpsc::Receiver<PendingCall>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut pending: HashMap<u64, oneshot::Sender<Outcome>> = HashMap::new();

    loop {
        tokio::select! {
            call = calls.recv() => {
                let Some(PendingCall { request, respond_to }) = call else {
                    break;
                };
                let json = match serde_json::to_string(&request) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize request: {}", e);
                        continue;
                    }
                };
                pending.insert(request.id, respond_to);
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket send failed, ending connection task");
                    break;
                }
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Response>(&text) {
                    Ok(response) => {
                        if let Some(respond_to) = pending.remove(&response.id) {
                            let _ = respond_to.send(response.outcome);
                        }
                    }
                    Err(e) => warn!("Invalid response from server: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    // Dropping `pending` fails every outstanding call
    let _ = ws_sender.close().await;
}
