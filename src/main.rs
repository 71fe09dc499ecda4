//! Multi-room WebSocket Chat Server - Entry Point
//!
//! Loads configuration, then accepts connections and hands each one to
//! the dispatcher.

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_rooms::{handle_connection, ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_rooms=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_rooms=info")),
        )
        .init();

    // Bind address from the first argument, TTL and session cap from env
    let config = ServerConfig::load()?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "Chat server listening on {} (room ttl {:?}, max sessions {:?})",
        config.bind_addr, config.room_ttl, config.max_sessions
    );

    let server = ChatServer::new(config);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let server = server.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, server).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
