//! Multi-room WebSocket Chat Server Library
//!
//! Clients obtain a session token, create or join named rooms, and
//! exchange text lines broadcast to everyone in the same room. Pending
//! lines are collected per session and handed out by a long-poll call.
//!
//! # Features
//! - Token-identified sessions with display names
//! - Named rooms with full history replay on join
//! - Idle rooms delete themselves after a configurable TTL
//! - Long-poll delivery of each session's pending lines
//!
//! # Architecture
//! - `ChatServer` owns two registries (sessions, rooms), each behind a
//!   single `RwLock`
//! - Each room is an actor: one task owns its membership and history and
//!   applies joins, leaves, broadcasts and expiry checks in order
//! - Each session owns an unbounded outbox that the room actors push into
//! - `handle_connection` is a thin dispatcher from JSON calls over
//!   WebSocket to `ChatServer` operations
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_rooms::{handle_connection, ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let server = ChatServer::new(ServerConfig::default());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, server.clone()));
//!     }
//! }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod notice;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::RpcClient;
pub use commands::{Command, CommandError};
pub use config::ServerConfig;
pub use error::{AppError, ChatError};
pub use handler::handle_connection;
pub use message::{Call, ErrorCode, Outcome, Request, Response};
pub use registry::{RoomRegistry, SessionRegistry};
pub use room::{RoomActor, RoomEvent, RoomHandle};
pub use server::ChatServer;
pub use session::{Outbox, Session};
pub use types::{ConnectionId, Token};
