//! Error types for the chat server
//!
//! `ChatError` is what the room/session core reports to its callers; its
//! `Display` output is the literal line shown to the user. `AppError`
//! covers the transport and startup failures around the core.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Core failure kinds
///
/// Registry lookups (`UnknownToken`, `DuplicateToken`) are always
/// propagated. Room-content errors are also enqueued to the acting
/// session's outbox by the operation that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// No session is registered under the given token
    #[error("Error: No client exists with that token.")]
    UnknownToken,

    /// A freshly minted token collided with a registered one
    #[error("Error: A client with that token already exists.")]
    DuplicateToken,

    /// No room is registered under the given name
    #[error("Error: A chat room with that name does not exist.")]
    UnknownRoom,

    /// A room with the given name is already registered
    #[error("Error: A chat room with that name already exists.")]
    DuplicateRoomName,

    /// The session tried to send a message while in the lobby
    #[error("Error: You cannot send messages in the lobby.")]
    CannotSendInLobby,

    /// The configured session cap has been reached
    #[error("Error: Server is full. Please try reconnecting later.")]
    ServerFull,
}

/// Application-level errors
///
/// Fatal to a connection or to server startup.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A core call failed where the caller cannot recover
    #[error(transparent)]
    Chat(#[from] ChatError),
}
