//! Message protocol definitions
//!
//! JSON remote-call protocol carried in WebSocket text frames. Every
//! `Request` gets exactly one `Response` with the same `id`; responses to
//! concurrent calls on one connection may arrive in any order.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Client → Server call envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen correlation id, echoed in the response
    pub id: u64,
    pub call: Call,
}

/// A single remote call
///
/// Uses tagged enum with snake_case method names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Call {
    /// Obtain a session token
    Connect,
    /// Send a chat message to the current room
    SendMessage { token: String, text: String },
    /// Create a room
    CreateRoom { token: String, name: String },
    /// List all rooms
    ListRooms { token: String },
    /// Join a room, leaving the current one
    JoinRoom { token: String, name: String },
    /// Leave the current room
    LeaveRoom { token: String },
    /// Change display name
    ChangeName { token: String, name: String },
    /// End the session
    Quit { token: String },
    /// Long-poll for the next pending line
    ReceiveMessage { token: String },
}

impl Call {
    /// Method name used in logs
    pub fn method(&self) -> &'static str {
        match self {
            Call::Connect => "connect",
            Call::SendMessage { .. } => "send_message",
            Call::CreateRoom { .. } => "create_room",
            Call::ListRooms { .. } => "list_rooms",
            Call::JoinRoom { .. } => "join_room",
            Call::LeaveRoom { .. } => "leave_room",
            Call::ChangeName { .. } => "change_name",
            Call::Quit { .. } => "quit",
            Call::ReceiveMessage { .. } => "receive_message",
        }
    }
}

/// Server → Client reply envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered; 0 if it could not be parsed
    pub id: u64,
    pub outcome: Outcome,
}

/// Result of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Call succeeded; `value` carries the token or the received line
    Ok { value: Option<String> },
    /// Call failed; `message` is ready to show to the user
    Error { code: ErrorCode, message: String },
}

impl Outcome {
    pub fn ok() -> Self {
        Outcome::Ok { value: None }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Outcome::Ok {
            value: Some(value.into()),
        }
    }
}

/// Error codes for `Outcome::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownToken,
    DuplicateToken,
    UnknownRoom,
    DuplicateRoomName,
    CannotSendInLobby,
    ServerFull,
    /// Frame was not a valid request
    InvalidRequest,
}

/// Convert ChatError to Outcome for the caller
impl From<ChatError> for Outcome {
    fn from(err: ChatError) -> Self {
        let code = match err {
            ChatError::UnknownToken => ErrorCode::UnknownToken,
            ChatError::DuplicateToken => ErrorCode::DuplicateToken,
            ChatError::UnknownRoom => ErrorCode::UnknownRoom,
            ChatError::DuplicateRoomName => ErrorCode::DuplicateRoomName,
            ChatError::CannotSendInLobby => ErrorCode::CannotSendInLobby,
            ChatError::ServerFull => ErrorCode::ServerFull,
        };
        Outcome::Error {
            code,
            message: err.to_string(),
        }
    }
}
