//! Session and room registries
//!
//! Process-wide lookup tables, each behind its own reader/writer lock.
//! Lock scopes are short: acquire, read or mutate the map, release. No
//! method holds a lock across an await on anything else, and no caller
//! holds both registry locks at once.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ChatError;
use crate::room::RoomHandle;
use crate::session::Session;
use crate::types::Token;

/// Token -> Session
///
/// The registry is the sole owner of every session. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Token, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    ///
    /// Fails with `DuplicateToken` if the token is already registered.
    pub async fn add(&self, session: Arc<Session>) -> Result<(), ChatError> {
        self.add_bounded(session, None).await
    }

    /// Register a session unless `limit` sessions already exist
    pub async fn add_bounded(
        &self,
        session: Arc<Session>,
        limit: Option<usize>,
    ) -> Result<(), ChatError> {
        let mut sessions = self.sessions.write().await;
        if limit.is_some_and(|limit| sessions.len() >= limit) {
            return Err(ChatError::ServerFull);
        }
        if sessions.contains_key(session.token()) {
            return Err(ChatError::DuplicateToken);
        }
        sessions.insert(session.token().clone(), session);
        debug!("Total sessions: {}", sessions.len());
        Ok(())
    }

    pub async fn get(&self, token: &str) -> Result<Arc<Session>, ChatError> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(ChatError::UnknownToken)
    }

    /// Unregister a session, handing back the last owning reference
    pub async fn remove(&self, token: &str) -> Result<Arc<Session>, ChatError> {
        self.sessions
            .write()
            .await
            .remove(token)
            .ok_or(ChatError::UnknownToken)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Room name -> Room
///
/// Holds the only strong references to room handles; once a room is
/// removed here its actor's mailbox closes as soon as in-flight callers
/// drop their clones.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, Arc<RoomHandle>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a room
    ///
    /// Fails with `DuplicateRoomName` if the name is taken.
    pub async fn add(&self, room: Arc<RoomHandle>) -> Result<(), ChatError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room.name()) {
            return Err(ChatError::DuplicateRoomName);
        }
        rooms.insert(room.name().to_string(), room);
        debug!("Total rooms: {}", rooms.len());
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Arc<RoomHandle>, ChatError> {
        self.rooms
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or(ChatError::UnknownRoom)
    }

    /// Snapshot of the current room names, sorted
    pub async fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn remove(&self, name: &str) -> Result<Arc<RoomHandle>, ChatError> {
        self.rooms
            .write()
            .await
            .remove(name)
            .ok_or(ChatError::UnknownRoom)
    }

    /// Remove `name` only while it still maps to `room`
    pub(crate) async fn remove_exact(
        &self,
        name: &str,
        room: &Weak<RoomHandle>,
    ) -> Result<Arc<RoomHandle>, ChatError> {
        let mut rooms = self.rooms.write().await;
        match rooms.get(name) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), room.as_ptr()) => {
                rooms.remove(name).ok_or(ChatError::UnknownRoom)
            }
            _ => Err(ChatError::UnknownRoom),
        }
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
