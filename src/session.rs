//! Session and outbox definitions
//!
//! A `Session` is one connected caller: its token, display name, current
//! room and the queue of lines waiting to be long-polled.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

use crate::room::RoomHandle;
use crate::types::Token;

/// Display name given to every new session
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Per-session FIFO of outbound lines
///
/// Unbounded: pushing never blocks, so a room actor can fan out to every
/// member without waiting on slow pollers. A session that stops polling
/// simply accumulates lines until it quits.
#[derive(Debug)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
}

impl Outbox {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            closed: CancellationToken::new(),
        }
    }

    /// Enqueue a line
    ///
    /// Returns false if the outbox has been closed.
    pub fn push(&self, line: impl Into<String>) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.sender.send(line.into()).is_ok()
    }

    /// Wait for the oldest line and remove it
    ///
    /// Returns `None` once the outbox is closed, waking any pending poller.
    pub async fn pop(&self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            line = async { self.receiver.lock().await.recv().await } => line,
        }
    }

    /// Remove the oldest line without waiting
    ///
    /// Returns `None` if the queue is empty or another caller is polling.
    pub fn try_pop(&self) -> Option<String> {
        let mut receiver = self.receiver.try_lock().ok()?;
        receiver.try_recv().ok()
    }

    /// Close the outbox; later pushes are dropped and polls return `None`
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct SessionState {
    display_name: String,
    /// `None` means the session is in the lobby
    current_room: Option<Weak<RoomHandle>>,
    /// Set once by quit; no room may admit the session afterwards
    retired: bool,
}

/// Connected session
///
/// Owned by the session registry. Rooms hold only `Weak` references to
/// their members, and a session holds only a `Weak` reference to its room.
#[derive(Debug)]
pub struct Session {
    token: Token,
    state: RwLock<SessionState>,
    outbox: Outbox,
    /// Held for the whole of each mutating call, never by a long-poll
    calls: Mutex<()>,
}

impl Session {
    /// Create a new lobby session with the default display name
    pub fn new(token: Token) -> Self {
        Self {
            token,
            state: RwLock::new(SessionState {
                display_name: DEFAULT_DISPLAY_NAME.to_string(),
                current_room: None,
                retired: false,
            }),
            outbox: Outbox::new(),
            calls: Mutex::new(()),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Enqueue a line onto this session's outbox
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.outbox.push(line)
    }

    pub async fn display_name(&self) -> String {
        self.state.read().await.display_name.clone()
    }

    pub async fn set_display_name(&self, name: String) {
        self.state.write().await.display_name = name;
    }

    /// The room this session is in, or `None` for the lobby
    ///
    /// A room that has already been dropped reads as the lobby.
    pub async fn current_room(&self) -> Option<Arc<RoomHandle>> {
        self.state
            .read()
            .await
            .current_room
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Serialize a mutating call against every other one on this session
    ///
    /// Two joins for the same token would otherwise both start from the
    /// lobby and land in two rooms.
    pub async fn lock_calls(&self) -> MutexGuard<'_, ()> {
        self.calls.lock().await
    }

    /// Point this session at `room`. Only called from that room's actor.
    ///
    /// Returns false, leaving the session untouched, once it has retired.
    pub(crate) async fn enter_room(&self, room: Weak<RoomHandle>) -> bool {
        let mut state = self.state.write().await;
        if state.retired {
            return false;
        }
        state.current_room = Some(room);
        true
    }

    /// Mark the session as gone and close its outbox
    ///
    /// Returns the room it still has to leave. Done under the state lock,
    /// so a join racing with quit either lands before (and is returned
    /// here) or is refused by `enter_room`.
    pub(crate) async fn retire(&self) -> Option<Arc<RoomHandle>> {
        let mut state = self.state.write().await;
        state.retired = true;
        self.outbox.close();
        state.current_room.as_ref().and_then(Weak::upgrade)
    }

    /// Return this session to the lobby if it is currently in `room`.
    /// Only called from that room's actor.
    pub(crate) async fn exit_room(&self, room: &Weak<RoomHandle>) {
        let mut state = self.state.write().await;
        if state
            .current_room
            .as_ref()
            .is_some_and(|current| current.ptr_eq(room))
        {
            state.current_room = None;
        }
    }
}
