//! Room actor implementation
//!
//! Each room is a tokio task that owns the room's membership, history and
//! expiry deadline. Everything else talks to it through a `RoomHandle`,
//! which queues `RoomEvent`s on the actor's mailbox. Events are applied
//! one at a time in arrival order, so no lock guards room state.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::notice;
use crate::registry::RoomRegistry;
use crate::session::Session;
use crate::types::Token;

/// Mailbox buffer size for each room actor
pub const ROOM_MAILBOX_SIZE: usize = 256;

/// Events sent from handles to a room actor
#[derive(Debug)]
pub enum RoomEvent {
    /// Admit a session, replaying history to it
    Join {
        session: Arc<Session>,
        respond_to: oneshot::Sender<()>,
    },
    /// Remove a session; replies whether it was a member
    Leave {
        session: Arc<Session>,
        respond_to: oneshot::Sender<bool>,
    },
    /// Append a line to history and deliver it to every member
    Broadcast { line: String },
    /// Delete the room if its deadline has passed
    ExpiryCheck,
    /// Snapshot of member tokens in membership order
    Members {
        respond_to: oneshot::Sender<Vec<Token>>,
    },
    /// Number of lines in history
    HistoryLen { respond_to: oneshot::Sender<usize> },
}

/// Handle for a running room
///
/// The room registry holds the owning `Arc`; sessions hold `Weak`
/// references. Every method fails with `UnknownRoom` once the actor has
/// stopped, which only happens when the room expires.
#[derive(Debug)]
pub struct RoomHandle {
    name: String,
    sender: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    /// Create a handle and its actor without starting the actor
    ///
    /// Lets a caller register the handle first and only spawn the actor
    /// once the name is known to be free.
    pub fn new(name: String, ttl: Duration, rooms: RoomRegistry) -> (Arc<Self>, RoomActor) {
        let (sender, receiver) = mpsc::channel(ROOM_MAILBOX_SIZE);
        let handle = Arc::new(Self {
            name: name.clone(),
            sender,
        });
        let actor = RoomActor {
            name,
            handle: Arc::downgrade(&handle),
            receiver,
            members: Vec::new(),
            history: Vec::new(),
            ttl,
            expires_at: Instant::now() + ttl,
            rooms,
        };
        (handle, actor)
    }

    /// Create a handle and spawn its actor on the current runtime
    pub fn spawn(name: String, ttl: Duration, rooms: RoomRegistry) -> Arc<Self> {
        let (handle, actor) = Self::new(name, ttl, rooms);
        tokio::spawn(actor.run());
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admit `session`; resolves once it is a member
    pub async fn join(&self, session: Arc<Session>) -> Result<(), ChatError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomEvent::Join {
            session,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ChatError::UnknownRoom)
    }

    /// Remove `session`; returns false if it was not a member
    pub async fn leave(&self, session: Arc<Session>) -> Result<bool, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomEvent::Leave {
            session,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ChatError::UnknownRoom)
    }

    /// Queue a line for delivery to every member
    pub async fn broadcast(&self, line: String) -> Result<(), ChatError> {
        self.send(RoomEvent::Broadcast { line }).await
    }

    /// Queue an immediate expiry check
    pub async fn check_expiry(&self) -> Result<(), ChatError> {
        self.send(RoomEvent::ExpiryCheck).await
    }

    pub async fn members(&self) -> Result<Vec<Token>, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomEvent::Members { respond_to: tx }).await?;
        rx.await.map_err(|_| ChatError::UnknownRoom)
    }

    pub async fn history_len(&self) -> Result<usize, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomEvent::HistoryLen { respond_to: tx }).await?;
        rx.await.map_err(|_| ChatError::UnknownRoom)
    }

    /// Resolves once the actor has stopped
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, event: RoomEvent) -> Result<(), ChatError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ChatError::UnknownRoom)
    }
}

/// The room actor
///
/// Sole mutator of `members`, `history` and `expires_at`.
pub struct RoomActor {
    name: String,
    /// Self reference handed to sessions as their current room
    handle: Weak<RoomHandle>,
    receiver: mpsc::Receiver<RoomEvent>,
    /// Insertion order, no duplicates. Dropped sessions are pruned on
    /// the next broadcast.
    members: Vec<Weak<Session>>,
    history: Vec<String>,
    ttl: Duration,
    expires_at: Instant,
    rooms: RoomRegistry,
}

impl RoomActor {
    /// Run the room event loop
    ///
    /// A single deadline timer is re-armed from `expires_at` on every
    /// iteration; when it fires it is handled as an `ExpiryCheck`. Returns
    /// after the room has deleted itself, or once every handle is gone.
    pub async fn run(mut self) {
        info!("Room '{}' started (ttl {:?})", self.name, self.ttl);

        loop {
            let event = tokio::select! {
                biased;
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = sleep_until(self.expires_at) => RoomEvent::ExpiryCheck,
            };

            if self.handle_event(event).await.is_break() {
                break;
            }
        }

        info!("Room '{}' stopped", self.name);
    }

    /// Process a single event
    async fn handle_event(&mut self, event: RoomEvent) -> ControlFlow<()> {
        match event {
            RoomEvent::Join {
                session,
                respond_to,
            } => {
                self.handle_join(session).await;
                let _ = respond_to.send(());
            }
            RoomEvent::Leave {
                session,
                respond_to,
            } => {
                let was_member = self.handle_leave(session).await;
                let _ = respond_to.send(was_member);
            }
            RoomEvent::Broadcast { line } => {
                self.broadcast(line);
            }
            RoomEvent::ExpiryCheck => {
                return self.handle_expiry_check().await;
            }
            RoomEvent::Members { respond_to } => {
                let tokens = self
                    .members
                    .iter()
                    .filter_map(Weak::upgrade)
                    .map(|session| session.token().clone())
                    .collect();
                let _ = respond_to.send(tokens);
            }
            RoomEvent::HistoryLen { respond_to } => {
                let _ = respond_to.send(self.history.len());
            }
        }
        ControlFlow::Continue(())
    }

    /// Announce, replay history, then admit
    ///
    /// The notice goes out before the joiner is a member, so the joiner
    /// sees it exactly once: as the last line of the replay. A session
    /// that has already quit is refused without a notice.
    async fn handle_join(&mut self, session: Arc<Session>) {
        if self.position_of(&session).is_some() {
            debug!("Room '{}': {} already a member", self.name, session.token());
            return;
        }
        if !session.enter_room(self.handle.clone()).await {
            debug!("Room '{}': {} has quit", self.name, session.token());
            return;
        }

        let display_name = session.display_name().await;
        self.broadcast(notice::joined(&display_name));

        for line in &self.history {
            session.send(line.clone());
        }
        self.members.push(Arc::downgrade(&session));

        info!("Session {} joined room '{}'", session.token(), self.name);
    }

    /// Announce, then remove. A non-member is ignored.
    async fn handle_leave(&mut self, session: Arc<Session>) -> bool {
        if self.position_of(&session).is_none() {
            debug!("Room '{}': {} is not a member", self.name, session.token());
            return false;
        }

        let display_name = session.display_name().await;
        self.broadcast(notice::left(&display_name));

        if let Some(index) = self.position_of(&session) {
            self.members.remove(index);
        }
        session.exit_room(&self.handle).await;

        info!("Session {} left room '{}'", session.token(), self.name);
        true
    }

    /// Push the deadline out, record the line, deliver it to every member
    fn broadcast(&mut self, line: String) {
        self.expires_at = Instant::now() + self.ttl;
        debug!("Room '{}' broadcast: {}", self.name, line);

        self.members.retain(|member| member.strong_count() > 0);
        for member in self.members.iter().filter_map(Weak::upgrade) {
            member.send(line.clone());
        }
        self.history.push(line);
    }

    async fn handle_expiry_check(&mut self) -> ControlFlow<()> {
        if self.expires_at > Instant::now() {
            debug!("Room '{}' still active, next check at deadline", self.name);
            return ControlFlow::Continue(());
        }

        info!("Room '{}' expired, deleting", self.name);
        self.broadcast(notice::ROOM_DELETED.to_string());

        for member in self.members.drain(..).filter_map(|member| member.upgrade()) {
            member.exit_room(&self.handle).await;
        }

        if let Err(e) = self.rooms.remove_exact(&self.name, &self.handle).await {
            warn!("Room '{}' was not registered at deletion: {}", self.name, e);
        }

        // Pending joins and leaves see their responders dropped
        self.receiver.close();
        ControlFlow::Break(())
    }

    fn position_of(&self, session: &Arc<Session>) -> Option<usize> {
        self.members
            .iter()
            .position(|member| std::ptr::eq(member.as_ptr(), Arc::as_ptr(session)))
    }
}
