//! ChatServer implementation
//!
//! Owns the session and room registries and exposes the operations a
//! dispatcher calls on behalf of remote callers. Registry mutations
//! happen here directly; anything that touches a room's membership or
//! history is handed to that room's actor.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::notice;
use crate::registry::{RoomRegistry, SessionRegistry};
use crate::room::RoomHandle;
use crate::session::Session;
use crate::types::Token;

/// The chat server context
///
/// Cheap to clone; every clone shares the same registries. Each instance
/// is fully independent of any other.
#[derive(Debug, Clone)]
pub struct ChatServer {
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    config: Arc<ServerConfig>,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            rooms: RoomRegistry::new(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Mint a token, register a lobby session for it and greet it
    pub async fn connect(&self) -> Result<Token, ChatError> {
        let token = Token::generate();
        let session = Arc::new(Session::new(token.clone()));

        self.sessions
            .add_bounded(session.clone(), self.config.max_sessions)
            .await?;
        session.send(notice::WELCOME);

        info!("Session {} connected", token);
        Ok(token)
    }

    /// Broadcast a stamped chat line to the caller's room
    ///
    /// From the lobby, the caller gets an error line instead; the call
    /// itself still succeeds.
    pub async fn send_message(&self, token: &str, text: &str) -> Result<(), ChatError> {
        let session = self.sessions.get(token).await?;
        let _calls = session.lock_calls().await;

        let Some(room) = session.current_room().await else {
            session.send(ChatError::CannotSendInLobby.to_string());
            return Ok(());
        };

        let text = text.trim_end_matches(['\r', '\n']);
        let line = notice::chat_line(&session.display_name().await, text);
        if room.broadcast(line).await.is_err() {
            // Room expired after we read it
            session.send(ChatError::CannotSendInLobby.to_string());
        }
        Ok(())
    }

    /// Create and register a room, then start its actor
    pub async fn create_room(&self, token: &str, name: &str) -> Result<(), ChatError> {
        let session = self.sessions.get(token).await?;

        let (room, actor) =
            RoomHandle::new(name.to_string(), self.config.room_ttl, self.rooms.clone());
        if let Err(e) = self.rooms.add(room).await {
            session.send(e.to_string());
            return Err(e);
        }
        tokio::spawn(actor.run());

        info!("Session {} created room '{}'", session.token(), name);
        session.send(notice::room_created(name));
        Ok(())
    }

    /// Enqueue a listing of every room to the caller
    pub async fn list_rooms(&self, token: &str) -> Result<Vec<String>, ChatError> {
        let session = self.sessions.get(token).await?;
        let names = self.rooms.list_names().await;
        session.send(notice::room_list(&names));
        Ok(names)
    }

    /// Move the caller into `name`, leaving its current room first
    ///
    /// Holds the session's call lock throughout, so concurrent joins for
    /// one token take turns and the last one wins.
    pub async fn join_room(&self, token: &str, name: &str) -> Result<(), ChatError> {
        let session = self.sessions.get(token).await?;
        let _calls = session.lock_calls().await;

        let room = match self.rooms.get(name).await {
            Ok(room) => room,
            Err(e) => {
                session.send(e.to_string());
                return Err(e);
            }
        };

        if let Some(current) = session.current_room().await {
            if current.leave(session.clone()).await.is_err() {
                debug!(
                    "Room '{}' expired before {} could leave",
                    current.name(),
                    session.token()
                );
            }
        }

        if let Err(e) = room.join(session.clone()).await {
            session.send(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Return the caller to the lobby; a no-op if already there
    pub async fn leave_room(&self, token: &str) -> Result<(), ChatError> {
        let session = self.sessions.get(token).await?;
        let _calls = session.lock_calls().await;

        match session.current_room().await {
            Some(room) => {
                if room.leave(session.clone()).await.is_err() {
                    debug!(
                        "Room '{}' expired before {} could leave",
                        room.name(),
                        session.token()
                    );
                }
            }
            None => debug!("Session {} asked to leave the lobby", session.token()),
        }
        Ok(())
    }

    /// Rename the caller; only the caller is told
    pub async fn change_name(&self, token: &str, name: &str) -> Result<(), ChatError> {
        let session = self.sessions.get(token).await?;
        let _calls = session.lock_calls().await;
        session.set_display_name(name.to_string()).await;
        session.send(notice::name_changed(name));
        debug!("Session {} is now '{}'", session.token(), name);
        Ok(())
    }

    /// Unregister the caller, close its outbox and leave its room
    ///
    /// Waits for any call already running on the session. A join queued
    /// by a call that was cancelled instead is refused by the room.
    pub async fn quit(&self, token: &str) -> Result<(), ChatError> {
        let session = self.sessions.remove(token).await?;
        let _calls = session.lock_calls().await;

        if let Some(room) = session.retire().await {
            if room.leave(session.clone()).await.is_err() {
                debug!(
                    "Room '{}' expired before {} could leave",
                    room.name(),
                    session.token()
                );
            }
        }

        info!("Session {} quit", session.token());
        Ok(())
    }

    /// Long-poll: wait for the caller's oldest pending line
    ///
    /// No registry lock is held while waiting. Fails with `UnknownToken`
    /// if the session quits while the poll is pending.
    pub async fn receive_message(&self, token: &str) -> Result<String, ChatError> {
        let session = self.sessions.get(token).await?;
        session.outbox().pop().await.ok_or(ChatError::UnknownToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn server() -> ChatServer {
        ChatServer::new(ServerConfig::default())
    }

    async fn session(server: &ChatServer, token: &Token) -> Arc<Session> {
        server.sessions().get(token.as_str()).await.unwrap()
    }

    fn drain(session: &Arc<Session>) -> Vec<String> {
        std::iter::from_fn(|| session.outbox().try_pop()).collect()
    }

    async fn connect_named(server: &ChatServer, name: &str) -> Token {
        let token = server.connect().await.unwrap();
        server.change_name(token.as_str(), name).await.unwrap();
        let session = session(server, &token).await;
        drain(&session);
        token
    }

    #[tokio::test]
    async fn test_connect_greets_session() {
        let server = server();
        let token = server.connect().await.unwrap();

        assert_eq!(server.receive_message(token.as_str()).await.unwrap(), notice::WELCOME);
        assert_eq!(session(&server, &token).await.display_name().await, "Anonymous");
    }

    #[tokio::test]
    async fn test_lobby_to_room_scenario() {
        let server = server();
        let t1 = server.connect().await.unwrap();
        let t1 = t1.as_str();
        assert_eq!(server.receive_message(t1).await.unwrap(), notice::WELCOME);

        server.create_room(t1, "lobby2").await.unwrap();
        assert_eq!(
            server.receive_message(t1).await.unwrap(),
            notice::room_created("lobby2")
        );

        server.send_message(t1, "hi").await.unwrap();
        assert_eq!(
            server.receive_message(t1).await.unwrap(),
            "Error: You cannot send messages in the lobby."
        );
        let room = server.rooms().get("lobby2").await.unwrap();
        assert_eq!(room.history_len().await.unwrap(), 0);

        server.join_room(t1, "lobby2").await.unwrap();
        // Empty prior history: only the caller's own join notice comes back
        assert_eq!(
            server.receive_message(t1).await.unwrap(),
            notice::joined("Anonymous")
        );

        server.send_message(t1, "hi\n").await.unwrap();
        let line = server.receive_message(t1).await.unwrap();
        assert!(line.ends_with(" - Anonymous: hi"), "{line}");
        assert_eq!(room.history_len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_creator_can_join_own_room() {
        let server = server();
        let token = connect_named(&server, "Alice").await;

        server.create_room(token.as_str(), "foo").await.unwrap();
        server.join_room(token.as_str(), "foo").await.unwrap();

        let room = server.rooms().get("foo").await.unwrap();
        assert_eq!(room.members().await.unwrap(), vec![token.clone()]);
        let current = session(&server, &token).await.current_room().await.unwrap();
        assert_eq!(current.name(), "foo");
    }

    #[tokio::test]
    async fn test_list_rooms_is_stable() {
        let server = server();
        let token = connect_named(&server, "Alice").await;
        server.create_room(token.as_str(), "b").await.unwrap();
        server.create_room(token.as_str(), "a").await.unwrap();

        let first: HashSet<_> = server
            .list_rooms(token.as_str())
            .await
            .unwrap()
            .into_iter()
            .collect();
        let second: HashSet<_> = server
            .list_rooms(token.as_str())
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let lines = drain(&session(&server, &token).await);
        assert_eq!(lines.last().unwrap(), "ChatRooms:\na\nb");
    }

    #[tokio::test]
    async fn test_duplicate_room_is_reported_and_returned() {
        let server = server();
        let token = connect_named(&server, "Alice").await;
        server.create_room(token.as_str(), "foo").await.unwrap();

        let result = server.create_room(token.as_str(), "foo").await;
        assert_eq!(result.unwrap_err(), ChatError::DuplicateRoomName);

        let lines = drain(&session(&server, &token).await);
        assert_eq!(
            lines,
            vec![
                notice::room_created("foo"),
                "Error: A chat room with that name already exists.".to_string(),
            ]
        );
        assert_eq!(server.rooms().len().await, 1);
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_reported_and_returned() {
        let server = server();
        let token = connect_named(&server, "Alice").await;

        let result = server.join_room(token.as_str(), "nowhere").await;
        assert_eq!(result.unwrap_err(), ChatError::UnknownRoom);
        assert_eq!(
            drain(&session(&server, &token).await),
            vec!["Error: A chat room with that name does not exist.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_join_switches_rooms() {
        let server = server();
        let alice = connect_named(&server, "Alice").await;
        let bob = connect_named(&server, "Bob").await;
        server.create_room(alice.as_str(), "one").await.unwrap();
        server.create_room(alice.as_str(), "two").await.unwrap();

        server.join_room(alice.as_str(), "one").await.unwrap();
        server.join_room(bob.as_str(), "one").await.unwrap();
        let alice_session = session(&server, &alice).await;
        drain(&alice_session);

        server.join_room(bob.as_str(), "two").await.unwrap();

        let one = server.rooms().get("one").await.unwrap();
        let two = server.rooms().get("two").await.unwrap();
        assert_eq!(one.members().await.unwrap(), vec![alice.clone()]);
        assert_eq!(two.members().await.unwrap(), vec![bob.clone()]);
        assert_eq!(drain(&alice_session), vec![notice::left("Bob")]);

        let bob_room = session(&server, &bob).await.current_room().await.unwrap();
        assert_eq!(bob_room.name(), "two");
    }

    #[tokio::test]
    async fn test_leave_room_and_lobby_noop() {
        let server = server();
        let token = connect_named(&server, "Alice").await;
        server.create_room(token.as_str(), "foo").await.unwrap();
        server.join_room(token.as_str(), "foo").await.unwrap();

        server.leave_room(token.as_str()).await.unwrap();
        let alice = session(&server, &token).await;
        assert!(alice.current_room().await.is_none());
        drain(&alice);

        server.leave_room(token.as_str()).await.unwrap();
        assert!(drain(&alice).is_empty());
    }

    #[tokio::test]
    async fn test_quit_leaves_room_and_wakes_poller() {
        let server = server();
        let alice = connect_named(&server, "Alice").await;
        let bob = connect_named(&server, "Bob").await;
        server.create_room(alice.as_str(), "foo").await.unwrap();
        server.join_room(alice.as_str(), "foo").await.unwrap();
        server.join_room(bob.as_str(), "foo").await.unwrap();
        drain(&session(&server, &alice).await);
        drain(&session(&server, &bob).await);

        let poller = {
            let server = server.clone();
            let bob = bob.clone();
            tokio::spawn(async move {
                // Keeps polling until the session is gone
                loop {
                    if let Err(e) = server.receive_message(bob.as_str()).await {
                        return e;
                    }
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!poller.is_finished());

        server.quit(bob.as_str()).await.unwrap();

        assert_eq!(poller.await.unwrap(), ChatError::UnknownToken);
        assert_eq!(
            server.receive_message(alice.as_str()).await.unwrap(),
            notice::left("Bob")
        );
        let room = server.rooms().get("foo").await.unwrap();
        assert_eq!(room.members().await.unwrap(), vec![alice.clone()]);
        assert_eq!(server.quit(bob.as_str()).await.unwrap_err(), ChatError::UnknownToken);
    }

    #[tokio::test]
    async fn test_change_name_confirms_only_to_caller() {
        let server = server();
        let alice = connect_named(&server, "Alice").await;
        let bob = connect_named(&server, "Bob").await;
        server.create_room(alice.as_str(), "foo").await.unwrap();
        server.join_room(alice.as_str(), "foo").await.unwrap();
        server.join_room(bob.as_str(), "foo").await.unwrap();
        let alice_session = session(&server, &alice).await;
        let bob_session = session(&server, &bob).await;
        drain(&alice_session);
        drain(&bob_session);

        server.change_name(bob.as_str(), "Robert").await.unwrap();

        assert_eq!(drain(&bob_session), vec![notice::name_changed("Robert")]);
        assert!(drain(&alice_session).is_empty());
        assert_eq!(bob_session.display_name().await, "Robert");
    }

    #[tokio::test]
    async fn test_unknown_token_rejected_everywhere() {
        let server = server();
        let t = "not-a-token";
        assert_eq!(server.send_message(t, "hi").await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.create_room(t, "foo").await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.list_rooms(t).await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.join_room(t, "foo").await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.leave_room(t).await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.change_name(t, "x").await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.quit(t).await.unwrap_err(), ChatError::UnknownToken);
        assert_eq!(server.receive_message(t).await.unwrap_err(), ChatError::UnknownToken);
        assert!(server.rooms().is_empty().await);
    }

    #[tokio::test]
    async fn test_session_cap() {
        let server = ChatServer::new(ServerConfig::default().with_max_sessions(1));
        server.connect().await.unwrap();
        assert_eq!(server.connect().await.unwrap_err(), ChatError::ServerFull);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_room_is_removed() {
        let server = ChatServer::new(ServerConfig::default().with_room_ttl(Duration::ZERO));
        let token = connect_named(&server, "Alice").await;
        server.create_room(token.as_str(), "flash").await.unwrap();

        if let Ok(room) = server.rooms().get("flash").await {
            room.closed().await;
        }
        assert!(server.rooms().is_empty().await);
        assert!(server.list_rooms(token.as_str()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_evicts_members() {
        let config = ServerConfig::default().with_room_ttl(Duration::from_secs(60));
        let server = ChatServer::new(config);
        let alice = connect_named(&server, "Alice").await;
        let bob = connect_named(&server, "Bob").await;
        server.create_room(alice.as_str(), "foo").await.unwrap();
        server.join_room(alice.as_str(), "foo").await.unwrap();
        server.join_room(bob.as_str(), "foo").await.unwrap();

        let room = server.rooms().get("foo").await.unwrap();
        room.closed().await;

        for token in [&alice, &bob] {
            let session = session(&server, token).await;
            assert!(session.current_room().await.is_none());
            assert_eq!(drain(&session).last().unwrap(), notice::ROOM_DELETED);
        }
        assert!(server.rooms().is_empty().await);

        server.send_message(alice.as_str(), "anyone?").await.unwrap();
        assert_eq!(
            server.receive_message(alice.as_str()).await.unwrap(),
            "Error: You cannot send messages in the lobby."
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_all_land_once() {
        const N: usize = 32;
        let server = server();
        let host = connect_named(&server, "Host").await;
        server.create_room(host.as_str(), "party").await.unwrap();

        let mut tokens = Vec::with_capacity(N);
        for i in 0..N {
            tokens.push(connect_named(&server, &format!("guest-{i}")).await);
        }

        let joins: Vec<_> = tokens
            .iter()
            .cloned()
            .map(|token| {
                let server = server.clone();
                tokio::spawn(async move { server.join_room(token.as_str(), "party").await })
            })
            .collect();
        for join in joins {
            join.await.unwrap().unwrap();
        }

        let room = server.rooms().get("party").await.unwrap();
        let members = room.members().await.unwrap();
        assert_eq!(members.len(), N);
        let unique: HashSet<_> = members.iter().collect();
        assert_eq!(unique.len(), N);
        for token in &tokens {
            assert!(unique.contains(token));
            let current = session(&server, token).await.current_room().await.unwrap();
            assert!(Arc::ptr_eq(&current, &room));
        }
        // One join notice per guest
        assert_eq!(room.history_len().await.unwrap(), N);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_token_joins_land_in_one_room() {
        let server = server();
        let token = connect_named(&server, "Alice").await;
        server.create_room(token.as_str(), "a").await.unwrap();
        server.create_room(token.as_str(), "b").await.unwrap();
        let a = server.rooms().get("a").await.unwrap();
        let b = server.rooms().get("b").await.unwrap();
        let alice = session(&server, &token).await;

        for _ in 0..200 {
            let joins: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|name| {
                    let server = server.clone();
                    let token = token.clone();
                    tokio::spawn(async move { server.join_room(token.as_str(), name).await })
                })
                .collect();
            for join in joins {
                join.await.unwrap().unwrap();
            }

            let in_a = a.members().await.unwrap().len();
            let in_b = b.members().await.unwrap().len();
            assert_eq!(in_a + in_b, 1);
            let holder = if in_a == 1 { &a } else { &b };
            let current = alice.current_room().await.unwrap();
            assert!(Arc::ptr_eq(&current, holder));
            drain(&alice);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_quit_racing_join_leaves_no_member() {
        let server = server();
        let host = connect_named(&server, "Host").await;
        server.create_room(host.as_str(), "foo").await.unwrap();
        let room = server.rooms().get("foo").await.unwrap();

        for _ in 0..100 {
            let token = server.connect().await.unwrap();
            let join = {
                let server = server.clone();
                let token = token.clone();
                tokio::spawn(async move { server.join_room(token.as_str(), "foo").await })
            };
            let quit = {
                let server = server.clone();
                let token = token.clone();
                tokio::spawn(async move { server.quit(token.as_str()).await })
            };

            quit.await.unwrap().unwrap();
            // Either admitted and then left, refused, or never found
            if let Err(e) = join.await.unwrap() {
                assert_eq!(e, ChatError::UnknownToken);
            }
            assert!(room.members().await.unwrap().is_empty());
        }
        assert_eq!(server.sessions().len().await, 1);
    }
}
