//! Server configuration
//!
//! The bind address comes from the first command-line argument; room TTL
//! and the session cap come from environment variables.

use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default idle time before a room is deleted (one week)
pub const DEFAULT_ROOM_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Env var overriding the room TTL, in seconds
pub const ROOM_TTL_ENV: &str = "CHAT_ROOM_TTL_SECS";

/// Env var capping the number of concurrent sessions
pub const MAX_SESSIONS_ENV: &str = "CHAT_MAX_SESSIONS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Idle time after the last broadcast before a room is deleted
    pub room_ttl: Duration,
    /// `None` means unlimited
    pub max_sessions: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            room_ttl: DEFAULT_ROOM_TTL,
            max_sessions: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process arguments and environment
    pub fn load() -> Result<Self, AppError> {
        Self::from_sources(
            env::args().nth(1),
            env::var(ROOM_TTL_ENV).ok(),
            env::var(MAX_SESSIONS_ENV).ok(),
        )
    }

    /// Build a configuration from raw optional values
    pub fn from_sources(
        bind_addr: Option<String>,
        room_ttl_secs: Option<String>,
        max_sessions: Option<String>,
    ) -> Result<Self, AppError> {
        let defaults = Self::default();

        let room_ttl = match room_ttl_secs {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| AppError::Config(format!("{ROOM_TTL_ENV}={raw:?}: {e}")))?,
            None => defaults.room_ttl,
        };

        let max_sessions = match max_sessions {
            Some(raw) => Some(
                raw.trim()
                    .parse::<usize>()
                    .map_err(|e| AppError::Config(format!("{MAX_SESSIONS_ENV}={raw:?}: {e}")))?,
            ),
            None => defaults.max_sessions,
        };

        Ok(Self {
            bind_addr: bind_addr.unwrap_or(defaults.bind_addr),
            room_ttl,
            max_sessions,
        })
    }

    pub fn with_room_ttl(mut self, room_ttl: Duration) -> Self {
        self.room_ttl = room_ttl;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = Some(max_sessions);
        self
    }
}
