//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `Token`: 64-character random session credential
//! - `ConnectionId`: UUID-based identifier for one WebSocket connection

use std::borrow::Borrow;

use uuid::Uuid;

/// Length of a minted session token
pub const TOKEN_LENGTH: usize = 64;

/// Opaque session credential (newtype pattern)
///
/// Minted server-side on Connect and used as the only caller identity
/// for every later call. Implements `Borrow<str>` so registries keyed by
/// `Token` can be queried with the raw string a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Generate a new random token from the thread-local CSPRNG
    pub fn generate() -> Self {
        use rand::Rng;
        let token: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Wrap an existing token string without validation
    pub fn from_string(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Token {
    /// Only a short prefix is shown so logs never carry a usable credential.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{}…", prefix)
    }
}

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4; used to tag log lines for one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_token_length() {
        let token = Token::generate();
        assert_eq!(token.as_str().len(), TOKEN_LENGTH);
        assert!(token.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_token_unique() {
        assert_ne!(Token::generate(), Token::generate());
    }

    #[test]
    fn test_token_lookup_by_str() {
        let token = Token::generate();
        let mut map = HashMap::new();
        map.insert(token.clone(), 1);
        assert_eq!(map.get(token.as_str()), Some(&1));
    }

    #[test]
    fn test_token_display_is_truncated() {
        let token = Token::from_string("abcdefghijklmnop".to_string());
        assert_eq!(token.to_string(), "abcdefgh…");
    }

    #[test]
    fn test_connection_id_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
