//! Console slash-commands
//!
//! Turns a line typed at the console client into a `Command`, and a
//! `Command` into the remote `Call` it stands for.

use thiserror::Error;

use crate::message::Call;

/// Printed locally for `/help`
pub const HELP: &str = "\nCommands:\n\
/create foo - creates a chat room named foo\n\
/list - lists all chat rooms\n\
/join foo - joins a chat room named foo\n\
/leave - leaves the current chat room\n\
/help - lists all commands\n\
/name foo - changes your name to foo\n\
/quit - quits the program\n";

/// One line of console input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(String),
    List,
    Join(String),
    Leave,
    Help,
    Name(String),
    Quit,
    /// Anything that is not a known command is sent as a chat message
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: {0} foo")]
    MissingArgument(&'static str),
}

impl Command {
    /// Parse one input line (trailing newline allowed)
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let with_arg = |name: &'static str, build: fn(String) -> Command| {
            if rest.is_empty() {
                Err(CommandError::MissingArgument(name))
            } else {
                Ok(build(rest.to_string()))
            }
        };

        match word {
            "/create" => with_arg("/create", Command::Create),
            "/join" => with_arg("/join", Command::Join),
            "/name" => with_arg("/name", Command::Name),
            "/list" => Ok(Command::List),
            "/leave" => Ok(Command::Leave),
            "/help" => Ok(Command::Help),
            "/quit" => Ok(Command::Quit),
            _ => Ok(Command::Message(line.to_string())),
        }
    }

    /// The remote call for this command; `None` for local-only commands
    pub fn into_call(self, token: &str) -> Option<Call> {
        let token = token.to_string();
        match self {
            Command::Create(name) => Some(Call::CreateRoom { token, name }),
            Command::List => Some(Call::ListRooms { token }),
            Command::Join(name) => Some(Call::JoinRoom { token, name }),
            Command::Leave => Some(Call::LeaveRoom { token }),
            Command::Help => None,
            Command::Name(name) => Some(Call::ChangeName { token, name }),
            Command::Quit => Some(Call::Quit { token }),
            Command::Message(text) => Some(Call::SendMessage { token, text }),
        }
    }
}
