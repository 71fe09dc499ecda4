//! User-facing text lines
//!
//! Every line that reaches a session's outbox is built here. Lines carry
//! no trailing newline; the console client adds one when printing.
//! Error lines come from `ChatError`'s `Display`.

use chrono::{Local, NaiveTime};

/// Sent to a session right after Connect
pub const WELCOME: &str = "Welcome to the server! Type \"/help\" to get a list of commands.";

/// Broadcast to a room just before it is deleted for inactivity
pub const ROOM_DELETED: &str = "Notice: Chat room is inactive and being deleted.";

/// Header line of a room listing
pub const ROOM_LIST_HEADER: &str = "ChatRooms:";

pub fn joined(name: &str) -> String {
    format!("Notice: \"{}\" joined the chat room.", name)
}

pub fn left(name: &str) -> String {
    format!("Notice: \"{}\" left the chat room.", name)
}

pub fn room_created(room: &str) -> String {
    format!("Notice: Created chat room \"{}\".", room)
}

pub fn name_changed(name: &str) -> String {
    format!("Notice: Changed name to \"{}\".", name)
}

/// Render a room listing: the header, then one name per line
pub fn room_list(names: &[String]) -> String {
    let mut list = String::from(ROOM_LIST_HEADER);
    for name in names {
        list.push('\n');
        list.push_str(name);
    }
    list
}

/// Format a chat line stamped with the current local time
pub fn chat_line(sender: &str, text: &str) -> String {
    chat_line_at(Local::now().time(), sender, text)
}

/// Format a chat line as `3:04PM - sender: text`
pub fn chat_line_at(time: NaiveTime, sender: &str, text: &str) -> String {
    format!("{} - {}: {}", time.format("%-I:%M%p"), sender, text)
}
