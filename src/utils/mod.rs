//! Utility functions.
//!
//! Small helpers shared by the antiflood commands and event handler.

pub mod duration;

pub use duration::{format_duration, parse_duration};

use teloxide::types::UserId;

/// Escape text for Telegram's HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Build an HTML mention link for a user.
pub fn mention_html(user_id: UserId, name: &str) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user_id.0,
        html_escape(name)
    )
}
