//! Database models.

pub mod antiflood;

pub use antiflood::{ChatFloodConfig, FloodAction, FloodSettingsUpdate, FloodTimer};
