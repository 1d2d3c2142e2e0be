//! Event handler system.
//!
//! Handlers here run on plain group messages, after the command branch had
//! its chance.

pub mod antiflood;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{debug, error};

pub use antiflood::{Antiflood, FloodReaper, FloodTable, FloodTracker};

use crate::bot::dispatcher::{AppState, ThrottledBot};

/// Build the message event handler.
pub fn message_event_handler() -> UpdateHandler<anyhow::Error> {
    dptree::filter(|msg: Message| msg.chat.is_group() || msg.chat.is_supergroup())
        .endpoint(unified_message_handler)
}

/// Runs every message check. A failing check is logged and never stops
/// dispatching.
async fn unified_message_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    debug!("unified_message_handler: chat={}, message={}", msg.chat.id, msg.id);

    if let Err(e) = antiflood::check_antiflood(&bot, &msg, &state).await {
        error!("Antiflood error in chat {}: {}", msg.chat.id, e);
    }

    Ok(())
}
