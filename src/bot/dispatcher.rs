//! Message dispatcher setup.
//!
//! Builds the dispatcher with the antiflood commands and the message check.

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::trace;

use crate::events::{self, Antiflood};
use crate::permissions::Permissions;
use crate::plugins;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Flood detection service.
    pub antiflood: Antiflood,

    /// Exemption checker, also gates the setters.
    pub permissions: Permissions,
}

impl AppState {
    pub fn new(antiflood: Antiflood, permissions: Permissions) -> Self {
        Self {
            antiflood,
            permissions,
        }
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    bot: ThrottledBot,
    state: AppState,
) -> Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            trace!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<anyhow::Error> {
    // Commands first; everything else is a candidate for flood counting
    Update::filter_message()
        .branch(plugins::command_handler())
        .branch(events::message_event_handler())
}
