//! Antiflood event handler.
//!
//! Every group message goes through [`Antiflood::handle_message`]:
//! settings lookup, exemption check, counting, and enforcement when the
//! sender crossed the chat's limit.

mod enforcer;
mod reaper;
mod tracker;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::MessageKind;
use tracing::{debug, info};

pub use enforcer::{enforce, ChatModeration, FloodMessage};
pub use reaper::{FloodReaper, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL};
pub use tracker::{FloodDecision, FloodTable, FloodTracker};

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::FloodSettingsRepository;
use crate::permissions::Permissions;

/// Flood detection service shared by the message handler and the commands.
#[derive(Clone)]
pub struct Antiflood {
    settings: Arc<FloodSettingsRepository>,
    permissions: Permissions,
    tracker: FloodTracker,
}

impl Antiflood {
    pub fn new(
        settings: Arc<FloodSettingsRepository>,
        permissions: Permissions,
        tracker: FloodTracker,
    ) -> Self {
        Self {
            settings,
            permissions,
            tracker,
        }
    }

    pub fn settings(&self) -> &FloodSettingsRepository {
        &self.settings
    }

    pub fn tracker(&self) -> &FloodTracker {
        &self.tracker
    }

    /// Count one message and punish the sender if it ends a flood episode.
    ///
    /// Only a settings store failure is returned as an error. Membership
    /// lookups fail closed and enforcement failures are logged.
    pub async fn handle_message<M>(
        &self,
        moderation: &M,
        message: &FloodMessage,
        now: DateTime<Utc>,
    ) -> anyhow::Result<FloodDecision>
    where
        M: ChatModeration + ?Sized,
    {
        let chat_id = message.chat_id;
        let user_id = message.user_id;

        let settings = self.settings.get(chat_id).await?;
        if !settings.is_enabled() {
            return Ok(FloodDecision::Ignore);
        }

        if self.permissions.is_exempt(chat_id, user_id).await {
            debug!("User {} is exempt from antiflood in chat {}", user_id, chat_id);
            return Ok(FloodDecision::Ignore);
        }

        let decision = self.tracker.observe(chat_id, user_id, now, &settings);
        if decision == FloodDecision::Violation {
            let outcome = enforce(moderation, message, &settings, now).await;
            info!("User {} flooded chat {}: {:?}", user_id, chat_id, outcome);
        }

        Ok(decision)
    }
}

/// Run antiflood for one incoming message - called from the message handler.
pub async fn check_antiflood(bot: &ThrottledBot, msg: &Message, state: &AppState) -> anyhow::Result<()> {
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return Ok(());
    }

    // Joins, pins and other service messages don't count
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return Ok(());
    }

    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    if user.is_bot {
        return Ok(());
    }

    let message = FloodMessage {
        chat_id: msg.chat.id,
        user_id: user.id,
        message_id: msg.id,
        name: user.full_name(),
    };

    state.antiflood.handle_message(bot, &message, Utc::now()).await?;
    Ok(())
}
