//! Penalties for users that crossed a chat's flood limit.
//!
//! Enforcement is best effort: every failure of the Bot API is logged and
//! swallowed so the message pipeline keeps running. By the time we get here
//! the tracker has already closed the episode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatPermissions, MessageId, ParseMode, ReplyParameters, UserId};
use tracing::{debug, info, warn};

use crate::bot::dispatcher::ThrottledBot;
use crate::database::{ChatFloodConfig, FloodAction};
use crate::utils::{format_duration, mention_html, parse_duration};

/// Chat administration calls needed to punish flooders.
#[async_trait]
pub trait ChatModeration: Send + Sync {
    /// Ban a user, permanently when `until` is `None`.
    async fn ban(&self, chat_id: ChatId, user_id: UserId, until: Option<DateTime<Utc>>) -> anyhow::Result<()>;

    async fn unban(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<()>;

    /// Take away the right to send messages, indefinitely when `until` is `None`.
    async fn restrict_send(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> anyhow::Result<()>;

    /// Post an HTML notice, as a reply when `reply_to` is set.
    async fn notify(&self, chat_id: ChatId, reply_to: Option<MessageId>, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl ChatModeration for ThrottledBot {
    async fn ban(&self, chat_id: ChatId, user_id: UserId, until: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        let mut request = self.ban_chat_member(chat_id, user_id);
        if let Some(until) = until {
            request = request.until_date(until);
        }
        request.await?;
        Ok(())
    }

    async fn unban(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<()> {
        self.unban_chat_member(chat_id, user_id).await?;
        Ok(())
    }

    async fn restrict_send(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let mut request = self.restrict_chat_member(chat_id, user_id, ChatPermissions::empty());
        if let Some(until) = until {
            request = request.until_date(until);
        }
        request.await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> anyhow::Result<()> {
        Requester::delete_message(self, chat_id, message_id).await?;
        Ok(())
    }

    async fn notify(&self, chat_id: ChatId, reply_to: Option<MessageId>, text: &str) -> anyhow::Result<()> {
        let mut request = self.send_message(chat_id, text).parse_mode(ParseMode::Html);
        if let Some(message_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(message_id));
        }
        request.await?;
        Ok(())
    }
}

/// A group message as seen by antiflood.
#[derive(Clone, Debug)]
pub struct FloodMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    /// Display name used in the notice.
    pub name: String,
}

/// What enforcement ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnforcementOutcome {
    /// The penalty went through.
    Applied(FloodAction),
    /// tban/tmute without a usable duration; nothing was done.
    Misconfigured,
    /// The Bot API refused the penalty.
    Failed(FloodAction),
}

/// Punish a flooder according to the chat's settings. Never fails.
pub async fn enforce<M>(
    moderation: &M,
    message: &FloodMessage,
    settings: &ChatFloodConfig,
    now: DateTime<Utc>,
) -> EnforcementOutcome
where
    M: ChatModeration + ?Sized,
{
    let FloodMessage {
        chat_id,
        user_id,
        message_id,
        ..
    } = *message;

    let mut reply_to = Some(message_id);
    if settings.clear_on_violation {
        match moderation.delete_message(chat_id, message_id).await {
            Ok(()) => reply_to = None,
            Err(e) => debug!("Could not delete flood message in chat {}: {}", chat_id, e),
        }
    }

    let action = settings.action;
    let mention = mention_html(user_id, &message.name);

    let (until, notice) = match action {
        FloodAction::Ban => (None, format!("{mention} banned for flooding.")),
        FloodAction::Mute => (None, format!("{mention} muted for flooding.")),
        FloodAction::Kick => (None, format!("{mention} kicked for flooding.")),
        FloodAction::Tban | FloodAction::Tmute => {
            let expiry = settings
                .duration
                .as_deref()
                .and_then(parse_duration)
                .and_then(|secs| expiry_after(now, secs).map(|until| (secs, until)));

            let Some((secs, until)) = expiry else {
                warn!(
                    "Flood action {} in chat {} has unusable duration {:?}",
                    action, chat_id, settings.duration
                );
                let text = "Invalid flood duration configured. Set it again with /setfloodmode.";
                if let Err(e) = moderation.notify(chat_id, reply_to, text).await {
                    warn!("Failed to send flood notice in chat {}: {}", chat_id, e);
                }
                return EnforcementOutcome::Misconfigured;
            };

            let verb = if action == FloodAction::Tban { "banned" } else { "muted" };
            (
                Some(until),
                format!("{mention} temporarily {verb} for {} for flooding.", format_duration(secs)),
            )
        }
    };

    if let Err(e) = punish(moderation, action, chat_id, user_id, until).await {
        warn!("Failed to {} user {} in chat {}: {}", action, user_id, chat_id, e);
        return EnforcementOutcome::Failed(action);
    }

    info!("Applied flood penalty {} to user {} in chat {}", action, user_id, chat_id);

    if let Err(e) = moderation.notify(chat_id, reply_to, &notice).await {
        warn!("Failed to send flood notice in chat {}: {}", chat_id, e);
    }

    EnforcementOutcome::Applied(action)
}

fn expiry_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(delta)
}

async fn punish<M>(
    moderation: &M,
    action: FloodAction,
    chat_id: ChatId,
    user_id: UserId,
    until: Option<DateTime<Utc>>,
) -> anyhow::Result<()>
where
    M: ChatModeration + ?Sized,
{
    match action {
        FloodAction::Ban | FloodAction::Tban => moderation.ban(chat_id, user_id, until).await,
        FloodAction::Mute | FloodAction::Tmute => moderation.restrict_send(chat_id, user_id, until).await,
        FloodAction::Kick => {
            moderation.ban(chat_id, user_id, None).await?;
            moderation.unban(chat_id, user_id).await
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use parking_lot::Mutex;

    use super::*;

    /// One recorded Bot API call.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ModerationCall {
        Ban(UserId, Option<DateTime<Utc>>),
        Unban(UserId),
        Restrict(UserId, Option<DateTime<Utc>>),
        Delete(MessageId),
        Notify(Option<MessageId>, String),
    }

    /// Records calls; can be told to fail penalties or deletions.
    #[derive(Default)]
    pub struct RecordingModeration {
        calls: Mutex<Vec<ModerationCall>>,
        pub fail_penalties: bool,
        pub fail_deletes: bool,
    }

    impl RecordingModeration {
        pub fn failing(penalties: bool, deletes: bool) -> Self {
            Self {
                fail_penalties: penalties,
                fail_deletes: deletes,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<ModerationCall> {
            self.calls.lock().clone()
        }

        pub fn notices(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    ModerationCall::Notify(_, text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: ModerationCall) {
            self.calls.lock().push(call);
        }

        fn penalty(&self, call: ModerationCall) -> anyhow::Result<()> {
            if self.fail_penalties {
                anyhow::bail!("Bad Request: not enough rights to restrict/unrestrict chat member");
            }
            self.record(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ChatModeration for RecordingModeration {
        async fn ban(&self, _: ChatId, user_id: UserId, until: Option<DateTime<Utc>>) -> anyhow::Result<()> {
            self.penalty(ModerationCall::Ban(user_id, until))
        }

        async fn unban(&self, _: ChatId, user_id: UserId) -> anyhow::Result<()> {
            self.penalty(ModerationCall::Unban(user_id))
        }

        async fn restrict_send(
            &self,
            _: ChatId,
            user_id: UserId,
            until: Option<DateTime<Utc>>,
        ) -> anyhow::Result<()> {
            self.penalty(ModerationCall::Restrict(user_id, until))
        }

        async fn delete_message(&self, _: ChatId, message_id: MessageId) -> anyhow::Result<()> {
            if self.fail_deletes {
                anyhow::bail!("Bad Request: message to delete not found");
            }
            self.record(ModerationCall::Delete(message_id));
            Ok(())
        }

        async fn notify(&self, _: ChatId, reply_to: Option<MessageId>, text: &str) -> anyhow::Result<()> {
            self.record(ModerationCall::Notify(reply_to, text.to_string()));
            Ok(())
        }
    }
}
