//! Antiflood command handlers.
//!
//! `/flood` shows the chat's settings to anyone. The setters require the same
//! privilege that exempts a user from flood protection.

use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, ReplyParameters};
use thiserror::Error;
use tracing::{debug, info};

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::{ChatFloodConfig, FloodAction, FloodSettingsUpdate, FloodTimer};
use crate::events::Antiflood;
use crate::utils::{format_duration, html_escape, parse_duration};

/// Rejected antiflood command. The message is sent back as the reply.
#[derive(Debug, Error)]
pub enum FloodCommandError {
    #[error("Usage: /setflood <number|off>")]
    LimitUsage,

    #[error("Invalid value. Use a number of 2 or more, or off.")]
    InvalidLimit,

    #[error("Usage: /setfloodmode <ban|mute|kick|tban|tmute> [duration]")]
    ModeUsage,

    #[error("Invalid action \"{0}\". Pick one of ban, mute, kick, tban, tmute.")]
    UnknownAction(String),

    #[error("Please give a valid duration for {0} (e.g. 30s, 5m, 2h).")]
    MissingDuration(FloodAction),

    #[error("Usage: /setfloodtimer <messages> <duration> or /setfloodtimer off")]
    TimerUsage,

    #[error("Invalid format. Example: /setfloodtimer 10 30s")]
    InvalidTimer,

    #[error("Usage: /clearflood on|off")]
    ClearUsage,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

type ArgParser = fn(&[&str]) -> Result<FloodSettingsUpdate, FloodCommandError>;

/// `/setflood <number|off|no|0>`
pub fn parse_limit_args(args: &[&str]) -> Result<FloodSettingsUpdate, FloodCommandError> {
    let arg = args.first().ok_or(FloodCommandError::LimitUsage)?.to_lowercase();

    let limit = match arg.as_str() {
        "off" | "no" | "0" => 0,
        value => match value.parse::<u32>() {
            Ok(n) if n >= 2 => n,
            _ => return Err(FloodCommandError::InvalidLimit),
        },
    };

    Ok(FloodSettingsUpdate {
        limit: Some(limit),
        ..Default::default()
    })
}

/// `/setfloodmode <action> [duration]`
///
/// The duration is stored as typed; when absent any stored one is cleared.
pub fn parse_mode_args(args: &[&str]) -> Result<FloodSettingsUpdate, FloodCommandError> {
    let raw = args.first().ok_or(FloodCommandError::ModeUsage)?;
    let action: FloodAction = raw
        .parse()
        .map_err(|()| FloodCommandError::UnknownAction(raw.to_string()))?;

    let duration = args.get(1).copied();
    if action.is_timed() && duration.and_then(parse_duration).is_none() {
        return Err(FloodCommandError::MissingDuration(action));
    }

    Ok(FloodSettingsUpdate {
        action: Some(action),
        duration: Some(duration.map(str::to_string)),
        ..Default::default()
    })
}

/// `/setfloodtimer <messages> <duration>` or `/setfloodtimer off|no`
pub fn parse_timer_args(args: &[&str]) -> Result<FloodSettingsUpdate, FloodCommandError> {
    let first = args.first().ok_or(FloodCommandError::TimerUsage)?.to_lowercase();

    if matches!(first.as_str(), "off" | "no") {
        return Ok(FloodSettingsUpdate {
            timer: Some(None),
            ..Default::default()
        });
    }

    let Some(window) = args.get(1) else {
        return Err(FloodCommandError::TimerUsage);
    };

    let messages = match first.parse::<u32>() {
        Ok(n) if n >= 1 => n,
        _ => return Err(FloodCommandError::InvalidTimer),
    };
    let seconds = parse_duration(window).ok_or(FloodCommandError::InvalidTimer)?;

    Ok(FloodSettingsUpdate {
        timer: Some(Some(FloodTimer { messages, seconds })),
        ..Default::default()
    })
}

/// `/clearflood <on|off>`
pub fn parse_clear_args(args: &[&str]) -> Result<FloodSettingsUpdate, FloodCommandError> {
    let arg = args.first().ok_or(FloodCommandError::ClearUsage)?.to_lowercase();

    let clear = match arg.as_str() {
        "on" | "yes" | "true" => true,
        "off" | "no" | "false" => false,
        _ => return Err(FloodCommandError::ClearUsage),
    };

    Ok(FloodSettingsUpdate {
        clear_on_violation: Some(clear),
        ..Default::default()
    })
}

/// Validate and store one settings change.
///
/// Limit and timer changes drop the chat's running counts so old episodes
/// are not judged by the new policy.
pub async fn configure(
    antiflood: &Antiflood,
    chat_id: ChatId,
    args: &[&str],
    parse: ArgParser,
) -> Result<FloodSettingsUpdate, FloodCommandError> {
    let update = parse(args)?;
    antiflood.settings().set(chat_id, update.clone()).await?;

    if update.touches_counting() {
        let dropped = antiflood.tracker().forget_chat(chat_id);
        debug!("Dropped {} flood tracker entries for chat {}", dropped, chat_id);
    }

    Ok(update)
}

/// Render the settings shown by `/flood`.
pub fn format_status(settings: &ChatFloodConfig) -> String {
    let limit = if settings.is_enabled() {
        format!("<code>{}</code> messages", settings.limit)
    } else {
        "<code>disabled</code>".to_string()
    };

    let duration = match settings.duration.as_deref() {
        Some(d) => format!("<code>{}</code>", html_escape(d)),
        None => "<code>default</code>".to_string(),
    };

    let timer = match settings.timer.and_then(FloodTimer::valid) {
        Some((messages, seconds)) => format!(
            "<code>{} messages in {}</code>",
            messages,
            format_duration(seconds)
        ),
        None => "<code>disabled</code>".to_string(),
    };

    format!(
        "<b>Antiflood settings</b>\n\n\
         • Limit: {}\n\
         • Action: <code>{}</code>\n\
         • Duration: {}\n\
         • Timer: {}\n\
         • Clear: <code>{}</code>",
        limit, settings.action, duration, timer, settings.clear_on_violation
    )
}

fn describe_limit(update: &FloodSettingsUpdate) -> String {
    match update.limit {
        Some(0) | None => "Antiflood disabled.".to_string(),
        Some(n) => format!("Antiflood will trigger after <code>{}</code> messages.", n),
    }
}

fn describe_mode(update: &FloodSettingsUpdate) -> String {
    let action = update.action.unwrap_or_default();
    match update.duration.as_ref().and_then(Option::as_deref) {
        Some(d) => format!("Flood action set to <code>{}</code> for <code>{}</code>.", action, html_escape(d)),
        None => format!("Flood action set to <code>{}</code>.", action),
    }
}

fn describe_timer(update: &FloodSettingsUpdate) -> String {
    match update.timer.flatten() {
        Some(FloodTimer { messages, seconds }) => format!(
            "Timed antiflood: <code>{}</code> messages in <code>{}</code>.",
            messages,
            format_duration(seconds)
        ),
        None => "Timed antiflood disabled.".to_string(),
    }
}

fn describe_clear(update: &FloodSettingsUpdate) -> String {
    let state = if update.clear_on_violation.unwrap_or(false) { "on" } else { "off" };
    format!("Delete flood messages: <code>{}</code>.", state)
}

async fn reply(bot: &ThrottledBot, msg: &Message, text: impl Into<String>) -> anyhow::Result<()> {
    bot.send_message(msg.chat.id, text)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

async fn reply_html(bot: &ThrottledBot, msg: &Message, text: impl Into<String>) -> anyhow::Result<()> {
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

/// Shared path of the setters: group and privilege checks, then [`configure`].
async fn run_setter(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
    parse: ArgParser,
    describe: fn(&FloodSettingsUpdate) -> String,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return reply(&bot, &msg, "This command only works in groups.").await;
    }

    if !state.permissions.is_exempt(chat_id, user.id).await {
        return reply(&bot, &msg, "Only admins can use this command.").await;
    }

    let args: Vec<&str> = args.split_whitespace().collect();
    match configure(&state.antiflood, chat_id, &args, parse).await {
        Ok(update) => {
            info!("Antiflood settings changed in chat {} by {}: {:?}", chat_id, user.id, update);
            reply_html(&bot, &msg, describe(&update)).await
        }
        Err(FloodCommandError::Store(e)) => Err(e),
        Err(e) => reply(&bot, &msg, e.to_string()).await,
    }
}

/// Handle /flood - show the chat's antiflood settings.
pub async fn flood_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return reply(&bot, &msg, "This command only works in groups.").await;
    }

    let settings = state.antiflood.settings().get(msg.chat.id).await?;
    reply_html(&bot, &msg, format_status(&settings)).await
}

/// Handle /setflood.
pub async fn setflood_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    run_setter(bot, msg, state, args, parse_limit_args, describe_limit).await
}

/// Handle /setfloodmode and /floodmode.
pub async fn setfloodmode_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    run_setter(bot, msg, state, args, parse_mode_args, describe_mode).await
}

/// Handle /setfloodtimer.
pub async fn setfloodtimer_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    run_setter(bot, msg, state, args, parse_timer_args, describe_timer).await
}

/// Handle /clearflood.
pub async fn clearflood_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    run_setter(bot, msg, state, args, parse_clear_args, describe_clear).await
}
