//! Plugin system for command handlers.
//!
//! Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_plugin;` below
//! 3. Adding the handler to `command_handler()`

pub mod antiflood;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

/// All bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Show antiflood settings")]
    Flood,

    #[command(description = "Set the flood limit, or off")]
    Setflood(String),

    #[command(description = "Set the flood action")]
    Setfloodmode(String),

    #[command(description = "Set the flood action (alias)")]
    Floodmode(String),

    #[command(description = "Count flood inside a time window")]
    Setfloodtimer(String),

    #[command(description = "Delete the flooding message")]
    Clearflood(String),
}

/// Build the combined command handler.
pub fn command_handler() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    teloxide::filter_command::<Command, _>()
        .branch(case![Command::Flood].endpoint(antiflood::flood_command))
        .branch(case![Command::Setflood(args)].endpoint(antiflood::setflood_command))
        .branch(case![Command::Setfloodmode(args)].endpoint(antiflood::setfloodmode_command))
        .branch(case![Command::Floodmode(args)].endpoint(antiflood::setfloodmode_command))
        .branch(case![Command::Setfloodtimer(args)].endpoint(antiflood::setfloodtimer_command))
        .branch(case![Command::Clearflood(args)].endpoint(antiflood::clearflood_command))
}
