//! floodwarden - antiflood guard for Telegram groups.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - MongoDB integration and flood settings
//! - `permissions` - Exemption checks with a short-lived cache
//! - `bot` - Dispatcher and runtime (with Throttle for API rate limiting)
//! - `plugins` - Antiflood commands
//! - `events` - Flood tracking, enforcement and the stale entry reaper
//! - `utils` - Duration parsing and HTML helpers

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod bot;
mod config;
mod database;
mod events;
mod permissions;
mod plugins;
mod utils;

use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot::AppState;
use config::Config;
use database::{Database, FloodSettingsRepository, MongoFloodSettings};
use events::{Antiflood, FloodReaper, FloodTable, FloodTracker};
use permissions::Permissions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("floodwarden=info,teloxide=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting floodwarden...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Bot mode: {:?}", config.bot_mode);

    // Connect to MongoDB
    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;
    info!("Database connected");

    // Throttle respects Telegram's rate limits:
    // - 30 messages per second globally
    // - 1 message per second to the same chat
    // - 20 messages per minute to the same group
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());

    let me = bot.get_me().await?;
    info!("Bot username: @{}", me.username());

    if config.owner_ids.is_empty() {
        info!("No owner IDs configured (OWNER_IDS is empty)");
    } else {
        info!("Bot owners: {:?}", config.owner_ids);
    }

    // Membership lookups need the inner Bot
    let permissions = Permissions::new(
        Arc::new(bot.inner().clone()),
        config.owner_ids.clone(),
        config.exempt_cache_ttl,
    );
    let settings = Arc::new(FloodSettingsRepository::new(
        Arc::new(MongoFloodSettings::new(&db)),
        config.settings_cache_ttl,
    ));

    let table = FloodTable::new();
    let antiflood = Antiflood::new(settings, permissions.clone(), FloodTracker::new(table.clone()));
    let reaper = FloodReaper::new(table, config.sweep_interval, config.retention).spawn();

    let state = AppState::new(antiflood, permissions);
    let dispatcher = bot::build_dispatcher(bot.clone(), state);

    let result = bot::run(&config, bot, dispatcher).await;

    reaper.stop().await;
    info!("floodwarden stopped");

    result
}
