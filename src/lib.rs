//! Source code for a community scam registry bot on Telegram: search known
//! scammers, submit reports, and (for admins) curate entries and broadcast.

/// Domain types used throughout.
pub mod types;

/// Per-chat conversation state.
pub mod flows;

/// The database.
pub mod database;

/// Functions that handle events from Telegram.
pub mod handlers;

/// Outgoing messages: formatting, keyboards, alerts, broadcast.
pub mod responder;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

use teloxide::types::UserId;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// User ids allowed to use the admin panel, add entries,
    /// view reports and broadcast.
    pub admins: Vec<UserId>,
}

impl Config {
    /// Admin ids come from the `ADMIN_IDS` environment variable as a
    /// comma-separated list. Unset or empty just means no admins.
    pub fn from_env() -> Config {
        let raw = std::env::var("ADMIN_IDS").unwrap_or_default();
        Config {
            admins: parse_admin_ids(&raw),
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}

fn parse_admin_ids(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .filter_map(|chunk| chunk.trim().parse::<u64>().ok())
        .map(UserId)
        .collect()
}
