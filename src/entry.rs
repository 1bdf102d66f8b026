use std::{fs, sync::Arc};
use teloxide::{dptree::deps, prelude::*, types::BotCommand};

use crate::{
    database::Database,
    flows::{self, FlowTracker},
    handlers, Config,
};

fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Show the main menu."),
        BotCommand::new("admin", "Open the admin panel."),
    ]
}

/// # Panics
///
/// Panics if there's no key file or the database can't be opened.
pub async fn entry() {
    let key = fs::read_to_string(match cfg!(debug_assertions) {
        true => "key_debug",
        false => "key",
    })
    .expect("Could not load bot key file!");

    let bot = Bot::new(key);

    bot.set_my_commands(bot_commands())
        .await
        .expect("Failed to set bot commands!");

    let config = Arc::new(Config::from_env());
    if config.admins.is_empty() {
        log::warn!("ADMIN_IDS is empty; admin features will be unreachable.");
    } else {
        log::info!("{} admin(s) configured.", config.admins.len());
    }

    let database = Arc::new(Database::new().await.expect("Failed to create database!"));

    let tracker = Arc::new(FlowTracker::new());
    tokio::spawn(flows::eviction_loop(tracker.clone()));

    log::info!("Creating the handler...");

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    log::info!("🤖 Bot is running...");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![database, tracker, config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
