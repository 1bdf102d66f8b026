use std::sync::Arc;

use teloxide::{prelude::*, sugar::request::RequestReplyExt, types::Me, RequestError};

use crate::{
    database::Database,
    flows::{self, CompletedFlow, FlowEvent, FlowInput, FlowState, FlowTracker, Pending},
    responder,
    types::{MenuAction, NewReport},
    Config,
};

/// Extract the slash command from a message, if there is one, trimming an
/// `@botusername` suffix and lowercasing.
fn parse_command(text: &str, bot_username: &str) -> Option<String> {
    if !text.starts_with('/') {
        return None;
    }
    let command = text.split_whitespace().next()?;
    let username = format!("@{bot_username}");
    Some(command.trim_end_matches(username.as_str()).to_lowercase())
}

/// Map message content to something a flow step can consume.
/// Anything that isn't text, photo or video is dropped without feedback.
fn flow_input(message: &Message) -> Option<FlowInput> {
    if let Some(text) = message.text() {
        return Some(FlowInput::Text(text.to_string()));
    }
    if let Some(photos) = message.photo() {
        // Telegram sends several downscaled variants; keep the biggest.
        let biggest = photos.iter().max_by_key(|x| x.width + x.height)?;
        return Some(FlowInput::Photo(biggest.file.id.clone()));
    }
    if let Some(video) = message.video() {
        return Some(FlowInput::Video(video.file.id.clone()));
    }
    None
}

/// Route one inbound message. Precedence: `/start` and `/admin` always win,
/// then a registered one-shot prompt, then the chat's active flow, then the
/// menu labels. Anything else is silently ignored.
pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
    tracker: Arc<FlowTracker>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    let Some(user) = message.from() else {
        // Anonymous senders (channels etc.) have no business here.
        return Ok(());
    };
    if user.id == me.id {
        return Ok(());
    }
    let user = user.clone();
    let chat = message.chat.id;
    let text = message.text();

    if let Some(command) = text.and_then(|t| parse_command(t, me.username())) {
        match command.as_str() {
            "/start" => {
                database.upsert_user(&user).await.expect("Database died!");
                bot.send_message(chat, responder::WELCOME)
                    .reply_markup(responder::main_menu())
                    .await?;
                return Ok(());
            }
            "/admin" => {
                if !config.is_admin(user.id) {
                    bot.send_message(chat, responder::NOT_ADMIN)
                        .reply_to(message.id)
                        .await?;
                    return Ok(());
                }
                bot.send_message(chat, responder::ADMIN_PANEL)
                    .reply_markup(responder::admin_menu())
                    .await?;
                return Ok(());
            }
            // Not a routed command. `/done` and friends may still mean
            // something to an active flow below.
            _ => {}
        }
    }

    if let Some(pending) = tracker.take_pending(chat).await {
        match (pending, text) {
            (Pending::SearchQuery, Some(query)) => {
                responder::search_and_reply(&bot, chat, &database, query).await?;
            }
            (Pending::Broadcast, Some(broadcast_text)) => {
                let sent = responder::broadcast(&bot, &database, broadcast_text).await;
                bot.send_message(chat, format!("✅ Broadcast sent to {sent} users."))
                    .reply_markup(responder::admin_menu())
                    .await?;
            }
            // The prompt is answered by whatever comes next; a non-text
            // answer consumes it and goes nowhere.
            (_, None) => {}
        }
        return Ok(());
    }

    if let Some(input) = flow_input(&message) {
        if let Some(event) = tracker.advance_flow(chat, input).await {
            match event {
                FlowEvent::Prompt(prompt) => {
                    bot.send_message(chat, prompt).await?;
                }
                FlowEvent::ProofSaved(confirmation) => {
                    bot.send_message(chat, confirmation)
                        .reply_to(message.id)
                        .await?;
                }
                FlowEvent::ProofLimit => {
                    bot.send_message(chat, flows::prompts::PROOF_LIMIT)
                        .reply_to(message.id)
                        .await?;
                }
                FlowEvent::Ignored => {}
                FlowEvent::Done(CompletedFlow::Report {
                    suspect,
                    description,
                    proofs,
                }) => {
                    let report = NewReport {
                        reporter: user.id,
                        suspect,
                        description,
                        proofs,
                    };
                    database
                        .insert_report(&report)
                        .await
                        .expect("Database died!");
                    log::info!("New report against {} from {}", report.suspect, user.id);
                    bot.send_message(chat, responder::REPORT_SUBMITTED)
                        .reply_markup(responder::main_menu())
                        .await?;
                    responder::notify_admins_of_report(
                        &bot,
                        &config.admins,
                        user.username.as_deref(),
                        &report,
                    )
                    .await;
                }
                FlowEvent::Done(CompletedFlow::Scammer(scammer)) => {
                    database
                        .insert_scammer(&scammer, user.id)
                        .await
                        .expect("Database died!");
                    log::info!("Scammer entry \"{}\" added by {}", scammer.name, user.id);
                    bot.send_message(chat, responder::SCAMMER_ADDED)
                        .reply_markup(responder::admin_menu())
                        .await?;
                }
            }
            return Ok(());
        }
    }

    let Some(action) = text.and_then(MenuAction::from_text) else {
        return Ok(());
    };
    if action.admin_only() && !config.is_admin(user.id) {
        // Those buttons don't even render for non-admins; treat as no match.
        return Ok(());
    }

    match action {
        MenuAction::Search => {
            bot.send_message(chat, responder::SEARCH_PROMPT).await?;
            tracker.begin_pending(chat, Pending::SearchQuery).await;
        }
        MenuAction::Report => {
            let state = FlowState::report();
            bot.send_message(chat, state.opening_prompt()).await?;
            tracker.begin_flow(chat, state).await;
        }
        MenuAction::AddScammer => {
            let state = FlowState::add_scammer();
            bot.send_message(chat, state.opening_prompt()).await?;
            tracker.begin_flow(chat, state).await;
        }
        MenuAction::ViewReports => {
            let reports = database.unprocessed_reports().await.expect("Database died!");
            if reports.is_empty() {
                bot.send_message(chat, responder::NO_PENDING_REPORTS)
                    .reply_markup(responder::admin_menu())
                    .await?;
                return Ok(());
            }
            for report in &reports {
                bot.send_message(chat, responder::format_report(report))
                    .await?;
                responder::replay_proofs(&bot, chat, &report.proofs).await?;
            }
        }
        MenuAction::Broadcast => {
            bot.send_message(chat, responder::BROADCAST_PROMPT).await?;
            tracker.begin_pending(chat, Pending::Broadcast).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_and_without_bot_suffix() {
        assert_eq!(parse_command("/start", "scam_bot").as_deref(), Some("/start"));
        assert_eq!(
            parse_command("/start@scam_bot", "scam_bot").as_deref(),
            Some("/start")
        );
        assert_eq!(
            parse_command("/ADMIN extra words", "scam_bot").as_deref(),
            Some("/admin")
        );
        assert_eq!(parse_command("hello", "scam_bot"), None);
        // `/done` parses as a command but the router doesn't route it;
        // it falls through to the flow step.
        assert_eq!(parse_command("/done", "scam_bot").as_deref(), Some("/done"));
    }
}
