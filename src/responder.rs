//! Everything the bot says: keyboards, record formatting, search replies,
//! admin alerts and broadcast fan-out.

use teloxide::{
    prelude::*,
    types::{InputFile, KeyboardButton, KeyboardMarkup, UserId},
    RequestError,
};

use crate::{
    database::Database,
    types::{labels, NewReport, Proof, ProofKind, Report, ScammerRecord},
};

pub const WELCOME: &str = "Welcome! Use menu to search or report scammers.";
pub const ADMIN_PANEL: &str = "Welcome to Admin Panel 👮‍♂️";
pub const NOT_ADMIN: &str = "⛔ You are not an admin.";
pub const SEARCH_PROMPT: &str = "Enter Telegram ID, @username, or name to search:";
pub const NO_RECORD: &str = "✅ No record found. This user appears safe.";
pub const SEARCH_COMPLETE: &str = "Search complete.";
pub const REPORT_SUBMITTED: &str = "✅ Report submitted to admins.";
pub const SCAMMER_ADDED: &str = "✅ Scammer added successfully!";
pub const NO_PENDING_REPORTS: &str = "No pending reports.";
pub const BROADCAST_PROMPT: &str = "Send message to broadcast to all users:";

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new([
        vec![
            KeyboardButton::new(labels::SEARCH),
            KeyboardButton::new(labels::REPORT),
        ],
        vec![KeyboardButton::new(labels::CONTACT_ADMIN)],
    ])
    .resize_keyboard()
}

pub fn admin_menu() -> KeyboardMarkup {
    KeyboardMarkup::new([
        vec![
            KeyboardButton::new(labels::ADD_SCAMMER),
            KeyboardButton::new(labels::VIEW_REPORTS),
        ],
        vec![
            KeyboardButton::new(labels::BROADCAST),
            KeyboardButton::new(labels::BACK),
        ],
    ])
    .resize_keyboard()
}

/// Render a scammer entry the way every previous version of the bot did.
/// An empty handle shows as the `N/A` sentinel.
pub fn format_scammer(record: &ScammerRecord) -> String {
    let tag = if record.verified {
        "✅ Verified"
    } else {
        "⚠️ Unverified"
    };
    let username = if record.username.is_empty() {
        "N/A"
    } else {
        record.username.as_str()
    };
    format!(
        "📛 Name: {}\n🆔 ID: {}\n👤 Username: @{}\n{}\n📅 Added: {}\n\n📝 {}",
        record.name, record.tg_id, username, tag, record.created_at, record.description
    )
}

pub fn format_report(report: &Report) -> String {
    format!(
        "📨 Report ID {}\nFrom: {}\nSuspect: {}\nDesc: {}",
        report.id, report.reporter, report.suspect, report.description
    )
}

/// Re-send every attached proof to `chat`, in stored order.
pub async fn replay_proofs(bot: &Bot, chat: ChatId, proofs: &[Proof]) -> Result<(), RequestError> {
    for proof in proofs {
        match proof.kind {
            ProofKind::Photo => {
                bot.send_photo(chat, InputFile::file_id(proof.file_id.clone()))
                    .await?;
            }
            ProofKind::Video => {
                bot.send_video(chat, InputFile::file_id(proof.file_id.clone()))
                    .await?;
            }
        }
    }
    Ok(())
}

/// Run a search and reply with every hit plus its proofs, or with the
/// "appears safe" message when there are none.
pub async fn search_and_reply(
    bot: &Bot,
    chat: ChatId,
    database: &Database,
    raw_query: &str,
) -> Result<(), RequestError> {
    let query = raw_query.trim().trim_start_matches('@');
    let records = database.find_scammers(query).await.expect("Database died!");

    if records.is_empty() {
        bot.send_message(chat, NO_RECORD)
            .reply_markup(main_menu())
            .await?;
        return Ok(());
    }

    for record in &records {
        bot.send_message(chat, format_scammer(record)).await?;
        replay_proofs(bot, chat, &record.proofs).await?;
    }
    bot.send_message(chat, SEARCH_COMPLETE)
        .reply_markup(main_menu())
        .await?;
    Ok(())
}

/// Alert every configured admin about a fresh report. Best-effort; an admin
/// who blocked the bot doesn't fail the submission.
pub async fn notify_admins_of_report(
    bot: &Bot,
    admins: &[UserId],
    reporter_username: Option<&str>,
    report: &NewReport,
) {
    let alert = format!(
        "📢 New report from @{}\nScammer: {}\nDesc: {}",
        reporter_username.unwrap_or("N/A"),
        report.suspect,
        report.description
    );
    for admin in admins {
        let _ = bot.send_message(*admin, alert.clone()).await;
    }
}

/// Send `text` to every known user, one by one. Per-recipient failures are
/// swallowed; returns how many deliveries succeeded.
pub async fn broadcast(bot: &Bot, database: &Database, text: &str) -> usize {
    let recipients = database.all_user_ids().await.expect("Database died!");
    let message = format!("📢 {text}");
    let mut sent = 0;
    for user in recipients {
        if bot.send_message(user, message.clone()).await.is_ok() {
            sent += 1;
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::FileId;

    #[test]
    fn scammer_block_renders_exactly() {
        let record = ScammerRecord {
            id: 3,
            name: "Joe Scam".to_string(),
            tg_id: "123456".to_string(),
            username: "joe_scam".to_string(),
            description: "sells fake invites".to_string(),
            proofs: vec![Proof::photo(FileId("p".to_string()))],
            verified: true,
            added_by: UserId(1),
            created_at: "2024-05-01T10:00:00.000000".to_string(),
        };
        assert_eq!(
            format_scammer(&record),
            "📛 Name: Joe Scam\n🆔 ID: 123456\n👤 Username: @joe_scam\n✅ Verified\n📅 Added: 2024-05-01T10:00:00.000000\n\n📝 sells fake invites"
        );
    }

    #[test]
    fn missing_handle_shows_the_sentinel() {
        let record = ScammerRecord {
            id: 1,
            name: "Joe".to_string(),
            tg_id: "1".to_string(),
            username: String::new(),
            description: "d".to_string(),
            proofs: Vec::new(),
            verified: false,
            added_by: UserId(1),
            created_at: "t".to_string(),
        };
        let rendered = format_scammer(&record);
        assert!(rendered.contains("👤 Username: @N/A\n"));
        assert!(rendered.contains("⚠️ Unverified"));
    }

    #[test]
    fn report_block_renders_exactly() {
        let report = Report {
            id: 12,
            reporter: UserId(777),
            suspect: "@joe".to_string(),
            description: "took my money".to_string(),
            proofs: Vec::new(),
            processed: false,
            created_at: "t".to_string(),
        };
        assert_eq!(
            format_report(&report),
            "📨 Report ID 12\nFrom: 777\nSuspect: @joe\nDesc: took my money"
        );
    }
}
