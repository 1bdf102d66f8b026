use serde::{Deserialize, Serialize};
use teloxide::types::{FileId, UserId};

/// What kind of media a proof attachment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofKind {
    Photo,
    Video,
}

/// A single piece of evidence attached to a report or a scammer entry.
///
/// Serializes to `{"type": "photo", "file_id": "..."}`, which is the exact
/// shape stored in the `proofs` column, so old rows keep decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(rename = "type")]
    pub kind: ProofKind,
    pub file_id: FileId,
}

impl Proof {
    pub fn photo(file_id: FileId) -> Self {
        Proof {
            kind: ProofKind::Photo,
            file_id,
        }
    }
    pub fn video(file_id: FileId) -> Self {
        Proof {
            kind: ProofKind::Video,
            file_id,
        }
    }
}

/// A verified scammer entry, as read back from the `scammers` table.
#[derive(Debug, Clone)]
pub struct ScammerRecord {
    pub id: i64,
    pub name: String,
    pub tg_id: String,
    pub username: String,
    pub description: String,
    pub proofs: Vec<Proof>,
    pub verified: bool,
    pub added_by: UserId,
    pub created_at: String,
}

/// A user-submitted report, as read back from the `reports` table.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: i64,
    pub reporter: UserId,
    pub suspect: String,
    pub description: String,
    pub proofs: Vec<Proof>,
    pub processed: bool,
    pub created_at: String,
}

/// A fully collected report, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub reporter: UserId,
    pub suspect: String,
    pub description: String,
    pub proofs: Vec<Proof>,
}

/// A fully collected scammer entry, ready to be inserted.
/// `tg_id` keeps the admin's input verbatim; `username` is the same text
/// with one leading `@` stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScammer {
    pub name: String,
    pub tg_id: String,
    pub username: String,
    pub description: String,
    pub proofs: Vec<Proof>,
}

pub mod labels {
    pub const SEARCH: &str = "🔎 Search Scammer";
    pub const REPORT: &str = "📝 Report Scammer";
    pub const CONTACT_ADMIN: &str = "📞 Contact Admin";
    pub const ADD_SCAMMER: &str = "➕ Add Scammer";
    pub const VIEW_REPORTS: &str = "📋 View Reports";
    pub const BROADCAST: &str = "📣 Broadcast";
    pub const BACK: &str = "🏠 Back";
}

/// The closed set of menu actions the router dispatches on.
///
/// Labels must match the keyboard buttons byte for byte; reply keyboards
/// send the button text back as a plain message. "Contact Admin" and "Back"
/// exist on the keyboards but have never had a handler, so they are not
/// actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Search,
    Report,
    AddScammer,
    ViewReports,
    Broadcast,
}

impl MenuAction {
    pub fn from_text(text: &str) -> Option<MenuAction> {
        use MenuAction::*;
        match text {
            labels::SEARCH => Some(Search),
            labels::REPORT => Some(Report),
            labels::ADD_SCAMMER => Some(AddScammer),
            labels::VIEW_REPORTS => Some(ViewReports),
            labels::BROADCAST => Some(Broadcast),
            _ => None,
        }
    }

    /// True for actions only admins may trigger.
    pub fn admin_only(self) -> bool {
        use MenuAction::*;
        matches!(self, AddScammer | ViewReports | Broadcast)
    }
}
