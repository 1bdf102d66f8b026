use std::{str::FromStr, sync::atomic::AtomicBool};

use chrono::Utc;
pub use sqlx::Error;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, Sqlite,
};
use teloxide::types::{User, UserId};

use crate::types::{NewReport, NewScammer, Proof, Report, ScammerRecord};

type Pool = sqlx::Pool<Sqlite>;
const DB_PATH: &str = "sqlite:scammers.db";
static WAS_CONSTRUCTED: AtomicBool = AtomicBool::new(false);

/// Timestamps are stored as ISO-8601 UTC text with microseconds, the same
/// shape `datetime.utcnow().isoformat()` wrote into existing databases.
fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn decode_proofs(column: Option<String>) -> Vec<Proof> {
    column
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

impl ScammerRecord {
    fn from_sqlite_row(row: SqliteRow) -> ScammerRecord {
        ScammerRecord {
            id: row.get(0),
            name: row.get(1),
            tg_id: row.get(2),
            username: row.get(3),
            description: row.get(4),
            proofs: decode_proofs(row.get(5)),
            verified: row.get(6),
            added_by: UserId(row.get::<i64, _>(7) as u64),
            created_at: row.get(8),
        }
    }
}

impl Report {
    fn from_sqlite_row(row: SqliteRow) -> Report {
        Report {
            id: row.get(0),
            reporter: UserId(row.get::<i64, _>(1) as u64),
            suspect: row.get(2),
            description: row.get(3),
            proofs: decode_proofs(row.get(4)),
            processed: row.get(5),
            created_at: row.get(6),
        }
    }
}

pub struct Database {
    pool: Pool,
}

impl Database {
    pub async fn new() -> Result<Self, Error> {
        assert!(
            !WAS_CONSTRUCTED.swap(true, std::sync::atomic::Ordering::SeqCst),
            "Second database was constructed. This is not allowed."
        );
        Self::open(DB_PATH).await
    }

    async fn open(db_path: &str) -> Result<Self, Error> {
        if !Sqlite::database_exists(db_path).await.unwrap_or(false) {
            Sqlite::create_database(db_path).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                SqliteConnectOptions::from_str(db_path)
                    .unwrap()
                    .pragma("cache_size", "-32768")
                    .busy_timeout(std::time::Duration::from_secs(600)),
            )
            .await?;

        // Do some init. Create the tables...
        // Column layout is kept exactly as the previous incarnation of this
        // bot wrote it, so an existing scammers.db keeps working. That also
        // means no STRICT here.

        // SCAMMERS:
        // id (autoincrement key)
        // name, tg_id, username, description (free text)
        // proofs (JSON array of {"type": "photo"|"video", "file_id": ...})
        // verified (0/1; the only insert path writes 1)
        // added_by (admin user id)
        // created_at (ISO-8601 UTC text)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS scammers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT, tg_id TEXT, username TEXT,
                description TEXT, proofs TEXT,
                verified INTEGER DEFAULT 0, added_by INTEGER,
                created_at TEXT
            );",
        ))
        .await?;

        // REPORTS:
        // id (autoincrement key)
        // reporter (user id), suspect (free text, ID or @handle, unvalidated)
        // description (free text)
        // proofs (JSON, same shape as above)
        // processed (0/1, see unprocessed_reports)
        // created_at (ISO-8601 UTC text)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter INTEGER, suspect TEXT,
                description TEXT, proofs TEXT,
                processed INTEGER DEFAULT 0, created_at TEXT
            );",
        ))
        .await?;

        // USERS: everyone who ever sent /start. Broadcast recipient list.
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT, first_name TEXT, last_name TEXT, added_at TEXT
            );",
        ))
        .await?;

        Ok(Database { pool })
    }

    /// Remember (or refresh) a user as a broadcast recipient.
    /// Last write wins, including the stored handle and names.
    pub async fn upsert_user(&self, user: &User) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO users(user_id, username, first_name, last_name, added_at)
            VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO
            UPDATE SET username=?, first_name=?, last_name=?, added_at=?;",
        )
        .bind(user.id.0 as i64)
        .bind(user.username.as_deref().unwrap_or(""))
        .bind(user.first_name.as_str())
        .bind(user.last_name.as_deref().unwrap_or(""))
        .bind(now_timestamp())
        .bind(user.username.as_deref().unwrap_or(""))
        .bind(user.first_name.as_str())
        .bind(user.last_name.as_deref().unwrap_or(""))
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append a scammer entry. Entries from this path are always verified.
    pub async fn insert_scammer(&self, scammer: &NewScammer, added_by: UserId) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO scammers
                (name, tg_id, username, description, proofs, verified, added_by, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?);",
        )
        .bind(&scammer.name)
        .bind(&scammer.tg_id)
        .bind(&scammer.username)
        .bind(&scammer.description)
        .bind(serde_json::to_string(&scammer.proofs).expect("proofs always serialize"))
        .bind(true)
        .bind(added_by.0 as i64)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append a report, unprocessed.
    pub async fn insert_report(&self, report: &NewReport) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO reports (reporter, suspect, description, proofs, created_at)
                VALUES (?, ?, ?, ?, ?);",
        )
        .bind(report.reporter.0 as i64)
        .bind(&report.suspect)
        .bind(&report.description)
        .bind(serde_json::to_string(&report.proofs).expect("proofs always serialize"))
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All entries whose stored id or handle equals `query`, or whose name
    /// contains it. Insertion order.
    pub async fn find_scammers(&self, query: &str) -> Result<Vec<ScammerRecord>, Error> {
        sqlx::query(
            "SELECT id, name, tg_id, username, description, proofs, verified, added_by, created_at
            FROM scammers WHERE tg_id=? OR username=? OR name LIKE ?;",
        )
        .bind(query)
        .bind(query)
        .bind(format!("%{query}%"))
        .map(ScammerRecord::from_sqlite_row)
        .fetch_all(&self.pool)
        .await
    }

    /// Every report not yet marked processed. Nothing in the bot flips the
    /// flag today; the column is kept for the old data and a future
    /// "mark processed" action.
    pub async fn unprocessed_reports(&self) -> Result<Vec<Report>, Error> {
        sqlx::query(
            "SELECT id, reporter, suspect, description, proofs, processed, created_at
            FROM reports WHERE processed=0;",
        )
        .map(Report::from_sqlite_row)
        .fetch_all(&self.pool)
        .await
    }

    /// Every known user id, for broadcast fan-out.
    pub async fn all_user_ids(&self) -> Result<Vec<UserId>, Error> {
        sqlx::query("SELECT user_id FROM users;")
            .map(|row: SqliteRow| UserId(row.get::<i64, _>(0) as u64))
            .fetch_all(&self.pool)
            .await
    }
}
