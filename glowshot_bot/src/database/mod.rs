mod types;

use std::{
    str::FromStr,
    sync::{atomic::AtomicBool, Arc},
};

use chrono::{DateTime, Utc};
pub use sqlx::Error;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, Sqlite,
};

pub use self::types::{PhotoRecord, ReportRecord, UserRecord};
use crate::{
    moderation::ReportStats,
    types::{AuditAction, BlockReason, ModerationStatus, QueueKind, ReportReason},
};

type Pool = sqlx::Pool<Sqlite>;
const DB_PATH: &str = "sqlite:glowshot.sqlite";
static WAS_CONSTRUCTED: AtomicBool = AtomicBool::new(false);

pub struct Database {
    pool: Pool,
}

fn photo_from_row(row: SqliteRow) -> PhotoRecord {
    PhotoRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        src_chat_id: row.get("src_chat_id"),
        src_message_id: row.get("src_message_id"),
        caption: row.get("caption"),
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        moderation_status: ModerationStatus::from(row.get::<&str, _>("moderation_status")),
    }
}

fn user_from_row(row: SqliteRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        tg_id: row.get("tg_id"),
        username: row.get("username"),
        name: row.get("name"),
        is_blocked: row.get::<i64, _>("is_blocked") != 0,
        block_reason: row.get("block_reason"),
        // A malformed stored timestamp just means "no deadline".
        block_until: row
            .get::<Option<String>, _>("block_until")
            .and_then(|raw| parse_stored_time(&raw)),
    }
}

fn report_from_row(row: SqliteRow) -> ReportRecord {
    ReportRecord {
        id: row.get("id"),
        photo_id: row.get("photo_id"),
        user_id: row.get("user_id"),
        reason: row.get("reason"),
        details: row.get("details"),
        status: row.get("status"),
    }
}

fn parse_stored_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Database {
    pub async fn new() -> Result<Arc<Database>, Error> {
        assert!(
            !WAS_CONSTRUCTED.swap(true, std::sync::atomic::Ordering::SeqCst),
            "Second database was constructed. This is not allowed."
        );

        if !Sqlite::database_exists(DB_PATH).await.unwrap_or(false) {
            Sqlite::create_database(DB_PATH).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                SqliteConnectOptions::from_str(DB_PATH)
                    .unwrap()
                    .pragma("cache_size", "-32768")
                    .busy_timeout(std::time::Duration::from_secs(600)),
            )
            .await?;

        let db = Database { pool };
        db.init_schema().await?;
        Ok(Arc::new(db))
    }

    /// In-memory database for tests. Single connection, same schema.
    #[cfg(test)]
    pub(crate) async fn new_in_memory() -> Result<Database, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:").unwrap())
            .await?;
        let db = Database { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), Error> {
        self.pool
            .execute(sqlx::query(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY,
                    tg_id INTEGER NOT NULL UNIQUE,
                    username TEXT NULL,
                    name TEXT NULL,
                    is_blocked INTEGER NOT NULL DEFAULT 0,
                    block_reason TEXT NULL,
                    block_until TEXT NULL
                ) STRICT;",
            ))
            .await?;

        self.pool
            .execute(sqlx::query(
                "
                CREATE TABLE IF NOT EXISTS photos (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    src_chat_id INTEGER NOT NULL,
                    src_message_id INTEGER NOT NULL,
                    caption TEXT NULL,
                    is_deleted INTEGER NOT NULL DEFAULT 0,
                    moderation_status TEXT NOT NULL DEFAULT 'active',
                    created_at TEXT NOT NULL
                ) STRICT;",
            ))
            .await?;

        self.pool
            .execute(sqlx::query(
                "
                CREATE TABLE IF NOT EXISTS reports (
                    id INTEGER PRIMARY KEY,
                    photo_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    details TEXT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL
                ) STRICT;",
            ))
            .await?;

        self.pool
            .execute(sqlx::query(
                "
                CREATE TABLE IF NOT EXISTS ratings (
                    id INTEGER PRIMARY KEY,
                    photo_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    score INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(photo_id, user_id)
                ) STRICT;",
            ))
            .await?;

        // Append-only audit of moderator decisions. Never updated or
        // deleted; also serves as the per-moderator seen-set for the
        // spot-check queue.
        self.pool
            .execute(sqlx::query(
                "
                CREATE TABLE IF NOT EXISTS moderation_log (
                    id INTEGER PRIMARY KEY,
                    moderator_tg_id INTEGER NOT NULL,
                    photo_id INTEGER NOT NULL,
                    action TEXT NOT NULL,
                    note TEXT NULL,
                    created_at TEXT NOT NULL
                ) STRICT;",
            ))
            .await?;

        Ok(())
    }

    // -------------------- users --------------------

    /// Insert or refresh a user row, returning its internal ID.
    pub async fn upsert_user(
        &self,
        tg_id: i64,
        username: Option<&str>,
        name: Option<&str>,
    ) -> Result<i64, Error> {
        sqlx::query(
            "INSERT INTO users(tg_id, username, name)
            VALUES (?, ?, ?)
        ON CONFLICT(tg_id) DO
            UPDATE SET username=excluded.username, name=excluded.name
        RETURNING id;",
        )
        .bind(tg_id)
        .bind(username)
        .bind(name)
        .map(|row: SqliteRow| row.get::<i64, _>("id"))
        .fetch_one(&self.pool)
        .await
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>, Error> {
        sqlx::query("SELECT * FROM users WHERE id=?;")
            .bind(id)
            .map(user_from_row)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn user_by_tg_id(&self, tg_id: i64) -> Result<Option<UserRecord>, Error> {
        sqlx::query("SELECT * FROM users WHERE tg_id=?;")
            .bind(tg_id)
            .map(user_from_row)
            .fetch_optional(&self.pool)
            .await
    }

    /// Set or clear a user's block. The typed reason is string-encoded
    /// here, at the database boundary.
    pub async fn set_user_block(
        &self,
        user_id: i64,
        is_blocked: bool,
        reason: Option<&BlockReason>,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE users SET is_blocked=?, block_reason=?, block_until=? WHERE id=?;")
            .bind(is_blocked)
            .bind(reason.map(BlockReason::encode))
            .bind(until.map(|dt| dt.to_rfc3339()))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -------------------- photos --------------------

    /// Record a freshly posted photo, returning its ID.
    pub async fn add_photo(
        &self,
        user_id: i64,
        src_chat_id: i64,
        src_message_id: i64,
        caption: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64, Error> {
        sqlx::query(
            "INSERT INTO photos(user_id, src_chat_id, src_message_id, caption, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id;",
        )
        .bind(user_id)
        .bind(src_chat_id)
        .bind(src_message_id)
        .bind(caption)
        .bind(now.to_rfc3339())
        .map(|row: SqliteRow| row.get::<i64, _>("id"))
        .fetch_one(&self.pool)
        .await
    }

    pub async fn photo_by_id(&self, photo_id: i64) -> Result<Option<PhotoRecord>, Error> {
        sqlx::query("SELECT * FROM photos WHERE id=?;")
            .bind(photo_id)
            .map(photo_from_row)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn set_photo_status(
        &self,
        photo_id: i64,
        status: ModerationStatus,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE photos SET moderation_status=? WHERE id=?;")
            .bind(status.as_str())
            .bind(photo_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_photo_deleted(&self, photo_id: i64) -> Result<(), Error> {
        sqlx::query("UPDATE photos SET is_deleted=1 WHERE id=?;")
            .bind(photo_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pull all of a user's currently active photos out of circulation.
    /// Returns how many rows changed.
    pub async fn hide_active_photos_for_user(
        &self,
        user_id: i64,
        new_status: ModerationStatus,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE photos SET moderation_status=?
            WHERE user_id=? AND is_deleted=0 AND moderation_status='active';",
        )
        .bind(new_status.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Move a user's photos from one status to another. Used on unban so
    /// that only photos hidden by the ban itself are restored.
    pub async fn restore_photos_from_status(
        &self,
        user_id: i64,
        from_status: ModerationStatus,
        to_status: ModerationStatus,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE photos SET moderation_status=?
            WHERE user_id=? AND is_deleted=0 AND moderation_status=?;",
        )
        .bind(to_status.as_str())
        .bind(user_id)
        .bind(from_status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// A random active photo for the viewer to rate: not their own, not
    /// one they rated already, and never one pulled for review.
    pub async fn next_photo_for_rating(
        &self,
        viewer_user_id: i64,
    ) -> Result<Option<PhotoRecord>, Error> {
        sqlx::query(
            "SELECT * FROM photos
            WHERE moderation_status='active' AND is_deleted=0 AND user_id<>?
                AND id NOT IN (SELECT photo_id FROM ratings WHERE user_id=?)
            ORDER BY RANDOM() LIMIT 1;",
        )
        .bind(viewer_user_id)
        .bind(viewer_user_id)
        .map(photo_from_row)
        .fetch_optional(&self.pool)
        .await
    }

    /// Next photo for a moderator, per queue. `None` means the queue is
    /// exhausted, which is a normal answer.
    pub async fn next_queue_photo(
        &self,
        queue: QueueKind,
        moderator_tg_id: i64,
    ) -> Result<Option<PhotoRecord>, Error> {
        let query = match queue {
            QueueKind::Reports => sqlx::query(
                "SELECT * FROM photos
                WHERE moderation_status='under_review' AND is_deleted=0
                ORDER BY id LIMIT 1;",
            ),
            QueueKind::SelfServe => sqlx::query(
                "SELECT * FROM photos
                WHERE moderation_status='active' AND is_deleted=0
                    AND id NOT IN
                        (SELECT photo_id FROM moderation_log WHERE moderator_tg_id=?)
                ORDER BY id LIMIT 1;",
            )
            .bind(moderator_tg_id),
            QueueKind::DeepReview => sqlx::query(
                "SELECT * FROM photos
                WHERE moderation_status='under_detailed_review' AND is_deleted=0
                ORDER BY id LIMIT 1;",
            ),
        };

        query.map(photo_from_row).fetch_optional(&self.pool).await
    }

    // -------------------- ratings --------------------

    /// Record a score, overwriting the viewer's previous score if any.
    pub async fn add_rating(
        &self,
        photo_id: i64,
        user_id: i64,
        score: u8,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO ratings(photo_id, user_id, score, created_at)
            VALUES (?, ?, ?, ?)
        ON CONFLICT(photo_id, user_id) DO
            UPDATE SET score=excluded.score;",
        )
        .bind(photo_id)
        .bind(user_id)
        .bind(i64::from(score))
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -------------------- reports --------------------

    pub async fn create_report(
        &self,
        photo_id: i64,
        reporter_user_id: i64,
        reason: ReportReason,
        details: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO reports(photo_id, user_id, reason, details, created_at)
            VALUES (?, ?, ?, ?, ?);",
        )
        .bind(photo_id)
        .bind(reporter_user_id)
        .bind(reason.as_key())
        .bind(details)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fresh report counts for one photo. Queried right before every
    /// threshold decision; never cached.
    pub async fn report_stats(&self, photo_id: i64) -> Result<ReportStats, Error> {
        sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN status='pending' THEN 1 ELSE 0 END), 0) AS total_pending,
                COUNT(*) AS total_all
            FROM reports WHERE photo_id=?;",
        )
        .bind(photo_id)
        .map(|row: SqliteRow| ReportStats {
            photo_id,
            total_pending: row.get::<i64, _>("total_pending") as u32,
            total_all: row.get::<i64, _>("total_all") as u32,
        })
        .fetch_one(&self.pool)
        .await
    }

    /// Timestamps of the reporter's most recent reports, newest first,
    /// for the rate limiter. Malformed stored timestamps are silently
    /// discarded rather than failing the whole check.
    pub async fn recent_report_times(
        &self,
        reporter_user_id: i64,
    ) -> Result<Vec<DateTime<Utc>>, Error> {
        let raw: Vec<String> =
            sqlx::query("SELECT created_at FROM reports WHERE user_id=? ORDER BY id DESC LIMIT 50;")
                .bind(reporter_user_id)
                .map(|row: SqliteRow| row.get::<String, _>("created_at"))
                .fetch_all(&self.pool)
                .await?;

        Ok(raw.iter().filter_map(|s| parse_stored_time(s)).collect())
    }

    /// Close out every pending report on a photo. Happens when a moderator
    /// acts on it, whatever the verdict.
    pub async fn resolve_reports_for_photo(&self, photo_id: i64) -> Result<u64, Error> {
        let result =
            sqlx::query("UPDATE reports SET status='resolved' WHERE photo_id=? AND status='pending';")
                .bind(photo_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// The newest unresolved report on a photo, for the moderator card.
    pub async fn latest_pending_report(
        &self,
        photo_id: i64,
    ) -> Result<Option<ReportRecord>, Error> {
        sqlx::query("SELECT * FROM reports WHERE photo_id=? AND status='pending' ORDER BY id DESC LIMIT 1;")
            .bind(photo_id)
            .map(report_from_row)
            .fetch_optional(&self.pool)
            .await
    }

    // -------------------- audit --------------------

    /// Append one decision to the audit log. Write-once; nothing ever
    /// updates or deletes these rows.
    pub async fn append_moderation_log(
        &self,
        moderator_tg_id: i64,
        photo_id: i64,
        action: &AuditAction,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO moderation_log(moderator_tg_id, photo_id, action, note, created_at)
            VALUES (?, ?, ?, ?, ?);",
        )
        .bind(moderator_tg_id)
        .bind(photo_id)
        .bind(action.to_string())
        .bind(note)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn seed_photo(db: &Database, owner_tg_id: i64) -> (i64, i64) {
        let user_id = db.upsert_user(owner_tg_id, None, None).await.unwrap();
        let photo_id = db
            .add_photo(user_id, -100123, 555, Some("sunset"), Utc::now())
            .await
            .unwrap();
        (user_id, photo_id)
    }

    #[tokio::test]
    async fn report_stats_distinguish_pending_from_all() {
        let db = Database::new_in_memory().await.unwrap();
        let (_, photo_id) = seed_photo(&db, 100).await;
        let reporter = db.upsert_user(200, None, None).await.unwrap();

        let now = Utc::now();
        db.create_report(photo_id, reporter, ReportReason::Porn, Some("nsfw"), now)
            .await
            .unwrap();
        db.create_report(photo_id, reporter, ReportReason::Other, None, now)
            .await
            .unwrap();

        let stats = db.report_stats(photo_id).await.unwrap();
        assert_eq!(stats.total_pending, 2);
        assert_eq!(stats.total_all, 2);

        assert_eq!(db.resolve_reports_for_photo(photo_id).await.unwrap(), 2);

        let stats = db.report_stats(photo_id).await.unwrap();
        assert_eq!(stats.total_pending, 0);
        assert_eq!(stats.total_all, 2);
    }

    #[tokio::test]
    async fn malformed_report_timestamps_are_discarded() {
        let db = Database::new_in_memory().await.unwrap();
        let (_, photo_id) = seed_photo(&db, 100).await;
        let reporter = db.upsert_user(200, None, None).await.unwrap();

        db.create_report(photo_id, reporter, ReportReason::Hate, None, Utc::now())
            .await
            .unwrap();
        // A row with a timestamp nothing can parse.
        sqlx::query(
            "INSERT INTO reports(photo_id, user_id, reason, details, created_at)
            VALUES (?, ?, 'other', NULL, 'yesterday-ish');",
        )
        .bind(photo_id)
        .bind(reporter)
        .execute(&db.pool)
        .await
        .unwrap();

        let times = db.recent_report_times(reporter).await.unwrap();
        assert_eq!(times.len(), 1);
    }

    #[tokio::test]
    async fn queues_are_independent_and_exhaustible() {
        let db = Database::new_in_memory().await.unwrap();
        let (_, reported) = seed_photo(&db, 100).await;
        let (_, escalated) = seed_photo(&db, 101).await;
        let (_, active) = seed_photo(&db, 102).await;

        db.set_photo_status(reported, ModerationStatus::UnderReview)
            .await
            .unwrap();
        db.set_photo_status(escalated, ModerationStatus::UnderDetailedReview)
            .await
            .unwrap();

        let moderator = 999;

        let next = db
            .next_queue_photo(QueueKind::Reports, moderator)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, reported);

        let next = db
            .next_queue_photo(QueueKind::DeepReview, moderator)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, escalated);

        let next = db
            .next_queue_photo(QueueKind::SelfServe, moderator)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, active);

        // Once this moderator has logged a look at the photo, the
        // spot-check queue no longer serves it to them.
        db.append_moderation_log(
            moderator,
            active,
            &AuditAction::skip(QueueKind::SelfServe),
            None,
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(db
            .next_queue_photo(QueueKind::SelfServe, moderator)
            .await
            .unwrap()
            .is_none());
        // A different moderator still gets it.
        assert!(db
            .next_queue_photo(QueueKind::SelfServe, moderator + 1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn photos_under_review_leave_the_rating_queue() {
        let db = Database::new_in_memory().await.unwrap();
        let (_, photo_id) = seed_photo(&db, 100).await;
        let viewer = db.upsert_user(200, None, None).await.unwrap();

        assert!(db.next_photo_for_rating(viewer).await.unwrap().is_some());

        db.set_photo_status(photo_id, ModerationStatus::UnderReview)
            .await
            .unwrap();
        assert!(db.next_photo_for_rating(viewer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn own_and_already_rated_photos_are_not_served() {
        let db = Database::new_in_memory().await.unwrap();
        let (owner_id, photo_id) = seed_photo(&db, 100).await;
        let viewer = db.upsert_user(200, None, None).await.unwrap();

        assert!(db.next_photo_for_rating(owner_id).await.unwrap().is_none());

        db.add_rating(photo_id, viewer, 8, Utc::now()).await.unwrap();
        assert!(db.next_photo_for_rating(viewer).await.unwrap().is_none());
    }
}
