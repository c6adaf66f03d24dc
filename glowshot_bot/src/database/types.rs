use chrono::{DateTime, Utc};

use crate::types::ModerationStatus;

/// A database row describing a user account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Internal ID of the row.
    pub id: i64,
    /// Telegram user ID.
    pub tg_id: i64,
    pub username: Option<String>,
    pub name: Option<String>,
    pub is_blocked: bool,
    /// Encoded block reason; decode with [`BlockReason::decode`].
    ///
    /// [`BlockReason::decode`]: crate::types::BlockReason::decode
    pub block_reason: Option<String>,
    /// When the block lapses. `None` means indefinite.
    pub block_until: Option<DateTime<Utc>>,
}

/// A database row describing a photo.
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub id: i64,
    /// Internal ID of the owner's user row.
    pub user_id: i64,
    /// Chat the photo was originally posted in. Cards are produced by
    /// copying that message, so no file IDs are stored.
    pub src_chat_id: i64,
    pub src_message_id: i64,
    pub caption: Option<String>,
    pub is_deleted: bool,
    pub moderation_status: ModerationStatus,
}

/// A database row describing one complaint against a photo.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub id: i64,
    pub photo_id: i64,
    /// Internal ID of the reporter's user row.
    pub user_id: i64,
    pub reason: String,
    pub details: Option<String>,
    /// `pending` until a moderator acts on the photo.
    pub status: String,
}
