use std::fmt::Display;

/// Why a viewer reported a photo.
///
/// The set is closed and ordered; keyboards present the variants in
/// [`ReportReason::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportReason {
    Selfie,
    Porn,
    Stolen,
    Propaganda,
    Violence,
    Hate,
    IllegalAds,
    Other,
}

/// A reason key that is not in the registry. Callers must reject these
/// before anything reaches the decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownReasonError(pub String);

impl Display for UnknownReasonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown report reason: {}", self.0)
    }
}

impl std::error::Error for UnknownReasonError {}

impl ReportReason {
    pub const ALL: [ReportReason; 8] = [
        ReportReason::Selfie,
        ReportReason::Porn,
        ReportReason::Stolen,
        ReportReason::Propaganda,
        ReportReason::Violence,
        ReportReason::Hate,
        ReportReason::IllegalAds,
        ReportReason::Other,
    ];

    /// Stable key used in callback data and in the database.
    #[must_use]
    pub fn as_key(self) -> &'static str {
        match self {
            ReportReason::Selfie => "selfie",
            ReportReason::Porn => "porn",
            ReportReason::Stolen => "stolen",
            ReportReason::Propaganda => "propaganda",
            ReportReason::Violence => "violence",
            ReportReason::Hate => "hate",
            ReportReason::IllegalAds => "illegal_ads",
            ReportReason::Other => "other",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, UnknownReasonError> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_key() == key)
            .ok_or_else(|| UnknownReasonError(key.to_string()))
    }

    /// Short label shown on report keyboards.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ReportReason::Selfie => "Selfie / portrait of the author",
            ReportReason::Porn => "Pornography / 18+ content",
            ReportReason::Stolen => "Stolen work",
            ReportReason::Propaganda => "Propaganda",
            ReportReason::Violence => "Violence",
            ReportReason::Hate => "Hate speech",
            ReportReason::IllegalAds => "Illegal advertising",
            ReportReason::Other => "Other",
        }
    }

    /// Longer sentence used when notifying the photo's owner about a
    /// decision made for this reason. For [`ReportReason::Other`] this is
    /// the generic fallback used when the moderator supplied no text.
    #[must_use]
    pub fn explanation(self) -> &'static str {
        match self {
            ReportReason::Selfie => {
                "The photo is a selfie or a portrait of the author, which is not allowed here."
            }
            ReportReason::Porn => "The photo contains pornographic or 18+ content.",
            ReportReason::Stolen => "The photo appears to be someone else's work.",
            ReportReason::Propaganda => "The photo contains prohibited propaganda.",
            ReportReason::Violence => "The photo contains depictions of violence.",
            ReportReason::Hate => "The photo contains hate speech or incites hostility.",
            ReportReason::IllegalAds => "The photo advertises prohibited goods or services.",
            ReportReason::Other => "The photo violates the community rules.",
        }
    }
}

impl Display for ReportReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Moderation state of a photo, stored as text in the database.
///
/// `DeletedByModerator` is terminal. `BlockedByBan` ends visibility too,
/// but an unban moves such photos back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationStatus {
    Active,
    UnderReview,
    UnderDetailedReview,
    DeletedByModerator,
    BlockedByBan,
}

impl ModerationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationStatus::Active => "active",
            ModerationStatus::UnderReview => "under_review",
            ModerationStatus::UnderDetailedReview => "under_detailed_review",
            ModerationStatus::DeletedByModerator => "deleted_by_moderator",
            ModerationStatus::BlockedByBan => "blocked_by_ban",
        }
    }
}

impl From<&str> for ModerationStatus {
    fn from(value: &str) -> Self {
        use ModerationStatus::*;
        match value {
            "active" => Active,
            "under_review" => UnderReview,
            "under_detailed_review" => UnderDetailedReview,
            "deleted_by_moderator" => DeletedByModerator,
            "blocked_by_ban" => BlockedByBan,
            _ => panic!("Unknown moderation status: {}", value),
        }
    }
}

impl Display for ModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent queues a moderator can pull photos from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Photos pulled from circulation by reports.
    Reports,
    /// Ad hoc spot-checking of photos this moderator hasn't seen yet.
    SelfServe,
    /// Photos escalated for a second, more thorough pass.
    DeepReview,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [
        QueueKind::Reports,
        QueueKind::SelfServe,
        QueueKind::DeepReview,
    ];

    /// Stable tag used in callback data and audit log entries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueueKind::Reports => "queue",
            QueueKind::SelfServe => "self",
            QueueKind::DeepReview => "deep",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            QueueKind::Reports => "Reported photos",
            QueueKind::SelfServe => "Spot-check",
            QueueKind::DeepReview => "Deep review",
        }
    }
}

impl Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long an upload ban lasts. Closed, moderator-selectable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanDuration {
    OneDay,
    ThreeDays,
    SevenDays,
    ThirtyDays,
}

impl BanDuration {
    pub const ALL: [BanDuration; 4] = [
        BanDuration::OneDay,
        BanDuration::ThreeDays,
        BanDuration::SevenDays,
        BanDuration::ThirtyDays,
    ];

    #[must_use]
    pub fn days(self) -> i64 {
        match self {
            BanDuration::OneDay => 1,
            BanDuration::ThreeDays => 3,
            BanDuration::SevenDays => 7,
            BanDuration::ThirtyDays => 30,
        }
    }

    pub fn from_days(days: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.days() == days)
    }
}

/// Why a user account is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Blocked by hand, outside the photo moderation flow.
    ManualBan,
    /// Blocked by a moderator's delete-and-ban decision on a photo.
    UploadBan,
}

/// Typed block reason. The database keeps it as a single text column, so
/// the kind marker is folded into the string only at that boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReason {
    pub kind: BlockKind,
    pub detail: String,
}

impl BlockReason {
    const UPLOAD_BAN_MARKER: &'static str = "UPLOAD_BAN:";
    const MANUAL_BAN_MARKER: &'static str = "MANUAL_BAN:";

    #[must_use]
    pub fn upload_ban(detail: impl Into<String>) -> Self {
        BlockReason {
            kind: BlockKind::UploadBan,
            detail: detail.into(),
        }
    }

    /// Render for the database column.
    #[must_use]
    pub fn encode(&self) -> String {
        let marker = match self.kind {
            BlockKind::ManualBan => Self::MANUAL_BAN_MARKER,
            BlockKind::UploadBan => Self::UPLOAD_BAN_MARKER,
        };
        format!("{}{}", marker, self.detail)
    }

    /// Parse a stored block reason. Strings without a marker are treated
    /// as manual bans so older rows keep their full text as the detail.
    #[must_use]
    pub fn decode(value: &str) -> Self {
        if let Some(detail) = value.strip_prefix(Self::UPLOAD_BAN_MARKER) {
            BlockReason {
                kind: BlockKind::UploadBan,
                detail: detail.to_string(),
            }
        } else if let Some(detail) = value.strip_prefix(Self::MANUAL_BAN_MARKER) {
            BlockReason {
                kind: BlockKind::ManualBan,
                detail: detail.to_string(),
            }
        } else {
            BlockReason {
                kind: BlockKind::ManualBan,
                detail: value.to_string(),
            }
        }
    }
}

/// Verb of an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditVerb {
    Ok,
    Skip,
    Deep,
    Delete,
    Ban,
}

impl AuditVerb {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuditVerb::Ok => "ok",
            AuditVerb::Skip => "skip",
            AuditVerb::Deep => "deep",
            AuditVerb::Delete => "delete",
            AuditVerb::Ban => "ban",
        }
    }
}

/// One moderator decision for the append-only audit log. Rendered as
/// `queue:ban:7:porn`, `self:delete:selfie`, `deep:ok` and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditAction {
    pub queue: QueueKind,
    pub verb: AuditVerb,
    pub reason: Option<ReportReason>,
    pub ban_duration: Option<BanDuration>,
}

impl AuditAction {
    #[must_use]
    pub fn ok(queue: QueueKind) -> Self {
        AuditAction {
            queue,
            verb: AuditVerb::Ok,
            reason: None,
            ban_duration: None,
        }
    }

    #[must_use]
    pub fn skip(queue: QueueKind) -> Self {
        AuditAction {
            queue,
            verb: AuditVerb::Skip,
            reason: None,
            ban_duration: None,
        }
    }

    #[must_use]
    pub fn deep(queue: QueueKind) -> Self {
        AuditAction {
            queue,
            verb: AuditVerb::Deep,
            reason: None,
            ban_duration: None,
        }
    }

    #[must_use]
    pub fn delete(queue: QueueKind, reason: ReportReason) -> Self {
        AuditAction {
            queue,
            verb: AuditVerb::Delete,
            reason: Some(reason),
            ban_duration: None,
        }
    }

    #[must_use]
    pub fn ban(queue: QueueKind, reason: ReportReason, duration: BanDuration) -> Self {
        AuditAction {
            queue,
            verb: AuditVerb::Ban,
            reason: Some(reason),
            ban_duration: Some(duration),
        }
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.queue, self.verb.as_str())?;
        if let Some(duration) = self.ban_duration {
            write!(f, ":{}", duration.days())?;
        }
        if let Some(reason) = self.reason {
            write!(f, ":{}", reason)?;
        }
        Ok(())
    }
}

/// A parsed callback query payload.
///
/// Callback data is a colon-joined string under Telegram's 64-byte limit;
/// photo IDs and tags fit comfortably, so no hashing is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackCommand {
    /// `rate:score:<photo_id>:<score>`
    Score { photo_id: i64, score: u8 },
    /// `rate:skip:<photo_id>`
    SkipPhoto { photo_id: i64 },
    /// `rate:next`
    NextForRating,
    /// `rate:report:<photo_id>` — show the reason keyboard.
    ReportMenu { photo_id: i64 },
    /// `rate:reportr:<photo_id>:<reason>` — file the report.
    Report {
        photo_id: i64,
        reason: ReportReason,
    },
    /// `mod:next:<queue>`
    NextForModeration { queue: QueueKind },
    /// `mod:ok:<queue>:<photo_id>`
    Approve { queue: QueueKind, photo_id: i64 },
    /// `mod:skip:<queue>:<photo_id>`
    ModSkip { queue: QueueKind, photo_id: i64 },
    /// `mod:deep:<queue>:<photo_id>` — escalate for deep review.
    Escalate { queue: QueueKind, photo_id: i64 },
    /// `mod:del:<queue>:<photo_id>` — show the reason keyboard.
    DeleteMenu { queue: QueueKind, photo_id: i64 },
    /// `mod:delr:<queue>:<photo_id>:<reason>` — delete the photo.
    Delete {
        queue: QueueKind,
        photo_id: i64,
        reason: ReportReason,
    },
    /// `mod:ban:<queue>:<photo_id>` — show the reason keyboard.
    BanMenu { queue: QueueKind, photo_id: i64 },
    /// `mod:banr:<queue>:<photo_id>:<reason>` — show the duration keyboard.
    BanReasonChosen {
        queue: QueueKind,
        photo_id: i64,
        reason: ReportReason,
    },
    /// `mod:band:<queue>:<photo_id>:<reason>:<days>` — delete and ban.
    Ban {
        queue: QueueKind,
        photo_id: i64,
        reason: ReportReason,
        duration: BanDuration,
    },
}

type ParseError = Box<dyn std::error::Error + Send + Sync>;

fn parse_photo_id(value: Option<&str>) -> Result<i64, ParseError> {
    value
        .ok_or("No photo ID")?
        .parse()
        .map_err(|_| "Failed to parse photo ID".into())
}

fn parse_queue(value: Option<&str>) -> Result<QueueKind, ParseError> {
    let tag = value.ok_or("No queue tag")?;
    QueueKind::from_str(tag).ok_or_else(|| format!("Unknown queue tag: {tag}").into())
}

fn parse_reason(value: Option<&str>) -> Result<ReportReason, ParseError> {
    Ok(ReportReason::from_key(value.ok_or("No reason key")?)?)
}

impl CallbackCommand {
    pub fn parse(data: &str) -> Result<Self, ParseError> {
        let mut iter = data.split(':');
        let namespace = iter.next().ok_or("Empty callback data")?;
        let action = iter.next().ok_or("No action in callback data")?;

        let command = match (namespace, action) {
            ("rate", "score") => {
                let photo_id = parse_photo_id(iter.next())?;
                let score: u8 = iter
                    .next()
                    .ok_or("No score")?
                    .parse()
                    .map_err(|_| "Failed to parse score")?;
                if !(1..=10).contains(&score) {
                    Err("Score out of range")?;
                }
                CallbackCommand::Score { photo_id, score }
            }
            ("rate", "skip") => CallbackCommand::SkipPhoto {
                photo_id: parse_photo_id(iter.next())?,
            },
            ("rate", "next") => CallbackCommand::NextForRating,
            ("rate", "report") => CallbackCommand::ReportMenu {
                photo_id: parse_photo_id(iter.next())?,
            },
            ("rate", "reportr") => CallbackCommand::Report {
                photo_id: parse_photo_id(iter.next())?,
                reason: parse_reason(iter.next())?,
            },
            ("mod", "next") => CallbackCommand::NextForModeration {
                queue: parse_queue(iter.next())?,
            },
            ("mod", "ok") => CallbackCommand::Approve {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
            },
            ("mod", "skip") => CallbackCommand::ModSkip {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
            },
            ("mod", "deep") => CallbackCommand::Escalate {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
            },
            ("mod", "del") => CallbackCommand::DeleteMenu {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
            },
            ("mod", "delr") => CallbackCommand::Delete {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
                reason: parse_reason(iter.next())?,
            },
            ("mod", "ban") => CallbackCommand::BanMenu {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
            },
            ("mod", "banr") => CallbackCommand::BanReasonChosen {
                queue: parse_queue(iter.next())?,
                photo_id: parse_photo_id(iter.next())?,
                reason: parse_reason(iter.next())?,
            },
            ("mod", "band") => {
                let queue = parse_queue(iter.next())?;
                let photo_id = parse_photo_id(iter.next())?;
                let reason = parse_reason(iter.next())?;
                let days: i64 = iter
                    .next()
                    .ok_or("No ban duration")?
                    .parse()
                    .map_err(|_| "Failed to parse ban duration")?;
                let duration =
                    BanDuration::from_days(days).ok_or("Ban duration outside the allowed set")?;
                CallbackCommand::Ban {
                    queue,
                    photo_id,
                    reason,
                    duration,
                }
            }
            _ => Err("Unknown action type")?,
        };

        if iter.next().is_some() {
            Err("Extraneous data in callback")?;
        }

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn reason_keys_roundtrip() {
        for reason in ReportReason::ALL {
            assert_eq!(ReportReason::from_key(reason.as_key()).unwrap(), reason);
        }
        let err = ReportReason::from_key("spam_calls").unwrap_err();
        assert_eq!(err, UnknownReasonError("spam_calls".to_string()));
    }

    #[test]
    fn block_reason_encoding() {
        let reason = BlockReason::upload_ban("The photo contains pornographic or 18+ content.");
        let encoded = reason.encode();
        assert!(encoded.starts_with("UPLOAD_BAN:"));
        assert_eq!(BlockReason::decode(&encoded), reason);

        // Rows written before the marker existed decode as manual bans.
        let legacy = BlockReason::decode("rude in comments");
        assert_eq!(legacy.kind, BlockKind::ManualBan);
        assert_eq!(legacy.detail, "rude in comments");
    }

    #[test]
    fn audit_action_rendering() {
        assert_eq!(AuditAction::ok(QueueKind::Reports).to_string(), "queue:ok");
        assert_eq!(
            AuditAction::delete(QueueKind::SelfServe, ReportReason::Selfie).to_string(),
            "self:delete:selfie"
        );
        assert_eq!(
            AuditAction::ban(
                QueueKind::Reports,
                ReportReason::Porn,
                BanDuration::SevenDays
            )
            .to_string(),
            "queue:ban:7:porn"
        );
        assert_eq!(
            AuditAction::deep(QueueKind::Reports).to_string(),
            "queue:deep"
        );
    }

    #[test]
    fn ban_durations_are_a_closed_set() {
        assert_eq!(BanDuration::from_days(3), Some(BanDuration::ThreeDays));
        assert_eq!(BanDuration::from_days(2), None);
        assert_eq!(BanDuration::from_days(0), None);
        let days: Vec<i64> = BanDuration::ALL.iter().map(|d| d.days()).collect();
        assert_eq!(days, vec![1, 3, 7, 30]);
    }

    #[test]
    fn callback_parsing() {
        assert_eq!(
            CallbackCommand::parse("rate:reportr:42:porn").unwrap(),
            CallbackCommand::Report {
                photo_id: 42,
                reason: ReportReason::Porn
            }
        );
        assert_eq!(
            CallbackCommand::parse("mod:band:queue:42:hate:30").unwrap(),
            CallbackCommand::Ban {
                queue: QueueKind::Reports,
                photo_id: 42,
                reason: ReportReason::Hate,
                duration: BanDuration::ThirtyDays,
            }
        );
        assert_eq!(
            CallbackCommand::parse("mod:next:deep").unwrap(),
            CallbackCommand::NextForModeration {
                queue: QueueKind::DeepReview
            }
        );

        assert!(CallbackCommand::parse("mod:band:queue:42:hate:2").is_err());
        assert!(CallbackCommand::parse("rate:reportr:42:nonsense").is_err());
        assert!(CallbackCommand::parse("rate:score:42:11").is_err());
        assert!(CallbackCommand::parse("mod:ok:queue:42:junk").is_err());
        assert!(CallbackCommand::parse("").is_err());
    }
}
