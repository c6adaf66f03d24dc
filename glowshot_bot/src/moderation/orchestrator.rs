//! Applies a moderator's verdict to a photo and its author.
//!
//! The decision itself is the source of truth: every database write, audit
//! append and notification is attempted independently, and a failed side
//! effect never rolls the decision back. Failures are collected in
//! [`DecisionOutcome::side_effect_errors`] so the handler can log them.
//! `success` flips to `false` only when the photo cannot be fetched at all.

use chrono::{DateTime, Duration, Utc};

use crate::{
    database::Database,
    types::{AuditAction, BanDuration, BlockReason, ModerationStatus, QueueKind, ReportReason},
};

/// What the moderator chose for the photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The photo is fine; put it back into circulation.
    Approve,
    /// Remove the photo, keep the author unharmed.
    Delete { reason: ReportReason },
    /// Remove the photo and ban the author from uploading. Always implies
    /// the delete steps.
    Ban {
        reason: ReportReason,
        duration: BanDuration,
    },
}

/// One decision event.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub queue: QueueKind,
    pub moderator_tg_id: i64,
    pub photo_id: i64,
    pub verdict: Verdict,
    /// Moderator-supplied free text shown to the author instead of the
    /// canned explanation. Mostly useful with [`ReportReason::Other`].
    pub custom_text: Option<String>,
}

/// A courtesy message for the author. Produced here, sent by the handler
/// layer fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient_tg_id: i64,
    pub text: String,
}

/// Result of applying a decision.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    /// `false` only when the photo could not be found.
    pub success: bool,
    /// Human-readable summary for the moderator.
    pub message: String,
    pub notifications: Vec<Notification>,
    pub side_effect_errors: Vec<String>,
}

impl DecisionOutcome {
    fn not_found(photo_id: i64) -> Self {
        DecisionOutcome {
            success: false,
            message: format!("Photo {photo_id} is gone. Pulling the next one."),
            notifications: Vec::new(),
            side_effect_errors: Vec::new(),
        }
    }

    fn succeeded(message: String) -> Self {
        DecisionOutcome {
            success: true,
            message,
            notifications: Vec::new(),
            side_effect_errors: Vec::new(),
        }
    }

    fn absorb<T>(&mut self, what: &str, result: Result<T, crate::database::Error>) {
        if let Err(e) = result {
            self.side_effect_errors.push(format!("{what}: {e}"));
        }
    }
}

/// The explanation shown to the author: the moderator's own words if any,
/// the canned sentence for the reason otherwise. `Other` without custom
/// text falls back to its generic explanation.
#[must_use]
pub fn explanation_text(reason: ReportReason, custom: Option<&str>) -> String {
    match custom.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => reason.explanation().to_string(),
    }
}

/// Apply a moderator's verdict.
pub async fn apply_decision(
    db: &Database,
    input: &DecisionInput,
    now: DateTime<Utc>,
) -> DecisionOutcome {
    let photo = match db.photo_by_id(input.photo_id).await {
        Ok(Some(photo)) => photo,
        Ok(None) => return DecisionOutcome::not_found(input.photo_id),
        Err(e) => {
            log::warn!("Failed to fetch photo {} for a decision: {e}", input.photo_id);
            return DecisionOutcome::not_found(input.photo_id);
        }
    };

    match input.verdict {
        Verdict::Approve => {
            let mut outcome =
                DecisionOutcome::succeeded("Photo approved and back in rotation.".to_string());

            outcome.absorb(
                "set status",
                db.set_photo_status(photo.id, ModerationStatus::Active).await,
            );
            outcome.absorb(
                "resolve reports",
                db.resolve_reports_for_photo(photo.id).await,
            );
            outcome.absorb(
                "audit",
                db.append_moderation_log(
                    input.moderator_tg_id,
                    photo.id,
                    &AuditAction::ok(input.queue),
                    None,
                    now,
                )
                .await,
            );
            outcome
        }
        Verdict::Delete { reason } => {
            let mut outcome =
                DecisionOutcome::succeeded("Photo deleted and out of rotation.".to_string());
            let explanation = explanation_text(reason, input.custom_text.as_deref());

            delete_photo_steps(db, &mut outcome, photo.id).await;
            push_author_notification(
                db,
                &mut outcome,
                photo.user_id,
                format!(
                    "Your photo was removed by a moderator and no longer takes part in rating.\n\n\
                    Reason: {}\n{}",
                    reason.label(),
                    explanation
                ),
            )
            .await;
            outcome.absorb(
                "audit",
                db.append_moderation_log(
                    input.moderator_tg_id,
                    photo.id,
                    &AuditAction::delete(input.queue, reason),
                    input.custom_text.as_deref(),
                    now,
                )
                .await,
            );
            outcome
        }
        Verdict::Ban { reason, duration } => {
            let mut outcome = DecisionOutcome::succeeded(format!(
                "Photo deleted, author banned for {} day(s).",
                duration.days()
            ));
            let explanation = explanation_text(reason, input.custom_text.as_deref());
            let until = now + Duration::days(duration.days());

            delete_photo_steps(db, &mut outcome, photo.id).await;

            outcome.absorb(
                "block author",
                db.set_user_block(
                    photo.user_id,
                    true,
                    Some(&BlockReason::upload_ban(explanation.clone())),
                    Some(until),
                )
                .await,
            );
            // The ban must bite immediately: everything the author has in
            // rotation goes dark too, not just the reported photo.
            outcome.absorb(
                "hide author's photos",
                db.hide_active_photos_for_user(photo.user_id, ModerationStatus::BlockedByBan)
                    .await,
            );

            push_author_notification(
                db,
                &mut outcome,
                photo.user_id,
                format!(
                    "Your photo was removed by a moderator, and uploading new photos is \
                    restricted for {} day(s) (until {}).\n\n\
                    Reason: {}\n{}",
                    duration.days(),
                    until.format("%Y-%m-%d %H:%M UTC"),
                    reason.label(),
                    explanation
                ),
            )
            .await;

            outcome.absorb(
                "audit",
                db.append_moderation_log(
                    input.moderator_tg_id,
                    photo.id,
                    &AuditAction::ban(input.queue, reason, duration),
                    input.custom_text.as_deref(),
                    now,
                )
                .await,
            );
            outcome
        }
    }
}

async fn delete_photo_steps(db: &Database, outcome: &mut DecisionOutcome, photo_id: i64) {
    outcome.absorb("mark deleted", db.mark_photo_deleted(photo_id).await);
    outcome.absorb(
        "set status",
        db.set_photo_status(photo_id, ModerationStatus::DeletedByModerator)
            .await,
    );
    outcome.absorb("resolve reports", db.resolve_reports_for_photo(photo_id).await);
}

async fn push_author_notification(
    db: &Database,
    outcome: &mut DecisionOutcome,
    author_user_id: i64,
    text: String,
) {
    match db.user_by_id(author_user_id).await {
        Ok(Some(author)) => outcome.notifications.push(Notification {
            recipient_tg_id: author.tg_id,
            text,
        }),
        Ok(None) => outcome
            .side_effect_errors
            .push(format!("notify author: user {author_user_id} not found")),
        Err(e) => outcome
            .side_effect_errors
            .push(format!("notify author: {e}")),
    }
}

/// Send a photo for the second, more thorough pass.
pub async fn escalate_photo(
    db: &Database,
    queue: QueueKind,
    moderator_tg_id: i64,
    photo_id: i64,
    now: DateTime<Utc>,
) -> DecisionOutcome {
    match db.photo_by_id(photo_id).await {
        Ok(Some(_)) => {}
        Ok(None) | Err(_) => return DecisionOutcome::not_found(photo_id),
    }

    let mut outcome = DecisionOutcome::succeeded("Photo queued for deep review.".to_string());
    outcome.absorb(
        "set status",
        db.set_photo_status(photo_id, ModerationStatus::UnderDetailedReview)
            .await,
    );
    outcome.absorb(
        "audit",
        db.append_moderation_log(moderator_tg_id, photo_id, &AuditAction::deep(queue), None, now)
            .await,
    );
    outcome
}

/// Lift an upload ban. Only photos hidden by the ban mechanism itself come
/// back; photos removed for unrelated reasons stay where they are.
pub async fn unban_user(db: &Database, user_id: i64) -> Result<u64, crate::database::Error> {
    db.set_user_block(user_id, false, None, None).await?;
    db.restore_photos_from_status(
        user_id,
        ModerationStatus::BlockedByBan,
        ModerationStatus::Active,
    )
    .await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::BlockKind;

    const MODERATOR: i64 = 999;

    struct Fixture {
        db: Database,
        author_id: i64,
        reported: i64,
        other_active: i64,
    }

    async fn fixture() -> Fixture {
        let db = Database::new_in_memory().await.unwrap();
        let author_id = db.upsert_user(100, Some("author"), None).await.unwrap();
        let now = Utc::now();
        let reported = db
            .add_photo(author_id, -100123, 1, Some("first"), now)
            .await
            .unwrap();
        let other_active = db
            .add_photo(author_id, -100123, 2, Some("second"), now)
            .await
            .unwrap();
        Fixture {
            db,
            author_id,
            reported,
            other_active,
        }
    }

    fn input(queue: QueueKind, photo_id: i64, verdict: Verdict) -> DecisionInput {
        DecisionInput {
            queue,
            moderator_tg_id: MODERATOR,
            photo_id,
            verdict,
            custom_text: None,
        }
    }

    #[tokio::test]
    async fn ban_hides_all_active_photos() {
        let f = fixture().await;
        let outcome = apply_decision(
            &f.db,
            &input(
                QueueKind::Reports,
                f.reported,
                Verdict::Ban {
                    reason: ReportReason::Porn,
                    duration: BanDuration::ThreeDays,
                },
            ),
            Utc::now(),
        )
        .await;

        assert!(outcome.success);
        assert!(outcome.side_effect_errors.is_empty());

        let reported = f.db.photo_by_id(f.reported).await.unwrap().unwrap();
        assert!(reported.is_deleted);
        assert_eq!(
            reported.moderation_status,
            ModerationStatus::DeletedByModerator
        );

        // The author's other photo left rotation too.
        let other = f.db.photo_by_id(f.other_active).await.unwrap().unwrap();
        assert_eq!(other.moderation_status, ModerationStatus::BlockedByBan);
        assert!(!other.is_deleted);
    }

    #[tokio::test]
    async fn ban_blocks_the_author_with_deadline() {
        let f = fixture().await;
        let now = Utc::now();
        let outcome = apply_decision(
            &f.db,
            &input(
                QueueKind::Reports,
                f.reported,
                Verdict::Ban {
                    reason: ReportReason::Porn,
                    duration: BanDuration::SevenDays,
                },
            ),
            now,
        )
        .await;
        assert!(outcome.success);

        let author = f.db.user_by_id(f.author_id).await.unwrap().unwrap();
        assert!(author.is_blocked);
        assert_eq!(author.block_until, Some(now + Duration::days(7)));

        let reason = BlockReason::decode(author.block_reason.as_deref().unwrap());
        assert_eq!(reason.kind, BlockKind::UploadBan);
        assert_eq!(reason.detail, ReportReason::Porn.explanation());

        // The courtesy message is a payload; sending it is the handler's
        // best-effort problem and cannot fail the decision.
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].recipient_tg_id, 100);
        assert!(outcome.notifications[0].text.contains("7 day(s)"));
    }

    #[tokio::test]
    async fn unban_restores_only_ban_hidden_photos() {
        let f = fixture().await;

        // Delete one photo outright, then ban via the other.
        let deleted = apply_decision(
            &f.db,
            &input(
                QueueKind::SelfServe,
                f.other_active,
                Verdict::Delete {
                    reason: ReportReason::Selfie,
                },
            ),
            Utc::now(),
        )
        .await;
        assert!(deleted.success);

        let banned = apply_decision(
            &f.db,
            &input(
                QueueKind::Reports,
                f.reported,
                Verdict::Ban {
                    reason: ReportReason::Hate,
                    duration: BanDuration::OneDay,
                },
            ),
            Utc::now(),
        )
        .await;
        assert!(banned.success);

        // Nothing was in `active` when the ban landed, so nothing comes
        // back on unban; the moderator-deleted photo stays gone.
        let restored = unban_user(&f.db, f.author_id).await.unwrap();
        assert_eq!(restored, 0);

        let author = f.db.user_by_id(f.author_id).await.unwrap().unwrap();
        assert!(!author.is_blocked);
        assert_eq!(author.block_reason, None);
        assert_eq!(author.block_until, None);

        let deleted_photo = f.db.photo_by_id(f.other_active).await.unwrap().unwrap();
        assert_eq!(
            deleted_photo.moderation_status,
            ModerationStatus::DeletedByModerator
        );
    }

    #[tokio::test]
    async fn unban_brings_back_ban_hidden_photos() {
        let f = fixture().await;
        apply_decision(
            &f.db,
            &input(
                QueueKind::Reports,
                f.reported,
                Verdict::Ban {
                    reason: ReportReason::Violence,
                    duration: BanDuration::ThirtyDays,
                },
            ),
            Utc::now(),
        )
        .await;

        let restored = unban_user(&f.db, f.author_id).await.unwrap();
        assert_eq!(restored, 1);

        let other = f.db.photo_by_id(f.other_active).await.unwrap().unwrap();
        assert_eq!(other.moderation_status, ModerationStatus::Active);
    }

    #[tokio::test]
    async fn approve_is_idempotent() {
        let f = fixture().await;
        f.db.set_photo_status(f.reported, ModerationStatus::UnderReview)
            .await
            .unwrap();

        for _ in 0..2 {
            let outcome = apply_decision(
                &f.db,
                &input(QueueKind::Reports, f.reported, Verdict::Approve),
                Utc::now(),
            )
            .await;
            assert!(outcome.success);
            assert!(outcome.side_effect_errors.is_empty());

            let photo = f.db.photo_by_id(f.reported).await.unwrap().unwrap();
            assert_eq!(photo.moderation_status, ModerationStatus::Active);
            assert!(!photo.is_deleted);
        }
    }

    #[tokio::test]
    async fn decision_commits_despite_notification_trouble() {
        let f = fixture().await;
        // An orphaned photo: no author row exists, so no notification
        // payload can be produced at all.
        let orphaned = f
            .db
            .add_photo(777_777, -100123, 3, None, Utc::now())
            .await
            .unwrap();

        let outcome = apply_decision(
            &f.db,
            &input(
                QueueKind::Reports,
                orphaned,
                Verdict::Delete {
                    reason: ReportReason::Stolen,
                },
            ),
            Utc::now(),
        )
        .await;

        assert!(outcome.success);
        assert!(outcome.notifications.is_empty());
        assert_eq!(outcome.side_effect_errors.len(), 1);

        let photo = f.db.photo_by_id(orphaned).await.unwrap().unwrap();
        assert!(photo.is_deleted);
        assert_eq!(
            photo.moderation_status,
            ModerationStatus::DeletedByModerator
        );
    }

    #[tokio::test]
    async fn other_reason_without_custom_text_gets_the_generic_explanation() {
        let f = fixture().await;
        let outcome = apply_decision(
            &f.db,
            &input(
                QueueKind::SelfServe,
                f.reported,
                Verdict::Delete {
                    reason: ReportReason::Other,
                },
            ),
            Utc::now(),
        )
        .await;

        assert!(outcome.success);
        let text = &outcome.notifications[0].text;
        assert!(text.contains(ReportReason::Other.explanation()));

        // And the custom text wins when present.
        assert_eq!(
            explanation_text(ReportReason::Other, Some("watermarked stock image")),
            "watermarked stock image"
        );
        assert_eq!(
            explanation_text(ReportReason::Other, Some("   ")),
            ReportReason::Other.explanation()
        );
    }

    #[tokio::test]
    async fn vanished_photo_fails_softly() {
        let f = fixture().await;
        let outcome = apply_decision(
            &f.db,
            &input(QueueKind::Reports, 424242, Verdict::Approve),
            Utc::now(),
        )
        .await;
        assert!(!outcome.success);
        assert!(outcome.notifications.is_empty());
    }

    #[tokio::test]
    async fn escalation_feeds_the_deep_queue() {
        let f = fixture().await;
        f.db.set_photo_status(f.reported, ModerationStatus::UnderReview)
            .await
            .unwrap();

        let outcome = escalate_photo(
            &f.db,
            QueueKind::Reports,
            MODERATOR,
            f.reported,
            Utc::now(),
        )
        .await;
        assert!(outcome.success);

        let next = f
            .db
            .next_queue_photo(QueueKind::DeepReview, MODERATOR)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, f.reported);
        // And it left the report queue.
        assert!(f
            .db
            .next_queue_photo(QueueKind::Reports, MODERATOR)
            .await
            .unwrap()
            .is_none());
    }
}
