//! The viewer-facing flow: score photos, skip them, or report them.

use chrono::Utc;
use html_escape::encode_text;
use teloxide::{
    payloads::{
        AnswerCallbackQuerySetters, CopyMessageSetters, EditMessageReplyMarkupSetters,
        SendMessageSetters,
    },
    prelude::Requester,
    types::{
        CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId,
        ParseMode,
    },
    Bot, RequestError,
};

use super::moderation::push_report_card;
use crate::{
    database::{Database, PhotoRecord, UserRecord},
    moderation::{decide_after_new_report, rate_limit},
    types::{BlockReason, CallbackCommand, ModerationStatus, ReportReason},
};

fn rating_keyboard(photo_id: i64) -> InlineKeyboardMarkup {
    let score_row = |range: std::ops::RangeInclusive<u8>| {
        range
            .map(|score| {
                InlineKeyboardButton::callback(
                    score.to_string(),
                    format!("rate:score:{}:{}", photo_id, score),
                )
            })
            .collect::<Vec<_>>()
    };

    InlineKeyboardMarkup::new(vec![
        score_row(1..=5),
        score_row(6..=10),
        vec![
            InlineKeyboardButton::callback("🚫 Report".to_string(), format!("rate:report:{photo_id}")),
            InlineKeyboardButton::callback("⏭ Skip".to_string(), format!("rate:skip:{photo_id}")),
        ],
    ])
}

fn report_reason_keyboard(photo_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        ReportReason::ALL
            .into_iter()
            .map(|reason| {
                vec![InlineKeyboardButton::callback(
                    reason.label().to_string(),
                    format!("rate:reportr:{}:{}", photo_id, reason),
                )]
            })
            .collect::<Vec<_>>(),
    )
}

fn photo_card_caption(photo: &PhotoRecord) -> String {
    let mut caption = format!("<b>Photo #{}</b>", photo.id);
    if let Some(text) = &photo.caption {
        caption.push_str("\n\n");
        caption.push_str(&encode_text(text));
    }
    caption.push_str("\n\nPick a score:");
    caption
}

/// Register the sender and hand back their user row.
async fn ensure_user(message_or_query_user: &teloxide::types::User, db: &Database) -> UserRecord {
    let tg_id = message_or_query_user.id.0 as i64;
    db.upsert_user(
        tg_id,
        message_or_query_user.username.as_deref(),
        Some(message_or_query_user.full_name().as_str()),
    )
    .await
    .expect("Database died!");
    db.user_by_tg_id(tg_id)
        .await
        .expect("Database died!")
        .expect("User row just upserted")
}

/// A photo message in a private chat: record it as today's submission,
/// unless the author is currently banned from uploading.
pub async fn handle_photo_upload(
    bot: &Bot,
    message: &Message,
    db: &Database,
) -> Result<(), RequestError> {
    let Some(from) = &message.from else {
        return Ok(());
    };
    let user = ensure_user(from, db).await;

    if user.is_blocked {
        match user.block_until {
            // The ban lapsed; lift it and let the upload through.
            Some(until) if until <= Utc::now() => {
                if let Err(e) = crate::moderation::orchestrator::unban_user(db, user.id).await {
                    log::warn!("Failed to lift a lapsed ban for user {}: {e}", user.id);
                }
            }
            _ => {
                let mut text = String::from(
                    "Your account is currently restricted by the moderators, \
                    so new photos can't be submitted.",
                );
                if let Some(until) = user.block_until {
                    text.push_str(&format!(
                        "\n\nThe restriction lasts until {}.",
                        until.format("%Y-%m-%d %H:%M UTC")
                    ));
                }
                if let Some(raw) = &user.block_reason {
                    text.push_str(&format!("\nReason: {}", BlockReason::decode(raw).detail));
                }
                bot.send_message(message.chat.id, text).await?;
                return Ok(());
            }
        }
    }

    let photo_id = db
        .add_photo(
            user.id,
            message.chat.id.0,
            i64::from(message.id.0),
            message.caption(),
            Utc::now(),
        )
        .await
        .expect("Database died!");

    log::info!("User {} submitted photo {}", user.tg_id, photo_id);

    bot.send_message(
        message.chat.id,
        format!(
            "Photo #{photo_id} is in! Other members will now see it in /rate.",
        ),
    )
    .await?;
    Ok(())
}

/// Returns true: the command is always considered handled.
pub async fn handle_rate_command(
    bot: &Bot,
    message: &Message,
    db: &Database,
) -> Result<bool, RequestError> {
    let Some(from) = &message.from else {
        return Ok(false);
    };
    let user = ensure_user(from, db).await;
    send_next_photo_card(bot, message.chat.id, db, user.id).await?;
    Ok(true)
}

/// Serve a fresh photo card, or a friendly "nothing to rate" note.
pub async fn send_next_photo_card(
    bot: &Bot,
    chat_id: ChatId,
    db: &Database,
    viewer_user_id: i64,
) -> Result<(), RequestError> {
    let Some(photo) = db
        .next_photo_for_rating(viewer_user_id)
        .await
        .expect("Database died!")
    else {
        bot.send_message(chat_id, "No photos to rate right now. Come back later!")
            .await?;
        return Ok(());
    };

    let caption = photo_card_caption(&photo);
    let keyboard = rating_keyboard(photo.id);

    // The photo is shown by copying the author's original message. If
    // that message is gone, degrade to a text-only card.
    let copied = bot
        .copy_message(
            chat_id,
            ChatId(photo.src_chat_id),
            MessageId(photo.src_message_id as i32),
        )
        .caption(caption.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard.clone())
        .await;

    if let Err(e) = copied {
        log::warn!("Failed to copy photo {} into a card: {e}", photo.id);
        bot.send_message(chat_id, caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    }

    Ok(())
}

pub async fn handle_callback(
    bot: &Bot,
    query: &CallbackQuery,
    db: &Database,
    command: CallbackCommand,
) -> Result<(), RequestError> {
    macro_rules! goodbye {
        ($text:expr) => {{
            bot.answer_callback_query(query.id.clone()).text($text).await?;
            return Ok(());
        }};
        () => {{
            bot.answer_callback_query(query.id.clone()).await?;
            return Ok(());
        }};
    }

    let user = ensure_user(&query.from, db).await;
    let origin = query.message.as_ref().map(|m| (m.chat().id, m.id()));

    // Drop the served card; the next one is a fresh message.
    async fn retire_card(bot: &Bot, origin: Option<(ChatId, MessageId)>) {
        if let Some((chat_id, message_id)) = origin {
            let _ = bot.delete_message(chat_id, message_id).await;
        }
    }

    match command {
        CallbackCommand::Score { photo_id, score } => {
            db.add_rating(photo_id, user.id, score, Utc::now())
                .await
                .expect("Database died!");
            retire_card(bot, origin).await;
            send_next_photo_card(bot, ChatId(user.tg_id), db, user.id).await?;
            goodbye!(format!("Saved: {score}/10"));
        }
        CallbackCommand::SkipPhoto { .. } | CallbackCommand::NextForRating => {
            retire_card(bot, origin).await;
            send_next_photo_card(bot, ChatId(user.tg_id), db, user.id).await?;
            goodbye!();
        }
        CallbackCommand::ReportMenu { photo_id } => {
            if let Some((chat_id, message_id)) = origin {
                bot.edit_message_reply_markup(chat_id, message_id)
                    .reply_markup(report_reason_keyboard(photo_id))
                    .await?;
            }
            goodbye!("What's wrong with this photo?");
        }
        CallbackCommand::Report { photo_id, reason } => {
            // The limiter works off raw history, freshly fetched.
            let history = db
                .recent_report_times(user.id)
                .await
                .expect("Database died!");
            let verdict = rate_limit::evaluate(&history, Utc::now());
            if !verdict.allowed {
                goodbye!(format!(
                    "You are filing reports too often. Try again in {} seconds.",
                    verdict.retry_after_seconds
                ));
            }

            db.create_report(photo_id, user.id, reason, None, Utc::now())
                .await
                .expect("Database died!");

            // Counts must be re-read after the insert; another viewer may
            // have reported the same photo a moment ago.
            let stats = db.report_stats(photo_id).await.expect("Database died!");
            let decision = decide_after_new_report(stats);

            if decision.should_mark_under_review {
                db.set_photo_status(photo_id, ModerationStatus::UnderReview)
                    .await
                    .expect("Database died!");
                push_report_card(bot, db, photo_id, stats, reason, &user).await;
            }

            retire_card(bot, origin).await;
            send_next_photo_card(bot, ChatId(user.tg_id), db, user.id).await?;
            goodbye!("Report filed. Moderators will take a look.");
        }
        _ => goodbye!("Wrong kind of button for this flow."),
    }
}
