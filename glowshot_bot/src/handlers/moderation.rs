//! The moderator-facing flow: queue cards, verdict keyboards, unbans.

use chrono::Utc;
use html_escape::encode_text;
use teloxide::{
    payloads::{AnswerCallbackQuerySetters, CopyMessageSetters, EditMessageReplyMarkupSetters, SendMessageSetters},
    prelude::Requester,
    types::{
        CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId,
        ParseMode, User,
    },
    Bot, RequestError,
};

use crate::{
    database::{Database, PhotoRecord, UserRecord},
    moderation::{
        orchestrator::{self, DecisionInput, DecisionOutcome, Verdict},
        ReportStats,
    },
    types::{AuditAction, BanDuration, CallbackCommand, QueueKind, ReportReason},
    MODERATOR_CHAT_ID,
};

/// Check if this user is in the moderator chat, and delay their requests
/// if appropriate.
pub async fn authenticate_moderator(bot: &Bot, user: &User) -> Result<bool, RequestError> {
    let moderator = bot
        .get_chat_member(MODERATOR_CHAT_ID, user.id)
        .await?
        .is_present();
    if !moderator {
        log::info!(
            "Unauthorized user trying to access moderation: {}",
            glowshot_commons::user_name_prettyprint(user, true)
        );
        // Same reasoning as every bot with a privileged command: someone
        // hammering /moderate could make us hammer getChatMember in turn
        // and get rate limited by Telegram. Teloxide processes messages
        // from one chat sequentially, so sleeping here only delays the
        // hammerer's own messages.
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
    Ok(moderator)
}

fn queue_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        QueueKind::ALL
            .into_iter()
            .map(|queue| {
                vec![InlineKeyboardButton::callback(
                    queue.label().to_string(),
                    format!("mod:next:{queue}"),
                )]
            })
            .collect::<Vec<_>>(),
    )
}

fn decision_keyboard(queue: QueueKind, photo_id: i64) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![
        InlineKeyboardButton::callback(
            "✅ All good".to_string(),
            format!("mod:ok:{queue}:{photo_id}"),
        ),
        InlineKeyboardButton::callback(
            "⏭ Skip".to_string(),
            format!("mod:skip:{queue}:{photo_id}"),
        ),
    ]];
    // A deep-review photo is already on its second pass.
    if queue != QueueKind::DeepReview {
        rows.push(vec![InlineKeyboardButton::callback(
            "🔍 Deep review".to_string(),
            format!("mod:deep:{queue}:{photo_id}"),
        )]);
    }
    rows.push(vec![
        InlineKeyboardButton::callback(
            "🗑 Delete".to_string(),
            format!("mod:del:{queue}:{photo_id}"),
        ),
        InlineKeyboardButton::callback(
            "⛔ Delete + ban".to_string(),
            format!("mod:ban:{queue}:{photo_id}"),
        ),
    ]);
    InlineKeyboardMarkup::new(rows)
}

fn reason_keyboard(action: &str, queue: QueueKind, photo_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        ReportReason::ALL
            .into_iter()
            .map(|reason| {
                vec![InlineKeyboardButton::callback(
                    reason.label().to_string(),
                    format!("mod:{action}:{queue}:{photo_id}:{reason}"),
                )]
            })
            .collect::<Vec<_>>(),
    )
}

fn ban_duration_keyboard(
    queue: QueueKind,
    photo_id: i64,
    reason: ReportReason,
) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![BanDuration::ALL
        .into_iter()
        .map(|duration| {
            InlineKeyboardButton::callback(
                format!("{} d", duration.days()),
                format!("mod:band:{}:{}:{}:{}", queue, photo_id, reason, duration.days()),
            )
        })
        .collect::<Vec<_>>()])
}

async fn queue_card_caption(db: &Database, queue: QueueKind, photo: &PhotoRecord) -> String {
    let mut caption = format!(
        "<b>{}</b>\n\nPhoto ID: <code>{}</code>\nAuthor user ID: <code>{}</code>",
        queue.label(),
        photo.id,
        photo.user_id
    );
    if let Some(text) = &photo.caption {
        caption.push_str(&format!("\nCaption: {}", encode_text(text)));
    }

    if queue == QueueKind::Reports {
        if let Ok(stats) = db.report_stats(photo.id).await {
            caption.push_str(&format!(
                "\n\nPending reports: {}\nTotal reports ever: {}",
                stats.total_pending, stats.total_all
            ));
        }
        if let Ok(Some(report)) = db.latest_pending_report(photo.id).await {
            caption.push_str(&format!("\nLatest reason: {}", encode_text(&report.reason)));
            if let Some(details) = &report.details {
                caption.push_str(&format!("\nDetails: {}", encode_text(details)));
            }
        }
    }

    caption
}

/// Push a "photo pulled for review" card into the moderator chat. Purely
/// a courtesy signal; failure to deliver never affects the report itself.
pub async fn push_report_card(
    bot: &Bot,
    db: &Database,
    photo_id: i64,
    stats: ReportStats,
    reason: ReportReason,
    reporter: &UserRecord,
) {
    let Ok(Some(photo)) = db.photo_by_id(photo_id).await else {
        return;
    };

    let reporter_name = reporter
        .username
        .as_ref()
        .map(|u| format!("@{u}"))
        .or_else(|| reporter.name.clone())
        .unwrap_or_else(|| format!("id {}", reporter.tg_id));

    let caption = format!(
        "⚠️ <b>Photo pulled for review</b>\n\n\
        Photo ID: <code>{}</code>\nAuthor user ID: <code>{}</code>\n\
        Pending reports: {}\nTotal reports ever: {}\n\n\
        Latest report by {}:\n{}",
        photo.id,
        photo.user_id,
        stats.total_pending,
        stats.total_all,
        encode_text(&reporter_name),
        reason.label(),
    );
    let keyboard = decision_keyboard(QueueKind::Reports, photo.id);

    let copied = bot
        .copy_message(
            MODERATOR_CHAT_ID,
            ChatId(photo.src_chat_id),
            MessageId(photo.src_message_id as i32),
        )
        .caption(caption.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard.clone())
        .await;

    if let Err(e) = copied {
        log::warn!("Failed to copy reported photo {photo_id} to moderators: {e}");
        let sent = bot
            .send_message(MODERATOR_CHAT_ID, caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await;
        if let Err(e) = sent {
            log::warn!("Failed to notify moderators about photo {photo_id}: {e}");
        }
    }
}

/// Returns true if the command was processed, or false if it was ignored.
pub async fn handle_moderate_command(
    bot: &Bot,
    message: &Message,
    _db: &Database,
) -> Result<bool, RequestError> {
    let Some(user) = &message.from else {
        return Ok(false);
    };
    if !authenticate_moderator(bot, user).await? {
        return Ok(false);
    }

    bot.send_message(message.chat.id, "Pick a queue to work through:")
        .reply_markup(queue_menu_keyboard())
        .await?;
    Ok(true)
}

/// `/unban <telegram user id>`. Returns true if processed.
pub async fn handle_unban_command(
    bot: &Bot,
    message: &Message,
    db: &Database,
    params: &str,
) -> Result<bool, RequestError> {
    let Some(user) = &message.from else {
        return Ok(false);
    };
    if !authenticate_moderator(bot, user).await? {
        return Ok(false);
    }

    let Ok(target_tg_id) = params.trim().parse::<i64>() else {
        bot.send_message(message.chat.id, "Usage: /unban <telegram user id>")
            .await?;
        return Ok(true);
    };

    let Some(target) = db.user_by_tg_id(target_tg_id).await.expect("Database died!") else {
        bot.send_message(message.chat.id, "No such user on record.")
            .await?;
        return Ok(true);
    };

    match orchestrator::unban_user(db, target.id).await {
        Ok(restored) => {
            log::info!(
                "Moderator {} unbanned user {target_tg_id}, {restored} photo(s) restored",
                glowshot_commons::user_name_prettyprint(user, true)
            );
            bot.send_message(
                message.chat.id,
                format!("Unbanned. {restored} photo(s) returned to rotation."),
            )
            .await?;
            // Best-effort courtesy note for the user.
            let _ = bot
                .send_message(
                    ChatId(target_tg_id),
                    "Your account restriction has been lifted. Welcome back!",
                )
                .await;
        }
        Err(e) => {
            log::warn!("Failed to unban user {target_tg_id}: {e}");
            bot.send_message(message.chat.id, "Failed to unban, try again later.")
                .await?;
        }
    }
    Ok(true)
}

/// Serve the next photo of a queue to the moderator, or report it empty.
pub async fn send_queue_card(
    bot: &Bot,
    chat_id: ChatId,
    db: &Database,
    queue: QueueKind,
    moderator_tg_id: i64,
) -> Result<(), RequestError> {
    let Some(photo) = db
        .next_queue_photo(queue, moderator_tg_id)
        .await
        .expect("Database died!")
    else {
        bot.send_message(chat_id, format!("Nothing left in \"{}\".", queue.label()))
            .reply_markup(queue_menu_keyboard())
            .await?;
        return Ok(());
    };

    let caption = queue_card_caption(db, queue, &photo).await;
    let keyboard = decision_keyboard(queue, photo.id);

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
        log::warn!("Failed to copy photo {} into a queue card: {e}", photo.id);
        bot.send_message(chat_id, caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    }

    Ok(())
}

/// Deliver the orchestrator's notification payloads and log whatever it
/// had to absorb. Strictly fire-and-forget.
async fn dispatch_outcome_side_channels(bot: &Bot, outcome: &DecisionOutcome) {
    for notification in &outcome.notifications {
        if let Err(e) = bot
            .send_message(ChatId(notification.recipient_tg_id), &notification.text)
            .await
        {
            log::warn!(
                "Failed to notify user {}: {e}",
                notification.recipient_tg_id
            );
        }
    }
    for error in &outcome.side_effect_errors {
        log::warn!("Moderation side effect failed: {error}");
    }
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

    let user = &query.from;
    if !authenticate_moderator(bot, user).await? {
        goodbye!("Moderators only.");
    }
    let moderator_tg_id = user.id.0 as i64;
    let origin = query.message.as_ref().map(|m| (m.chat().id, m.id()));

    // Where follow-up cards go: the chat the button lives in, or the
    // moderator's DMs if the original message became inaccessible.
    let followup_chat = origin
        .map(|(chat_id, _)| chat_id)
        .unwrap_or(ChatId(moderator_tg_id));

    async fn retire_card(bot: &Bot, origin: Option<(ChatId, MessageId)>) {
        if let Some((chat_id, message_id)) = origin {
            let _ = bot.delete_message(chat_id, message_id).await;
        }
    }

    // Run a verdict through the orchestrator and continue with the queue.
    macro_rules! decide_and_continue {
        ($queue:expr, $input:expr) => {{
            let outcome = orchestrator::apply_decision(db, &$input, Utc::now()).await;
            dispatch_outcome_side_channels(bot, &outcome).await;
            retire_card(bot, origin).await;
            send_queue_card(bot, followup_chat, db, $queue, moderator_tg_id).await?;
            goodbye!(outcome.message);
        }};
    }

    match command {
        CallbackCommand::NextForModeration { queue } => {
            retire_card(bot, origin).await;
            send_queue_card(bot, followup_chat, db, queue, moderator_tg_id).await?;
            goodbye!();
        }
        CallbackCommand::Approve { queue, photo_id } => {
            let input = DecisionInput {
                queue,
                moderator_tg_id,
                photo_id,
                verdict: Verdict::Approve,
                custom_text: None,
            };
            decide_and_continue!(queue, input);
        }
        CallbackCommand::ModSkip { queue, photo_id } => {
            // Logged so the spot-check queue stops serving this photo to
            // this moderator; the photo itself is untouched.
            db.append_moderation_log(
                moderator_tg_id,
                photo_id,
                &AuditAction::skip(queue),
                None,
                Utc::now(),
            )
            .await
            .expect("Database died!");
            retire_card(bot, origin).await;
            send_queue_card(bot, followup_chat, db, queue, moderator_tg_id).await?;
            goodbye!();
        }
        CallbackCommand::Escalate { queue, photo_id } => {
            let outcome =
                orchestrator::escalate_photo(db, queue, moderator_tg_id, photo_id, Utc::now())
                    .await;
            dispatch_outcome_side_channels(bot, &outcome).await;
            retire_card(bot, origin).await;
            send_queue_card(bot, followup_chat, db, queue, moderator_tg_id).await?;
            goodbye!(outcome.message);
        }
        CallbackCommand::DeleteMenu { queue, photo_id } => {
            if let Some((chat_id, message_id)) = origin {
                bot.edit_message_reply_markup(chat_id, message_id)
                    .reply_markup(reason_keyboard("delr", queue, photo_id))
                    .await?;
            }
            goodbye!("Why is it being deleted?");
        }
        CallbackCommand::Delete {
            queue,
            photo_id,
            reason,
        } => {
            let input = DecisionInput {
                queue,
                moderator_tg_id,
                photo_id,
                verdict: Verdict::Delete { reason },
                custom_text: None,
            };
            decide_and_continue!(queue, input);
        }
        CallbackCommand::BanMenu { queue, photo_id } => {
            if let Some((chat_id, message_id)) = origin {
                bot.edit_message_reply_markup(chat_id, message_id)
                    .reply_markup(reason_keyboard("banr", queue, photo_id))
                    .await?;
            }
            goodbye!("Why is the author being banned?");
        }
        CallbackCommand::BanReasonChosen {
            queue,
            photo_id,
            reason,
        } => {
            if let Some((chat_id, message_id)) = origin {
                bot.edit_message_reply_markup(chat_id, message_id)
                    .reply_markup(ban_duration_keyboard(queue, photo_id, reason))
                    .await?;
            }
            goodbye!("For how long?");
        }
        CallbackCommand::Ban {
            queue,
            photo_id,
            reason,
            duration,
        } => {
            let input = DecisionInput {
                queue,
                moderator_tg_id,
                photo_id,
                verdict: Verdict::Ban { reason, duration },
                custom_text: None,
            };
            decide_and_continue!(queue, input);
        }
        _ => goodbye!("Wrong kind of button for this flow."),
    }
}
