use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{BotCommand, Me, Message},
    RequestError,
};

use crate::{database::Database, types::CallbackCommand};

pub mod moderation;
pub mod rating;

pub fn generate_bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand {
            command: "start".to_string(),
            description: "Show the help message".to_string(),
        },
        BotCommand {
            command: "rate".to_string(),
            description: "Rate other members' photos".to_string(),
        },
        BotCommand {
            command: "moderate".to_string(),
            description: "Open the moderation queues (moderators only)".to_string(),
        },
        BotCommand {
            command: "unban".to_string(),
            description: "Lift an upload ban (moderators only)".to_string(),
        },
    ]
}

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    // The bot works over direct messages only; ignore anything it happens
    // to see in groups.
    if !message.chat.is_private() {
        return Ok(());
    }

    // A photo message in a private chat is a submission.
    if message.photo().is_some() {
        return rating::handle_photo_upload(&bot, &message, &database).await;
    }

    if handle_command(&bot, &me, &message, &database).await? {
        return Ok(());
    }

    bot.send_message(
        message.chat.id,
        "
This is the GlowShot photo club bot.

Send a photo here to enter it into the daily rating. Use /rate to score \
and, if need be, report other members' photos. Moderators use /moderate \
to work through the review queues.",
    )
    .await?;
    Ok(())
}

/// Returns `true` if a command was parsed and responded to.
async fn handle_command(
    bot: &Bot,
    me: &Me,
    message: &Message,
    database: &Database,
) -> Result<bool, RequestError> {
    // Get text of the message.
    let Some(text) = message.text() else {
        return Ok(false);
    };
    // Check if it starts with "/", like how a command should.
    if !text.starts_with('/') {
        return Ok(false);
    }
    // Get first word in the message, the command itself.
    let Some(command) = text.split_whitespace().next() else {
        return Ok(false);
    };

    let command_full_len = command.len();

    // Trim the bot's username from the command and convert to lowercase.
    let username = format!("@{}", me.username());
    let command = command.trim_end_matches(username.as_str()).to_lowercase();
    let params = &text[command_full_len..].trim_start();

    let command_processed: bool = match command.as_str() {
        "/rate" => rating::handle_rate_command(bot, message, database).await?,
        "/moderate" => moderation::handle_moderate_command(bot, message, database).await?,
        "/unban" => moderation::handle_unban_command(bot, message, database, params).await?,
        // Any kind of "/start", "/help" commands would yield false and
        // hence cause the help message to be printed.
        _ => false,
    };

    Ok(command_processed)
}

pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    let Some(query_data) = query.data.clone() else {
        bot.answer_callback_query(query.id).text("No query data.").await?;
        return Ok(());
    };

    let command = match CallbackCommand::parse(&query_data) {
        Ok(command) => command,
        Err(e) => {
            bot.answer_callback_query(query.id)
                .text(format!("Invalid query data: {}", e))
                .await?;
            return Ok(());
        }
    };

    use CallbackCommand::*;
    match command {
        Score { .. } | SkipPhoto { .. } | NextForRating | ReportMenu { .. } | Report { .. } => {
            rating::handle_callback(&bot, &query, &database, command).await
        }
        _ => moderation::handle_callback(&bot, &query, &database, command).await,
    }
}
