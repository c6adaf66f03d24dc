//! Source code for the GlowShot moderation bot: members post a daily photo,
//! other members rate or report it, and moderators act on the reports.

/// Various types used throughout.
pub mod types;

/// Report aggregation, rate limiting and the decision engine.
pub mod moderation;

/// The database.
pub mod database;

/// Functions that handle events from Telegram.
pub mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

use teloxide::types::ChatId;

/// An ID of a private chat with the moderators of the bot. Membership in
/// this chat is what makes someone a moderator, and report cards are
/// pushed here when a photo is pulled for review.
pub static MODERATOR_CHAT_ID: ChatId = ChatId(-1002238819041);
