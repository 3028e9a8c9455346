//! Messaging gateway: the `Messenger` abstraction and its Telegram implementation.

pub mod messenger;
pub mod telegram;

pub use messenger::{BotUpdate, CallbackQuery, Delivery, InlineButton, Messenger, Reply};
pub use telegram::{TelegramBot, UpdateStream};
