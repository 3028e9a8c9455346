//! Telegram bot front end: command parsing and dispatch.

pub mod command;
pub mod dispatcher;

pub use command::{BotCommand, FullName};
pub use dispatcher::{AnswerOutcome, AuthOutcome, Dispatcher, IgnoreReason, JoinOutcome};
