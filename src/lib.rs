//! Survey bot: Telegram respondent front end plus admin HTTP API.

pub mod api;
pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod locale;
pub mod store;
pub mod survey;
