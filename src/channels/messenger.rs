//! Messaging gateway abstraction.
//!
//! The bot logic talks to a `Messenger`; `TelegramBot` is the production
//! implementation and tests substitute a recording stub.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;

/// A button in an inline keyboard. Pressing it sends `callback_data` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// Outgoing message text plus an optional inline keyboard (rows of buttons).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<InlineButton>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<InlineButton>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// How a reply reaches the respondent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// New message in the chat.
    Send { chat_id: i64 },
    /// Replace the message the respondent just interacted with.
    Edit { chat_id: i64, message_id: i64 },
}

/// Inbound event from the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotUpdate {
    /// A text message (commands included).
    Message {
        chat_id: i64,
        from_id: i64,
        text: String,
    },
    /// An inline keyboard button press.
    CallbackQuery(CallbackQuery),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Platform id used to acknowledge the query.
    pub id: String,
    pub from_id: i64,
    /// Chat and message the button was attached to, when still accessible.
    pub message: Option<(i64, i64)>,
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Edit the originating message if known, otherwise message the user directly.
    pub fn reply_delivery(&self) -> Delivery {
        match self.message {
            Some((chat_id, message_id)) => Delivery::Edit {
                chat_id,
                message_id,
            },
            None => Delivery::Send {
                chat_id: self.from_id,
            },
        }
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<(), ChannelError>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        reply: &Reply,
    ) -> Result<(), ChannelError>;

    /// Acknowledge a callback query so the client stops its progress indicator.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChannelError>;

    async fn deliver(&self, delivery: Delivery, reply: &Reply) -> Result<(), ChannelError> {
        match delivery {
            Delivery::Send { chat_id } => self.send_message(chat_id, reply).await,
            Delivery::Edit {
                chat_id,
                message_id,
            } => self.edit_message(chat_id, message_id, reply).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingMessenger, Sent};
    use super::*;

    #[test]
    fn callback_with_message_edits_in_place() {
        let query = CallbackQuery {
            id: "cb".into(),
            from_id: 7,
            message: Some((100, 55)),
            data: None,
        };
        assert_eq!(
            query.reply_delivery(),
            Delivery::Edit {
                chat_id: 100,
                message_id: 55
            }
        );
    }

    #[test]
    fn callback_without_message_falls_back_to_private_chat() {
        let query = CallbackQuery {
            id: "cb".into(),
            from_id: 7,
            message: None,
            data: None,
        };
        assert_eq!(query.reply_delivery(), Delivery::Send { chat_id: 7 });
    }

    #[tokio::test]
    async fn deliver_routes_by_mode() {
        let messenger = RecordingMessenger::default();
        let reply = Reply::text("hi");

        messenger
            .deliver(Delivery::Send { chat_id: 1 }, &reply)
            .await
            .unwrap();
        messenger
            .deliver(
                Delivery::Edit {
                    chat_id: 1,
                    message_id: 9,
                },
                &reply,
            )
            .await
            .unwrap();

        let sent = messenger.take().await;
        assert!(matches!(sent[0], Sent::Message { chat_id: 1, .. }));
        assert!(matches!(
            sent[1],
            Sent::Edit {
                chat_id: 1,
                message_id: 9,
                ..
            }
        ));
    }
}
