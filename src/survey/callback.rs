//! Inline-button callback payloads.
//!
//! Telegram echoes `callback_data` back verbatim when a button is pressed,
//! capped at 64 bytes. Payloads are a JSON object tagged by `t`, e.g.
//! `{"t":"qr","o":"<option uuid>"}`. Unknown tags fail to decode.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CallbackError;

/// Telegram's limit for `callback_data`.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Operation carried by an inline button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum CallbackData {
    /// The respondent picked an answer option.
    #[serde(rename = "qr")]
    QuestionReply {
        #[serde(rename = "o")]
        option_id: Uuid,
    },
}

impl CallbackData {
    pub fn encode(&self) -> Result<String, CallbackError> {
        let encoded = serde_json::to_string(self)?;
        if encoded.len() > MAX_CALLBACK_DATA_LEN {
            return Err(CallbackError::TooLong {
                length: encoded.len(),
                max: MAX_CALLBACK_DATA_LEN,
            });
        }
        Ok(encoded)
    }

    pub fn decode(raw: &str) -> Result<Self, CallbackError> {
        if raw.len() > MAX_CALLBACK_DATA_LEN {
            return Err(CallbackError::TooLong {
                length: raw.len(),
                max: MAX_CALLBACK_DATA_LEN,
            });
        }
        Ok(serde_json::from_str(raw)?)
    }
}
