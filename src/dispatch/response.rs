use serde::Serialize;

use crate::dispatch::command::Origin;
use crate::error::{DomainError, ErrorKind};

/// Outbound chat message; replies thread to the triggering message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotResponse {
    pub chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
    pub text: String,
    #[serde(skip)]
    pub failure: Option<ErrorKind>,
}

impl BotResponse {
    pub fn reply(origin: &Origin, text: impl Into<String>) -> Self {
        Self {
            chat_id: origin.chat_id,
            reply_to: Some(origin.message_id),
            text: text.into(),
            failure: None,
        }
    }

    /// Only the user message of the error is sent, the cause stays in the log
    pub fn error(origin: &Origin, err: &DomainError) -> Self {
        Self {
            chat_id: origin.chat_id,
            reply_to: Some(origin.message_id),
            text: err.user_message.clone(),
            failure: Some(err.kind),
        }
    }

    pub fn broadcast(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            reply_to: None,
            text: text.into(),
            failure: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }
}
