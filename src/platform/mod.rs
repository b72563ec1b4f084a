pub mod line;

use serde::Serialize;

/// A message sent back to the platform, either as a reply or a push.
/// Only text messages are produced by this bot.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}
