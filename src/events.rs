use serde::Deserialize;

/// Webhook delivery body: a batch of events, kept as raw JSON so each
/// event's opaque snapshot survives into the message archive even when the
/// typed decode only understands part of it.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

/// One webhook event, decoded at the boundary. Payloads that carry an
/// unknown `type` land in `Other` and are logged-and-ignored downstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    #[serde(rename_all = "camelCase")]
    Message {
        reply_token: String,
        source: EventSource,
        message: MessageContent,
    },
    #[serde(rename_all = "camelCase")]
    Follow {
        reply_token: String,
        source: EventSource,
    },
    Unfollow { source: EventSource },
    #[serde(other)]
    Other,
}

/// Where an event came from. Exactly which ids are present depends on
/// whether the bot was addressed directly, in a group, or in a room.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub room_id: Option<String>,
}

/// The kind of identity an external id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    User,
    Group,
    Room,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::User => "user",
            IdentityKind::Group => "group",
            IdentityKind::Room => "room",
        }
    }
}

impl EventSource {
    /// The id that keys the conversation identity, and its kind.
    ///
    /// The sender's user id wins when present, so direct and group messages
    /// from the same person share one history; group/room ids only stand in
    /// when the event carries no sender.
    pub fn conversation_key(&self) -> Option<(&str, IdentityKind)> {
        if let Some(id) = self.user_id.as_deref() {
            return Some((id, IdentityKind::User));
        }
        if let Some(id) = self.group_id.as_deref() {
            return Some((id, IdentityKind::Group));
        }
        if let Some(id) = self.room_id.as_deref() {
            return Some((id, IdentityKind::Room));
        }
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    pub id: String,
    /// `text`, `image`, `sticker`, ...; only `text` gets extra handling.
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl MessageContent {
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_message_event() {
        let raw = serde_json::json!({
            "type": "message",
            "replyToken": "rt-1",
            "source": { "type": "user", "userId": "U123" },
            "message": { "id": "m-1", "type": "text", "text": "hello" }
        });

        let event: WebhookEvent = serde_json::from_value(raw).unwrap();
        match event {
            WebhookEvent::Message {
                reply_token,
                source,
                message,
            } => {
                assert_eq!(reply_token, "rt-1");
                assert_eq!(source.user_id.as_deref(), Some("U123"));
                assert!(message.is_text());
                assert_eq!(message.text.as_deref(), Some("hello"));
            }
            other => panic!("decoded as {:?}", other),
        }
    }

    #[test]
    fn decodes_follow_and_unfollow() {
        let follow: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "follow",
            "replyToken": "rt-2",
            "source": { "type": "user", "userId": "U456" }
        }))
        .unwrap();
        assert!(matches!(follow, WebhookEvent::Follow { .. }));

        let unfollow: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "unfollow",
            "source": { "type": "user", "userId": "U456" }
        }))
        .unwrap();
        assert!(matches!(unfollow, WebhookEvent::Unfollow { .. }));
    }

    #[test]
    fn unknown_event_kind_falls_through_to_other() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "memberJoined",
            "source": { "type": "group", "groupId": "G1" }
        }))
        .unwrap();
        assert!(matches!(event, WebhookEvent::Other));
    }

    #[test]
    fn user_id_wins_over_group_and_room() {
        let source = EventSource {
            user_id: Some("U1".into()),
            group_id: Some("G1".into()),
            room_id: Some("R1".into()),
        };
        assert_eq!(source.conversation_key(), Some(("U1", IdentityKind::User)));

        let source = EventSource {
            user_id: None,
            group_id: Some("G1".into()),
            room_id: Some("R1".into()),
        };
        assert_eq!(source.conversation_key(), Some(("G1", IdentityKind::Group)));

        let source = EventSource::default();
        assert_eq!(source.conversation_key(), None);
    }
}
