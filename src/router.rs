use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

use crate::commands;
use crate::config::{Config, ReplyMode};
use crate::events::{EventSource, IdentityKind, MessageContent, WebhookEvent};
use crate::extract;
use crate::platform::line::LineClient;
use crate::platform::OutgoingMessage;
use crate::store::identities::Identity;
use crate::store::messages::NewMessage;
use crate::store::Store;

/// Shared application state, built once at startup and handed to the
/// webhook router and the scheduler by reference.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub line: LineClient,
}

/// Handle one event from a webhook batch. Failures are contained here:
/// they are logged with the raw payload and never escalate to the caller,
/// so one bad event cannot take down the rest of its batch.
pub async fn handle_event(state: &AppState, raw: &serde_json::Value) {
    let event: WebhookEvent = match serde_json::from_value(raw.clone()) {
        Ok(event) => event,
        Err(e) => {
            warn!("Undecodable webhook event ({}): {}", e, raw);
            return;
        }
    };

    let outcome = match &event {
        WebhookEvent::Message {
            reply_token,
            source,
            message,
        } => handle_message(state, reply_token, source, message, raw).await,
        WebhookEvent::Follow {
            reply_token,
            source,
        } => handle_follow(state, reply_token, source).await,
        WebhookEvent::Unfollow { source } => {
            // History is retained; nothing to delete or flag.
            info!("User unfollowed: {:?}", source.user_id);
            Ok(())
        }
        WebhookEvent::Other => {
            info!("Ignoring unhandled event kind: {}", raw);
            Ok(())
        }
    };

    if let Err(e) = outcome {
        error!("Event handling failed: {:#}; raw event: {}", e, raw);
    }
}

async fn handle_message(
    state: &AppState,
    reply_token: &str,
    source: &EventSource,
    message: &MessageContent,
    raw: &serde_json::Value,
) -> Result<()> {
    let Some((external_id, kind)) = source.conversation_key() else {
        warn!("Message event carries no source id: {}", raw);
        return Ok(());
    };

    let identity = resolve_identity(state, external_id, kind)
        .await
        .context("Identity resolution failed")?;

    state
        .store
        .append_message(&NewMessage {
            identity_id: &identity.id,
            external_message_id: Some(&message.id),
            kind: &message.kind,
            text: message.text.as_deref(),
            raw: &raw.to_string(),
            is_from_user: true,
        })
        .await?;

    if !message.is_text() {
        return Ok(());
    }
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };

    // Task extraction is best-effort and never blocks the reply path.
    if let Some(extracted) = extract::extract(text, Local::now().date_naive()) {
        match state
            .store
            .create_task(&identity.id, &extracted.title, extracted.due_date)
            .await
        {
            Ok(task) => info!(
                "Extracted task '{}' for {}",
                task.title, identity.display_name
            ),
            Err(e) => warn!("Failed to persist extracted task: {:#}", e),
        }
    }

    let reply = if commands::is_command(text) {
        Some(commands::dispatch(&state.store, &identity, text).await?)
    } else {
        match state.config.bot.reply_mode {
            ReplyMode::Silent => None,
            ReplyMode::Echo => Some(text.to_string()),
        }
    };

    if let Some(reply) = reply {
        send_reply(state, &identity, reply_token, reply).await;
    }

    Ok(())
}

async fn handle_follow(state: &AppState, reply_token: &str, source: &EventSource) -> Result<()> {
    let Some(user_id) = source.user_id.as_deref() else {
        warn!("Follow event without a user id");
        return Ok(());
    };

    // A follow forces a profile fetch so a re-follow refreshes the stored
    // display name and avatar; the fetch failing still must not lose the
    // identity.
    let identity = match state.line.get_profile(user_id).await {
        Ok(profile) => {
            state
                .store
                .upsert_identity_profile(
                    user_id,
                    IdentityKind::User,
                    &profile.display_name,
                    profile.picture_url.as_deref(),
                    &state.config.bot.default_timezone,
                )
                .await?
        }
        Err(e) => {
            warn!("Profile fetch failed for {}: {:#}", user_id, e);
            resolve_identity(state, user_id, IdentityKind::User).await?
        }
    };

    let welcome = format!(
        "{}さん、友だち追加ありがとうございます！\n会話履歴の保存を開始します。",
        identity.display_name
    );
    send_reply(state, &identity, reply_token, welcome).await;

    Ok(())
}

/// Get-or-create the identity behind an external id.
///
/// A fresh user identity is enriched with a profile lookup; when that call
/// fails the placeholder name is used instead, because enrichment must
/// never block message persistence.
pub async fn resolve_identity(
    state: &AppState,
    external_id: &str,
    kind: IdentityKind,
) -> Result<Identity> {
    if let Some(identity) = state.store.find_identity(external_id).await? {
        return Ok(identity);
    }

    let (display_name, avatar_url) = match kind {
        IdentityKind::User => match state.line.get_profile(external_id).await {
            Ok(profile) => (profile.display_name, profile.picture_url),
            Err(e) => {
                warn!("Profile fetch failed for {}: {:#}", external_id, e);
                ("Unknown User".to_string(), None)
            }
        },
        IdentityKind::Group => ("Group".to_string(), None),
        IdentityKind::Room => ("Room".to_string(), None),
    };

    state
        .store
        .insert_identity_if_absent(
            external_id,
            kind,
            &display_name,
            avatar_url.as_deref(),
            &state.config.bot.default_timezone,
        )
        .await
}

/// Send a reply and archive it. A delivery failure is logged and the
/// outbound turn is not recorded; there is no retry.
async fn send_reply(state: &AppState, identity: &Identity, reply_token: &str, text: String) {
    let outgoing = OutgoingMessage::text(text);
    if let Err(e) = state.line.reply(reply_token, outgoing.clone()).await {
        error!("Failed to reply to {}: {:#}", identity.display_name, e);
        return;
    }

    let raw = serde_json::to_string(&outgoing).unwrap_or_default();
    if let Err(e) = state
        .store
        .append_message(&NewMessage {
            identity_id: &identity.id,
            external_message_id: None,
            kind: &outgoing.kind,
            text: Some(&outgoing.text),
            raw: &raw,
            is_from_user: false,
        })
        .await
    {
        error!("Failed to archive outbound reply: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotConfig, DigestConfig, LineConfig, ServerConfig, StoreConfig};
    use std::path::PathBuf;

    /// State wired to an unreachable Messaging API endpoint: profile
    /// fetches fail fast, exercising the placeholder fallback.
    fn offline_state() -> AppState {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            line: LineConfig {
                channel_secret: "secret".into(),
                channel_access_token: "token".into(),
                api_base_url: "http://127.0.0.1:9".into(),
                request_timeout_secs: 1,
            },
            bot: BotConfig {
                reply_mode: ReplyMode::Silent,
                default_timezone: "Asia/Tokyo".into(),
            },
            digest: DigestConfig {
                mode: Default::default(),
                cron: "0 0 9 * * *".into(),
            },
            store: StoreConfig {
                database_path: PathBuf::from(":memory:"),
            },
        };
        AppState {
            line: LineClient::new(config.line.clone()).unwrap(),
            store: Store::open_in_memory().unwrap(),
            config,
        }
    }

    fn text_message_event(user_id: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "message",
            "replyToken": "rt-1",
            "source": { "type": "user", "userId": user_id },
            "message": { "id": "m-1", "type": "text", "text": text }
        })
    }

    #[tokio::test]
    async fn message_event_creates_identity_and_archives_turn() {
        let state = offline_state();
        handle_event(&state, &text_message_event("U1", "hello there")).await;

        let identity = state.store.find_identity("U1").await.unwrap().unwrap();
        // Profile fetch failed against the offline endpoint.
        assert_eq!(identity.display_name, "Unknown User");
        assert_eq!(identity.kind, "user");
        assert_eq!(state.store.count_messages(&identity.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn task_bearing_text_persists_a_task() {
        let state = offline_state();
        handle_event(&state, &text_message_event("U2", "TODO: buy milk")).await;

        let identity = state.store.find_identity("U2").await.unwrap().unwrap();
        let tasks = state.store.pending_tasks(&identity.id, 10).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "buy milk");
    }

    #[tokio::test]
    async fn repeated_events_reuse_the_identity() {
        let state = offline_state();
        handle_event(&state, &text_message_event("U3", "first")).await;
        handle_event(&state, &text_message_event("U3", "second")).await;

        let identities = state.store.list_identities().await.unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(
            state
                .store
                .count_messages(&identities[0].id)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn non_text_message_is_archived_without_extraction() {
        let state = offline_state();
        let raw = serde_json::json!({
            "type": "message",
            "replyToken": "rt-2",
            "source": { "type": "user", "userId": "U4" },
            "message": { "id": "m-9", "type": "sticker" }
        });
        handle_event(&state, &raw).await;

        let identity = state.store.find_identity("U4").await.unwrap().unwrap();
        assert_eq!(state.store.count_messages(&identity.id).await.unwrap(), 1);
        assert!(state
            .store
            .pending_tasks(&identity.id, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn undecodable_event_is_ignored() {
        let state = offline_state();
        handle_event(&state, &serde_json::json!({"type": 42})).await;
        assert!(state.store.list_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_message_without_user_id_keys_on_group() {
        let state = offline_state();
        let raw = serde_json::json!({
            "type": "message",
            "replyToken": "rt-3",
            "source": { "type": "group", "groupId": "G1" },
            "message": { "id": "m-2", "type": "text", "text": "hi all" }
        });
        handle_event(&state, &raw).await;

        let identity = state.store.find_identity("G1").await.unwrap().unwrap();
        assert_eq!(identity.kind, "group");
        // No profile endpoint for groups, placeholder straight away.
        assert_eq!(identity.display_name, "Group");
    }
}
