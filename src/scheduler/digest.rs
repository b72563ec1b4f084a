use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::config::DigestMode;
use crate::platform::OutgoingMessage;
use crate::router::AppState;
use crate::scheduler::Scheduler;
use crate::store::identities::Identity;
use crate::store::messages::NewMessage;

const GREETING_HEADER: &str = "【おはようございます！☀️】";
const GREETING_FOOTER: &str = "今日も一日頑張りましょう！";

/// How many pending tasks a digest lists, highest priority first.
const DIGEST_TASK_LIMIT: i64 = 5;

/// Register the background jobs: the daily digest, plus a reserved
/// 15-minute slot for future reminder checks.
pub async fn register_jobs(scheduler: &Scheduler, state: Arc<AppState>) -> Result<()> {
    let digest_state = Arc::clone(&state);
    scheduler
        .add_cron_job(&state.config.digest.cron, "daily-digest", move || {
            let state = Arc::clone(&digest_state);
            Box::pin(async move {
                run_digest(&state).await;
            })
        })
        .await?;

    scheduler
        .add_cron_job("0 */15 * * * *", "reminder-check", || {
            Box::pin(async {
                // Due-soon reminders will live here.
                debug!("Reminder check: nothing to do yet");
            })
        })
        .await?;

    Ok(())
}

/// Push a digest to every known user. Each recipient is independent: a
/// failed push is logged and the loop moves on.
pub async fn run_digest(state: &AppState) {
    let identities = match state.store.list_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            error!("Digest aborted, could not list identities: {:#}", e);
            return;
        }
    };

    info!("Starting digest run for {} identities", identities.len());

    for identity in identities {
        // Only individual users get pushes; groups and rooms are archives.
        if identity.kind != "user" {
            continue;
        }

        let text = match compose_digest(state, &identity).await {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(e) => {
                error!(
                    "Failed to compose digest for {}: {:#}",
                    identity.display_name, e
                );
                continue;
            }
        };

        let outgoing = OutgoingMessage::text(text);
        if let Err(e) = state.line.push(&identity.external_id, outgoing.clone()).await {
            error!("Failed to push digest to {}: {:#}", identity.display_name, e);
            continue;
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
            error!("Failed to archive digest message: {:#}", e);
        }
    }
}

/// Compose the digest for one identity. `None` means this identity is
/// skipped (task-aware mode with nothing pending).
async fn compose_digest(state: &AppState, identity: &Identity) -> Result<Option<String>> {
    match state.config.digest.mode {
        DigestMode::GreetingOnly => {
            Ok(Some(format!("{}\n{}", GREETING_HEADER, GREETING_FOOTER)))
        }
        DigestMode::TaskAware => {
            let tasks = state
                .store
                .pending_tasks_by_priority(&identity.id, DIGEST_TASK_LIMIT)
                .await?;
            if tasks.is_empty() {
                return Ok(None);
            }

            let task_list = tasks
                .iter()
                .enumerate()
                .map(|(index, task)| format!("{}. {}", index + 1, task.title))
                .collect::<Vec<_>>()
                .join("\n");

            Ok(Some(format!(
                "{}\n今日の未完了タスクはこちらです：\n\n{}\n\n{}",
                GREETING_HEADER, task_list, GREETING_FOOTER
            )))
        }
    }
}
