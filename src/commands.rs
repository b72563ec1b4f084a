use anyhow::Result;
use chrono::Datelike;

use crate::store::identities::Identity;
use crate::store::Store;

pub const COMMAND_PREFIX: char = '/';

const HELP_TEXT: &str = "使い方:\n\
    /help - このヘルプを表示\n\
    /stats - タスクの統計を表示\n\
    /tasks - 未完了タスクを一覧表示\n\
    /settings - 設定を表示\n\n\
    メッセージに「TODO:」「やること:」「タスク:」を付けるとタスクとして登録します。";

const NO_TASKS_TEXT: &str = "未完了のタスクはありません。";

pub fn is_command(text: &str) -> bool {
    text.starts_with(COMMAND_PREFIX)
}

/// Route a slash-command to its handler and produce the reply text.
/// Only called for text that starts with the command prefix; an
/// unrecognized token is answered, not errored.
pub async fn dispatch(store: &Store, identity: &Identity, text: &str) -> Result<String> {
    let token = text
        .trim_start_matches(COMMAND_PREFIX)
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    match token.as_str() {
        "help" => Ok(HELP_TEXT.to_string()),
        "stats" => stats_reply(store, identity).await,
        "tasks" => tasks_reply(store, identity).await,
        "settings" => Ok(format!(
            "タイムゾーン: {}\n設定の変更は今後対応予定です。",
            identity.timezone
        )),
        _ => Ok(format!(
            "未知のコマンドです: {}\n/help でコマンド一覧を確認できます。",
            token
        )),
    }
}

async fn stats_reply(store: &Store, identity: &Identity) -> Result<String> {
    let stats = store.task_stats(&identity.id).await?;
    Ok(format!(
        "📊 タスク統計\n合計: {}\n完了: {}\n未完了: {}\n完了率: {:.1}%",
        stats.total,
        stats.completed,
        stats.pending,
        stats.completion_rate()
    ))
}

async fn tasks_reply(store: &Store, identity: &Identity) -> Result<String> {
    let tasks = store.pending_tasks(&identity.id, 10).await?;
    if tasks.is_empty() {
        return Ok(NO_TASKS_TEXT.to_string());
    }

    let mut reply = String::from("📝 未完了タスク:\n");
    for (index, task) in tasks.iter().enumerate() {
        reply.push_str(&format!("{}. {}", index + 1, task.title));
        if let Some(due) = task.due_date {
            reply.push_str(&format!("（期限: {}/{}）", due.month(), due.day()));
        }
        reply.push('\n');
    }
    Ok(reply.trim_end().to_string())
}
