use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use uuid::Uuid;

use super::Store;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";

/// Mid-value priority assigned to every extracted task.
pub const DEFAULT_PRIORITY: i64 = 1;

const DUE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Task {
    pub id: String,
    pub identity_id: String,
    pub title: String,
    pub due_date: Option<NaiveDateTime>,
    pub status: String,
    pub priority: i64,
}

/// Aggregate task counts for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

impl TaskStats {
    /// Completion rate in percent; 0 when there are no tasks at all.
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

fn task_from_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let due_date: Option<String> = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        title: row.get(2)?,
        due_date: due_date.and_then(|s| NaiveDateTime::parse_from_str(&s, DUE_DATE_FORMAT).ok()),
        status: row.get(4)?,
        priority: row.get(5)?,
    })
}

impl Store {
    /// Persist an extracted task: status `pending`, default priority.
    pub async fn create_task(
        &self,
        identity_id: &str,
        title: &str,
        due_date: Option<NaiveDateTime>,
    ) -> Result<Task> {
        let id = Uuid::new_v4().to_string();
        let due_text = due_date.map(|d| d.format(DUE_DATE_FORMAT).to_string());
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO tasks (id, identity_id, title, due_date, status, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                &id,
                identity_id,
                title,
                due_text,
                STATUS_PENDING,
                DEFAULT_PRIORITY
            ],
        )
        .context("Failed to create task")?;

        Ok(Task {
            id,
            identity_id: identity_id.to_string(),
            title: title.to_string(),
            due_date,
            status: STATUS_PENDING.to_string(),
            priority: DEFAULT_PRIORITY,
        })
    }

    /// Up to `limit` non-completed tasks, newest first. Backs `/tasks`.
    pub async fn pending_tasks(&self, identity_id: &str, limit: i64) -> Result<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, identity_id, title, due_date, status, priority
             FROM tasks
             WHERE identity_id = ?1 AND status != ?2
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3",
        )?;
        let tasks = stmt
            .query_map(
                rusqlite::params![identity_id, STATUS_COMPLETED, limit],
                task_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list pending tasks")?;
        Ok(tasks)
    }

    /// Up to `limit` pending tasks by priority, highest first. Backs the
    /// daily digest.
    pub async fn pending_tasks_by_priority(
        &self,
        identity_id: &str,
        limit: i64,
    ) -> Result<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, identity_id, title, due_date, status, priority
             FROM tasks
             WHERE identity_id = ?1 AND status = ?2
             ORDER BY priority DESC, created_at DESC, rowid DESC
             LIMIT ?3",
        )?;
        let tasks = stmt
            .query_map(
                rusqlite::params![identity_id, STATUS_PENDING, limit],
                task_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list digest tasks")?;
        Ok(tasks)
    }

    /// Aggregate counts for `/stats`.
    pub async fn task_stats(&self, identity_id: &str) -> Result<TaskStats> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = ?3 THEN 1 ELSE 0 END), 0)
             FROM tasks WHERE identity_id = ?1",
            rusqlite::params![identity_id, STATUS_COMPLETED, STATUS_PENDING],
            |row| {
                Ok(TaskStats {
                    total: row.get(0)?,
                    completed: row.get(1)?,
                    pending: row.get(2)?,
                })
            },
        )
        .context("Failed to compute task stats")
    }

    #[cfg(test)]
    pub(crate) async fn set_task_status(&self, task_id: &str, status: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            rusqlite::params![status, task_id],
        )
        .context("Failed to update task status")?;
        Ok(())
    }
}
