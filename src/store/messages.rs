use anyhow::{Context, Result};
use uuid::Uuid;

use super::Store;

/// One conversation turn to archive. Inbound turns carry the platform's
/// message id; bot-originated turns don't have one.
#[derive(Debug)]
pub struct NewMessage<'a> {
    pub identity_id: &'a str,
    pub external_message_id: Option<&'a str>,
    pub kind: &'a str,
    pub text: Option<&'a str>,
    /// Opaque serialized snapshot of the inbound event or outbound payload.
    pub raw: &'a str,
    pub is_from_user: bool,
}

impl Store {
    /// Append a message to the archive. Rows are never mutated afterwards.
    pub async fn append_message(&self, message: &NewMessage<'_>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO messages
             (id, identity_id, external_message_id, kind, text, raw, is_from_user)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                &id,
                message.identity_id,
                message.external_message_id,
                message.kind,
                message.text,
                message.raw,
                message.is_from_user,
            ],
        )
        .context("Failed to append message")?;

        Ok(id)
    }

    /// Number of archived messages for an identity.
    #[cfg(test)]
    pub(crate) async fn count_messages(&self, identity_id: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE identity_id = ?1",
            rusqlite::params![identity_id],
            |row| row.get(0),
        )
        .context("Failed to count messages")
    }
}
