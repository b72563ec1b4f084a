use anyhow::{Context, Result};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::Store;
use crate::events::IdentityKind;

/// A resolved conversational participant, keyed by its immutable
/// platform-assigned external id.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Identity {
    pub id: String,
    pub external_id: String,
    pub kind: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub timezone: String,
}

const SELECT_IDENTITY: &str = "SELECT id, external_id, kind, display_name, avatar_url, timezone
     FROM identities WHERE external_id = ?1";

fn identity_from_row(row: &rusqlite::Row) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        external_id: row.get(1)?,
        kind: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        timezone: row.get(5)?,
    })
}

impl Store {
    /// Look up an identity by external id.
    pub async fn find_identity(&self, external_id: &str) -> Result<Option<Identity>> {
        let conn = self.conn.lock().await;
        conn.query_row(SELECT_IDENTITY, rusqlite::params![external_id], |row| {
            identity_from_row(row)
        })
        .optional()
        .context("Failed to look up identity")
    }

    /// Create an identity unless one already exists for this external id,
    /// and return the stored row either way.
    ///
    /// `ON CONFLICT DO NOTHING` plus the re-fetch is what keeps two racing
    /// creations of the same external id down to one row: the loser's insert
    /// is a no-op and the follow-up select sees the winner's.
    pub async fn insert_identity_if_absent(
        &self,
        external_id: &str,
        kind: IdentityKind,
        display_name: &str,
        avatar_url: Option<&str>,
        timezone: &str,
    ) -> Result<Identity> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO identities (id, external_id, kind, display_name, avatar_url, timezone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(external_id) DO NOTHING",
            rusqlite::params![&id, external_id, kind.as_str(), display_name, avatar_url, timezone],
        )
        .context("Failed to create identity")?;

        conn.query_row(SELECT_IDENTITY, rusqlite::params![external_id], |row| {
            identity_from_row(row)
        })
        .context("Identity missing after insert")
    }

    /// Create or refresh an identity's profile fields. Used on follow
    /// events, where the platform hands us a fresh display name and avatar.
    pub async fn upsert_identity_profile(
        &self,
        external_id: &str,
        kind: IdentityKind,
        display_name: &str,
        avatar_url: Option<&str>,
        timezone: &str,
    ) -> Result<Identity> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO identities (id, external_id, kind, display_name, avatar_url, timezone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(external_id) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url",
            rusqlite::params![&id, external_id, kind.as_str(), display_name, avatar_url, timezone],
        )
        .context("Failed to upsert identity")?;

        conn.query_row(SELECT_IDENTITY, rusqlite::params![external_id], |row| {
            identity_from_row(row)
        })
        .context("Identity missing after upsert")
    }

    /// All known identities, oldest first. Feeds the digest loop.
    pub async fn list_identities(&self) -> Result<Vec<Identity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, external_id, kind, display_name, avatar_url, timezone
             FROM identities ORDER BY created_at ASC, rowid ASC",
        )?;
        let identities = stmt
            .query_map([], identity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list identities")?;
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_if_absent_keeps_first_row() {
        let store = Store::open_in_memory().unwrap();

        let first = store
            .insert_identity_if_absent("U1", IdentityKind::User, "Alice", None, "Asia/Tokyo")
            .await
            .unwrap();
        let second = store
            .insert_identity_if_absent("U1", IdentityKind::User, "Impostor", None, "Asia/Tokyo")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Alice");
        assert_eq!(store.list_identities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_resolution_creates_one_row() {
        let store = Store::open_in_memory().unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert_identity_if_absent("U123", IdentityKind::User, "A", None, "Asia/Tokyo")
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert_identity_if_absent("U123", IdentityKind::User, "B", None, "Asia/Tokyo")
                    .await
            })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(store.list_identities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_refreshes_profile_but_keeps_id() {
        let store = Store::open_in_memory().unwrap();

        let created = store
            .upsert_identity_profile("U2", IdentityKind::User, "Old Name", None, "Asia/Tokyo")
            .await
            .unwrap();
        let updated = store
            .upsert_identity_profile(
                "U2",
                IdentityKind::User,
                "New Name",
                Some("https://cdn.example/avatar.png"),
                "Asia/Tokyo",
            )
            .await
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.display_name, "New Name");
        assert_eq!(
            updated.avatar_url.as_deref(),
            Some("https://cdn.example/avatar.png")
        );
    }

    #[tokio::test]
    async fn find_returns_none_for_unknown_id() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.find_identity("U404").await.unwrap().is_none());
    }
}
