use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::connection::Database;

const SUBJECT_ID_KEY: &str = "subject_id";
const SUBJECT_EMAIL_KEY: &str = "subject_email";

/// Identity persisted across process restarts so the OS-scheduled background
/// job can resume capturing after the app has been evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedIdentity {
    pub subject_id: String,
    pub subject_email: String,
}

impl Database {
    pub async fn save_identity(&self, identity: &PersistedIdentity) -> Result<()> {
        let subject_id = identity.subject_id.clone();
        let subject_email = identity.subject_email.clone();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO tracker_identity (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            stmt.execute(params![SUBJECT_ID_KEY, subject_id])
                .with_context(|| "failed to persist subject id")?;
            stmt.execute(params![SUBJECT_EMAIL_KEY, subject_email])
                .with_context(|| "failed to persist subject email")?;
            Ok(())
        })
        .await
    }

    pub async fn load_identity(&self) -> Result<Option<PersistedIdentity>> {
        self.execute(|conn| {
            let read = |key: &str| -> Result<Option<String>> {
                conn.query_row(
                    "SELECT value FROM tracker_identity WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read {key}"))
            };

            match (read(SUBJECT_ID_KEY)?, read(SUBJECT_EMAIL_KEY)?) {
                (Some(subject_id), Some(subject_email)) => Ok(Some(PersistedIdentity {
                    subject_id,
                    subject_email,
                })),
                _ => Ok(None),
            }
        })
        .await
    }

    pub async fn clear_identity(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM tracker_identity", [])
                .with_context(|| "failed to clear persisted identity")?;
            Ok(())
        })
        .await
    }
}
