use anyhow::{Context, Result};
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_kind, to_u32},
};
use crate::models::{OpKind, QueuedOperation};

impl Database {
    /// Appends an operation to the durable queue. A failure here means the
    /// local store is broken and is always propagated to the caller.
    pub async fn enqueue_operation<T: Serialize>(&self, op: &QueuedOperation<T>) -> Result<()> {
        let payload_json =
            serde_json::to_string(&op.payload).context("failed to serialize operation payload")?;
        let id = op.id.to_string();
        let kind = op.kind.as_str();
        let enqueued_at = op.enqueued_at.to_rfc3339();
        let attempts = i64::from(op.attempts);

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO queued_operations (id, kind, payload_json, enqueued_at, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, kind, payload_json, enqueued_at, attempts],
            )
            .with_context(|| "failed to enqueue operation")?;
            Ok(())
        })
        .await
    }

    /// Pending operations of one kind, oldest first. Insertion order is the
    /// delivery order, so rows come back in rowid order.
    pub async fn list_operations(&self, kind: OpKind) -> Result<Vec<QueuedOperation<Value>>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, payload_json, enqueued_at, attempts
                 FROM queued_operations
                 WHERE kind = ?1
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query(params![kind.as_str()])?;
            let mut operations = Vec::new();
            while let Some(row) = rows.next()? {
                let id_raw: String = row.get(0)?;
                let kind_raw: String = row.get(1)?;
                let payload_json: String = row.get(2)?;
                let enqueued_raw: String = row.get(3)?;
                let attempts_raw: i64 = row.get(4)?;

                operations.push(QueuedOperation {
                    id: Uuid::parse_str(&id_raw)
                        .with_context(|| format!("invalid operation id {id_raw}"))?,
                    kind: parse_kind(&kind_raw)?,
                    payload: serde_json::from_str(&payload_json)
                        .context("failed to parse stored payload")?,
                    enqueued_at: parse_datetime(&enqueued_raw, "enqueued_at")?,
                    attempts: to_u32(attempts_raw, "attempts")?,
                });
            }

            Ok(operations)
        })
        .await
    }

    pub async fn count_operations(&self, kind: OpKind) -> Result<u64> {
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queued_operations WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Removes one confirmed-delivered operation.
    pub async fn remove_operation(&self, kind: OpKind, id: Uuid) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM queued_operations WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )
            .with_context(|| "failed to remove operation")?;
            Ok(())
        })
        .await
    }

    /// Removes every operation of a kind after a full successful flush.
    pub async fn clear_operations(&self, kind: OpKind) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM queued_operations WHERE kind = ?1",
                params![kind.as_str()],
            )
            .with_context(|| "failed to clear operations")?;
            Ok(())
        })
        .await
    }

    pub async fn increment_attempts(&self, kind: OpKind, ids: Vec<Uuid>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "UPDATE queued_operations SET attempts = attempts + 1
                 WHERE kind = ?1 AND id = ?2",
            )?;
            for id in &ids {
                stmt.execute(params![kind.as_str(), id.to_string()])?;
            }
            Ok(())
        })
        .await
    }
}
