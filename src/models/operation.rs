use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The independent queue kinds. Each flushes on its own; ordering is only
/// guaranteed within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    Location,
    Transaction,
    Expense,
    ImageRef,
}

/// How a kind is drained to the remote sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStrategy {
    /// One insert call for the whole batch; the queue is cleared only after
    /// the entire batch is accepted.
    Bulk,
    /// Items are inserted one at a time, in order, each removed as it is
    /// confirmed. Used where per-item side effects exist remotely.
    PerItem,
}

impl OpKind {
    pub const ALL: [OpKind; 4] = [
        OpKind::Location,
        OpKind::Transaction,
        OpKind::Expense,
        OpKind::ImageRef,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Location => "Location",
            OpKind::Transaction => "Transaction",
            OpKind::Expense => "Expense",
            OpKind::ImageRef => "ImageRef",
        }
    }

    pub fn remote_table(&self) -> &'static str {
        match self {
            OpKind::Location => "location_history",
            OpKind::Transaction => "offline_transactions",
            OpKind::Expense => "offline_expenses",
            OpKind::ImageRef => "uploaded_images",
        }
    }

    pub fn flush_strategy(&self) -> FlushStrategy {
        match self {
            OpKind::Location => FlushStrategy::Bulk,
            OpKind::Transaction | OpKind::Expense | OpKind::ImageRef => FlushStrategy::PerItem,
        }
    }
}

/// Envelope around a payload waiting for remote delivery. `id` stays stable
/// across retries; only `attempts` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation<T> {
    pub id: Uuid,
    pub kind: OpKind,
    pub payload: T,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

impl<T> QueuedOperation<T> {
    pub fn new(kind: OpKind, payload: T) -> Self {
        Self::with_id(Uuid::new_v4(), kind, payload)
    }

    /// Used when the payload already carries the idempotency key (location
    /// samples), so envelope and payload share one id.
    pub fn with_id(id: Uuid, kind: OpKind, payload: T) -> Self {
        Self {
            id,
            kind,
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }
}

impl<T: Serialize> QueuedOperation<T> {
    /// Erases the payload type for storage and the sink wire format.
    pub fn into_envelope(self) -> Result<QueuedOperation<Value>> {
        let payload =
            serde_json::to_value(&self.payload).context("failed to serialize operation payload")?;
        Ok(QueuedOperation {
            id: self.id,
            kind: self.kind,
            payload,
            enqueued_at: self.enqueued_at,
            attempts: self.attempts,
        })
    }
}

impl QueuedOperation<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<QueuedOperation<T>> {
        let payload = serde_json::from_value(self.payload)
            .context("failed to deserialize operation payload")?;
        Ok(QueuedOperation {
            id: self.id,
            kind: self.kind,
            payload,
            enqueued_at: self.enqueued_at,
            attempts: self.attempts,
        })
    }
}
