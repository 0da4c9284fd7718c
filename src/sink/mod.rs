use async_trait::async_trait;
use serde_json::Value;

use crate::error::SinkError;
use crate::models::{LocationSample, OpKind, QueuedOperation};

mod http;

pub use http::HttpRemoteSink;

/// Thin contract over the hosted backend. Inserts are idempotent on the
/// operation `id`: replaying a delivered item must not create a second row.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn insert(&self, kind: OpKind, items: &[QueuedOperation<Value>])
        -> Result<(), SinkError>;

    /// Upsert of the subject's "last known position" record. Side-channel
    /// only; failures are logged by callers, never queued.
    async fn update_latest_position(
        &self,
        subject_id: &str,
        sample: &LocationSample,
        active: bool,
    ) -> Result<(), SinkError>;

    /// Capture interval configured for this subject, if any.
    async fn fetch_capture_interval(&self, subject_id: &str) -> Result<Option<u64>, SinkError>;
}
