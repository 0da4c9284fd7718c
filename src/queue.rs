//! The route-or-enqueue rule shared by every producer, and the generic
//! per-kind queue facade the app's form screens submit through.

use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::connectivity::Connectivity;
use crate::db::Database;
use crate::error::EngineError;
use crate::events::{Event, EventChannel};
use crate::models::{OpKind, QueuedOperation};
use crate::sink::RemoteSink;
use crate::sync::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Written straight to the remote sink.
    Delivered,
    /// Durably queued for the sync engine to deliver later.
    Queued,
}

/// Everything a producer needs to route one operation.
#[derive(Clone)]
pub(crate) struct RouteDeps {
    pub db: Database,
    pub sink: Arc<dyn RemoteSink>,
    pub connectivity: Arc<dyn Connectivity>,
    pub sync: Arc<SyncEngine>,
    pub events: EventChannel,
}

/// Attempt a direct remote write; fall back to the durable queue on any
/// failure or when offline. Queue write failures propagate — losing the
/// queue has no recovery path, so it must never be silent.
pub(crate) async fn route_operation(
    deps: &RouteDeps,
    op: &QueuedOperation<Value>,
) -> Result<SubmitOutcome, EngineError> {
    if deps.connectivity.is_online().await {
        match deps.sink.insert(op.kind, std::slice::from_ref(op)).await {
            Ok(()) => return Ok(SubmitOutcome::Delivered),
            Err(err) => {
                warn!(
                    "direct {} write failed, queueing: {err}",
                    op.kind.as_str()
                );
            }
        }
    }

    deps.db
        .enqueue_operation(op)
        .await
        .map_err(EngineError::Storage)?;
    deps.events.emit(Event::OperationQueued { kind: op.kind });

    // Connectivity may have returned between the routing check and the
    // enqueue; a nudge closes that window.
    deps.sync.clone().nudge(op.kind);

    Ok(SubmitOutcome::Queued)
}

/// Typed facade over one queue kind. The transaction and expense screens
/// each hold one of these instead of reimplementing the offline pattern.
pub struct OfflineQueue<T> {
    kind: OpKind,
    deps: RouteDeps,
    _payload: PhantomData<fn() -> T>,
}

impl<T> OfflineQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(kind: OpKind, deps: RouteDeps) -> Self {
        Self {
            kind,
            deps,
            _payload: PhantomData,
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Routes one payload: direct write when possible, durable queue
    /// otherwise.
    pub async fn submit(&self, payload: T) -> Result<SubmitOutcome, EngineError> {
        let op = QueuedOperation::new(self.kind, payload)
            .into_envelope()
            .map_err(EngineError::Storage)?;
        route_operation(&self.deps, &op).await
    }

    /// Pending operations for this kind, oldest first.
    pub async fn pending(&self) -> Result<Vec<QueuedOperation<T>>, EngineError> {
        let ops = self
            .deps
            .db
            .list_operations(self.kind)
            .await
            .map_err(EngineError::Storage)?;
        ops.into_iter()
            .map(|op| op.decode().map_err(EngineError::Storage))
            .collect()
    }

    pub async fn pending_count(&self) -> Result<u64, EngineError> {
        self.deps
            .db
            .count_operations(self.kind)
            .await
            .map_err(EngineError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture_deps, DepsFixture};
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Expense {
        amount_cents: i64,
        note: String,
    }

    fn expense(amount_cents: i64) -> Expense {
        Expense {
            amount_cents,
            note: "fuel".into(),
        }
    }

    fn queue(fx: &DepsFixture) -> OfflineQueue<Expense> {
        OfflineQueue::new(OpKind::Expense, fx.deps())
    }

    #[tokio::test]
    async fn online_submit_goes_straight_to_the_sink() {
        let fx = fixture_deps(true);
        let queue = queue(&fx);

        let outcome = queue.submit(expense(1200)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Delivered);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
        assert_eq!(fx.sink.inserted_ids(OpKind::Expense).len(), 1);
    }

    #[tokio::test]
    async fn offline_submit_is_durably_queued() {
        let fx = fixture_deps(false);
        let queue = queue(&fx);

        let outcome = queue.submit(expense(500)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Queued);
        assert!(fx.sink.inserted_ids(OpKind::Expense).is_empty());

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, expense(500));
    }

    #[tokio::test]
    async fn sink_failure_falls_back_to_the_queue() {
        let fx = fixture_deps(true);
        fx.sink.fail_everything(true);
        let queue = queue(&fx);

        let outcome = queue.submit(expense(700)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Queued);
        assert_eq!(queue.pending_count().await.unwrap(), 1);
        // Fail-closed: queued, not delivered.
        assert!(fx.sink.inserted_ids(OpKind::Expense).is_empty());
    }
}
