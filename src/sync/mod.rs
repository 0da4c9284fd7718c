//! Drains the durable queues into the remote sink. Runs are triggered by
//! connectivity restoration, a periodic tick, engine start, and post-enqueue
//! nudges; at most one flush per kind is ever in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::connectivity::Connectivity;
use crate::db::Database;
use crate::events::{Event, EventChannel};
use crate::models::{FlushStrategy, OpKind};
use crate::sink::RemoteSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush for this kind was already running; the trigger is
    /// dropped, the queue itself is the record of outstanding work.
    InFlight,
    /// The connectivity re-check reported offline; nothing was attempted.
    Offline,
    /// The queue was drained (possibly trivially, when already empty).
    Drained { delivered: usize },
    /// The run stopped early. Confirmed items were removed; the rest stay
    /// queued for the next trigger.
    Failed { delivered: usize },
}

pub struct SyncEngine {
    db: Database,
    sink: Arc<dyn RemoteSink>,
    connectivity: Arc<dyn Connectivity>,
    events: EventChannel,
    in_flight: Mutex<HashSet<OpKind>>,
}

/// Removes the kind from the in-flight set when the run ends, however it
/// ends.
struct FlushGuard<'a> {
    in_flight: &'a Mutex<HashSet<OpKind>>,
    kind: OpKind,
}

impl<'a> FlushGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<OpKind>>, kind: OpKind) -> Option<Self> {
        let mut guard = in_flight.lock().unwrap();
        if !guard.insert(kind) {
            return None;
        }
        Some(Self { in_flight, kind })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.kind);
    }
}

impl SyncEngine {
    pub fn new(
        db: Database,
        sink: Arc<dyn RemoteSink>,
        connectivity: Arc<dyn Connectivity>,
        events: EventChannel,
    ) -> Self {
        Self {
            db,
            sink,
            connectivity,
            events,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Drains one kind. Returns `Err` only when the durable queue itself
    /// fails; sink failures end the run and are reported on the event
    /// channel instead.
    pub async fn flush(&self, kind: OpKind) -> Result<FlushOutcome> {
        let _guard = match FlushGuard::acquire(&self.in_flight, kind) {
            Some(guard) => guard,
            None => return Ok(FlushOutcome::InFlight),
        };

        if !self.connectivity.is_online().await {
            return Ok(FlushOutcome::Offline);
        }

        let ops = self.db.list_operations(kind).await?;
        if ops.is_empty() {
            return Ok(FlushOutcome::Drained { delivered: 0 });
        }

        match kind.flush_strategy() {
            FlushStrategy::Bulk => match self.sink.insert(kind, &ops).await {
                Ok(()) => {
                    self.db.clear_operations(kind).await?;
                    let delivered = ops.len();
                    info!("flushed {delivered} {} operation(s)", kind.as_str());
                    self.events.emit(Event::FlushSucceeded {
                        kind,
                        count: delivered,
                    });
                    Ok(FlushOutcome::Drained { delivered })
                }
                Err(err) => {
                    let ids = ops.iter().map(|op| op.id).collect();
                    self.db.increment_attempts(kind, ids).await?;
                    warn!("bulk flush of {} failed: {err}", kind.as_str());
                    self.events.emit(Event::FlushFailed {
                        kind,
                        error: err.to_string(),
                    });
                    Ok(FlushOutcome::Failed { delivered: 0 })
                }
            },
            FlushStrategy::PerItem => {
                let mut delivered = 0;
                for op in &ops {
                    match self.sink.insert(kind, std::slice::from_ref(op)).await {
                        Ok(()) => {
                            self.db.remove_operation(kind, op.id).await?;
                            delivered += 1;
                        }
                        Err(err) => {
                            self.db.increment_attempts(kind, vec![op.id]).await?;
                            warn!(
                                "flush of {} stopped at item {} of {}: {err}",
                                kind.as_str(),
                                delivered + 1,
                                ops.len()
                            );
                            self.events.emit(Event::FlushFailed {
                                kind,
                                error: err.to_string(),
                            });
                            return Ok(FlushOutcome::Failed { delivered });
                        }
                    }
                }
                info!("flushed {delivered} {} operation(s)", kind.as_str());
                self.events.emit(Event::FlushSucceeded {
                    kind,
                    count: delivered,
                });
                Ok(FlushOutcome::Drained { delivered })
            }
        }
    }

    pub async fn flush_all(&self) {
        for kind in OpKind::ALL {
            if let Err(err) = self.flush(kind).await {
                // Queue storage failing mid-flush has no recovery path
                // here; surface it loudly and move on to the next kind.
                error!("flush of {} hit a storage failure: {err:?}", kind.as_str());
            }
        }
    }

    /// Post-enqueue trigger: covers connectivity returning between the
    /// routing check and the durable write. Fire-and-forget so capture
    /// callbacks never wait on a flush.
    pub fn nudge(self: Arc<Self>, kind: OpKind) {
        tokio::spawn(async move {
            if self.connectivity.is_online().await {
                if let Err(err) = self.flush(kind).await {
                    error!("nudged flush of {} failed: {err:?}", kind.as_str());
                }
            }
        });
    }

    /// Long-lived trigger task: flushes once at startup, then on every
    /// offline-to-online transition and on the periodic tick.
    pub fn spawn_workers(
        self: Arc<Self>,
        flush_tick: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            let mut online_rx = engine.connectivity.subscribe();
            let mut was_online = *online_rx.borrow();

            engine.flush_all().await;

            let mut ticker = tokio::time::interval(flush_tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick completes immediately

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let online = engine.connectivity.is_online().await;
                        if online {
                            engine.flush_all().await;
                        }
                        was_online = online;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if online && !was_online {
                            info!("connectivity restored; flushing pending queues");
                            engine.flush_all().await;
                        }
                        was_online = online;
                    }
                    _ = cancel.cancelled() => {
                        info!("sync workers shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueuedOperation;
    use crate::testutil::fixture_deps;
    use serde_json::Value;
    use uuid::Uuid;

    fn op(kind: OpKind, marker: u32) -> QueuedOperation<Value> {
        QueuedOperation::new(kind, serde_json::json!({ "marker": marker }))
    }

    #[tokio::test]
    async fn offline_flush_attempts_nothing() {
        let fx = fixture_deps(false);
        fx.db.enqueue_operation(&op(OpKind::Location, 1)).await.unwrap();

        let outcome = fx.sync.flush(OpKind::Location).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Offline);
        assert!(fx.sink.inserted_ids(OpKind::Location).is_empty());
        assert_eq!(fx.db.count_operations(OpKind::Location).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bulk_flush_clears_the_queue_in_order() {
        let fx = fixture_deps(true);
        let ops = [
            op(OpKind::Location, 1),
            op(OpKind::Location, 2),
            op(OpKind::Location, 3),
        ];
        for operation in &ops {
            fx.db.enqueue_operation(operation).await.unwrap();
        }

        let outcome = fx.sync.flush(OpKind::Location).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Drained { delivered: 3 });
        assert_eq!(fx.db.count_operations(OpKind::Location).await.unwrap(), 0);

        let expected: Vec<Uuid> = ops.iter().map(|o| o.id).collect();
        assert_eq!(fx.sink.inserted_ids(OpKind::Location), expected);
    }

    #[tokio::test]
    async fn failed_bulk_flush_keeps_everything_and_tracks_attempts() {
        let fx = fixture_deps(true);
        fx.db.enqueue_operation(&op(OpKind::Location, 1)).await.unwrap();
        fx.sink.fail_everything(true);

        let outcome = fx.sync.flush(OpKind::Location).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Failed { delivered: 0 });

        let remaining = fx.db.list_operations(OpKind::Location).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].attempts, 1);

        // Outage over: the next trigger drains from the top.
        fx.sink.clear_failures();
        let outcome = fx.sync.flush(OpKind::Location).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Drained { delivered: 1 });
        assert_eq!(fx.db.count_operations(OpKind::Location).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn per_item_flush_stops_at_the_first_failure() {
        let fx = fixture_deps(true);
        let ops = [
            op(OpKind::Transaction, 1),
            op(OpKind::Transaction, 2),
            op(OpKind::Transaction, 3),
        ];
        for operation in &ops {
            fx.db.enqueue_operation(operation).await.unwrap();
        }
        fx.sink.fail_id(ops[1].id);

        let outcome = fx.sync.flush(OpKind::Transaction).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Failed { delivered: 1 });

        let remaining = fx.db.list_operations(OpKind::Transaction).await.unwrap();
        let remaining_ids: Vec<Uuid> = remaining.iter().map(|o| o.id).collect();
        assert_eq!(remaining_ids, vec![ops[1].id, ops[2].id]);
        assert_eq!(remaining[0].attempts, 1);

        // The failed item recovers; the already-delivered item is not
        // re-sent by the next run.
        fx.sink.clear_failures();
        let outcome = fx.sync.flush(OpKind::Transaction).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Drained { delivered: 2 });
        assert_eq!(fx.db.count_operations(OpKind::Transaction).await.unwrap(), 0);
        assert_eq!(
            fx.sink.inserted_ids(OpKind::Transaction),
            vec![ops[0].id, ops[1].id, ops[2].id]
        );
    }

    #[tokio::test]
    async fn second_concurrent_trigger_is_dropped() {
        let fx = fixture_deps(true);

        let _held = FlushGuard::acquire(&fx.sync.in_flight, OpKind::Location).unwrap();
        let outcome = fx.sync.flush(OpKind::Location).await.unwrap();
        assert_eq!(outcome, FlushOutcome::InFlight);
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let in_flight = Mutex::new(HashSet::new());
        {
            let _guard = FlushGuard::acquire(&in_flight, OpKind::Expense).unwrap();
            assert!(FlushGuard::acquire(&in_flight, OpKind::Expense).is_none());
            // Other kinds flush independently.
            assert!(FlushGuard::acquire(&in_flight, OpKind::Location).is_some());
        }
        assert!(FlushGuard::acquire(&in_flight, OpKind::Expense).is_some());
    }

    #[tokio::test]
    async fn workers_flush_when_connectivity_returns() {
        let fx = fixture_deps(false);
        fx.db.enqueue_operation(&op(OpKind::Location, 1)).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = fx
            .sync
            .clone()
            .spawn_workers(Duration::from_secs(3600), cancel.clone());

        // Give the startup flush a chance to observe the offline state.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.db.count_operations(OpKind::Location).await.unwrap(), 1);

        fx.connectivity.set_online(true);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if fx.db.count_operations(OpKind::Location).await.unwrap() == 0 {
                break;
            }
        }
        assert_eq!(fx.db.count_operations(OpKind::Location).await.unwrap(), 0);
        assert_eq!(fx.sink.inserted_ids(OpKind::Location).len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
