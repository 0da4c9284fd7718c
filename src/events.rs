use tokio::sync::broadcast;

use crate::models::{LocationSample, OpKind};

/// Engine status events consumed by the host application (banners, badges).
#[derive(Debug, Clone)]
pub enum Event {
    Started { subject_id: String },
    Stopped { subject_id: String },
    /// A sample was captured, whether delivered directly or queued.
    Sample(LocationSample),
    /// An operation was written to the durable queue for later delivery.
    OperationQueued { kind: OpKind },
    FlushSucceeded { kind: OpKind, count: usize },
    FlushFailed { kind: OpKind, error: String },
}

#[derive(Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<Event>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Having no subscriber is normal; the send error is ignored.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
