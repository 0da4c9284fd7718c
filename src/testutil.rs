//! Shared in-memory collaborators for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::connectivity::Connectivity;
use crate::db::Database;
use crate::error::SinkError;
use crate::events::EventChannel;
use crate::models::{LocationSample, OpKind, QueuedOperation};
use crate::platform::{JobScheduler, LocationProvider, PermissionSet, Position};
use crate::queue::RouteDeps;
use crate::sink::RemoteSink;
use crate::sync::SyncEngine;

pub(crate) struct StaticConnectivity {
    tx: watch::Sender<bool>,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        let (tx, _) = watch::channel(online);
        Arc::new(Self { tx })
    }

    pub fn set_online(&self, online: bool) {
        let _ = self.tx.send(online);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    inserted: Mutex<Vec<(OpKind, Uuid)>>,
    fail_ids: Mutex<HashSet<Uuid>>,
    fail_all: AtomicBool,
    pub position_updates: Mutex<Vec<(String, bool)>>,
    pub configured_interval: Mutex<Option<u64>>,
}

impl RecordingSink {
    pub fn inserted_ids(&self, kind: OpKind) -> Vec<Uuid> {
        self.inserted
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_id(&self, id: Uuid) {
        self.fail_ids.lock().unwrap().insert(id);
    }

    pub fn clear_failures(&self) {
        self.fail_all.store(false, Ordering::SeqCst);
        self.fail_ids.lock().unwrap().clear();
    }
}

#[async_trait]
impl RemoteSink for RecordingSink {
    async fn insert(
        &self,
        kind: OpKind,
        items: &[QueuedOperation<Value>],
    ) -> Result<(), SinkError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(SinkError::Network("injected outage".into()));
        }
        {
            let fail_ids = self.fail_ids.lock().unwrap();
            if items.iter().any(|op| fail_ids.contains(&op.id)) {
                return Err(SinkError::Rejected { status: 422 });
            }
        }
        let mut inserted = self.inserted.lock().unwrap();
        for op in items {
            // Idempotent on id: a replayed insert is a no-op.
            if !inserted.iter().any(|(_, id)| *id == op.id) {
                inserted.push((kind, op.id));
            }
        }
        Ok(())
    }

    async fn update_latest_position(
        &self,
        subject_id: &str,
        _sample: &LocationSample,
        active: bool,
    ) -> Result<(), SinkError> {
        self.position_updates
            .lock()
            .unwrap()
            .push((subject_id.to_string(), active));
        Ok(())
    }

    async fn fetch_capture_interval(&self, _subject_id: &str) -> Result<Option<u64>, SinkError> {
        Ok(*self.configured_interval.lock().unwrap())
    }
}

pub(crate) struct ScriptedLocation {
    pub permissions: Mutex<PermissionSet>,
    pub enabled: AtomicBool,
    positions: Mutex<VecDeque<Position>>,
}

impl ScriptedLocation {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self {
            permissions: Mutex::new(PermissionSet {
                foreground: true,
                background: true,
            }),
            enabled: AtomicBool::new(true),
            positions: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push_position(&self, latitude: f64, longitude: f64) {
        self.positions.lock().unwrap().push_back(Position {
            latitude,
            longitude,
            accuracy: 5.0,
        });
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocation {
    async fn permissions(&self) -> Result<PermissionSet> {
        Ok(*self.permissions.lock().unwrap())
    }

    async fn services_enabled(&self) -> Result<bool> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn current_position(&self) -> Result<Position> {
        let mut positions = self.positions.lock().unwrap();
        // The last scripted position repeats once the queue drains.
        if positions.len() > 1 {
            Ok(positions.pop_front().unwrap())
        } else {
            positions
                .front()
                .copied()
                .ok_or_else(|| anyhow!("no scripted position"))
        }
    }
}

#[derive(Default)]
pub(crate) struct StubScheduler {
    registered: Mutex<HashSet<String>>,
    pub register_calls: AtomicUsize,
}

#[async_trait]
impl JobScheduler for StubScheduler {
    async fn is_registered(&self, job_name: &str) -> Result<bool> {
        Ok(self.registered.lock().unwrap().contains(job_name))
    }

    async fn register(&self, job_name: &str, _interval: Duration) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().insert(job_name.to_string());
        Ok(())
    }

    async fn cancel(&self, job_name: &str) -> Result<()> {
        self.registered.lock().unwrap().remove(job_name);
        Ok(())
    }
}

pub(crate) struct DepsFixture {
    pub _dir: tempfile::TempDir,
    pub db: Database,
    pub sink: Arc<RecordingSink>,
    pub connectivity: Arc<StaticConnectivity>,
    pub sync: Arc<SyncEngine>,
    pub events: EventChannel,
}

impl DepsFixture {
    pub fn deps(&self) -> RouteDeps {
        RouteDeps {
            db: self.db.clone(),
            sink: self.sink.clone(),
            connectivity: self.connectivity.clone(),
            sync: self.sync.clone(),
            events: self.events.clone(),
        }
    }
}

pub(crate) fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

pub(crate) fn fixture_deps(online: bool) -> DepsFixture {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("fieldtrack.sqlite3")).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let connectivity = StaticConnectivity::new(online);
    let events = EventChannel::new(16);
    let sync = Arc::new(SyncEngine::new(
        db.clone(),
        sink.clone(),
        connectivity.clone(),
        events.clone(),
    ));
    DepsFixture {
        _dir: dir,
        db,
        sink,
        connectivity,
        sync,
        events,
    }
}
