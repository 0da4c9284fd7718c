use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{background_capture, CaptureContext, CaptureController, SampleRouter};
use crate::config::EngineConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::db::{Database, PersistedIdentity};
use crate::error::EngineError;
use crate::events::{Event, EventChannel};
use crate::models::{LocationSample, OpKind};
use crate::platform::{JobScheduler, LocationProvider};
use crate::queue::{OfflineQueue, RouteDeps};
use crate::sink::RemoteSink;
use crate::sync::SyncEngine;

use super::state::{TrackerPhase, TrackerState, TrackerStatus};

/// The engine instance the host application owns. Everything hangs off it:
/// the tracking state machine, both capture sources, the sync workers and
/// the per-kind offline queues.
pub struct TrackingEngine {
    config: EngineConfig,
    db: Database,
    sink: Arc<dyn RemoteSink>,
    location: Arc<dyn LocationProvider>,
    scheduler: Arc<dyn JobScheduler>,
    connectivity: Arc<dyn Connectivity>,
    sync: Arc<SyncEngine>,
    events: EventChannel,
    state: Arc<Mutex<TrackerState>>,
    capture: Arc<Mutex<CaptureController>>,
    // Serialises start/stop so transitions cannot interleave.
    lifecycle: Mutex<()>,
    workers: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl TrackingEngine {
    pub fn new(
        config: EngineConfig,
        db: Database,
        sink: Arc<dyn RemoteSink>,
        location: Arc<dyn LocationProvider>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> anyhow::Result<Self> {
        let connectivity: Arc<dyn Connectivity> = Arc::new(ConnectivityMonitor::new(&config)?);
        Ok(Self::with_connectivity(
            config,
            db,
            sink,
            location,
            scheduler,
            connectivity,
        ))
    }

    /// Constructor with an injected connectivity source, for hosts that
    /// already track reachability (and for tests).
    pub fn with_connectivity(
        config: EngineConfig,
        db: Database,
        sink: Arc<dyn RemoteSink>,
        location: Arc<dyn LocationProvider>,
        scheduler: Arc<dyn JobScheduler>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let events = EventChannel::new(config.event_capacity);
        let sync = Arc::new(SyncEngine::new(
            db.clone(),
            sink.clone(),
            connectivity.clone(),
            events.clone(),
        ));

        Self {
            config,
            db,
            sink,
            location,
            scheduler,
            connectivity,
            sync,
            events,
            state: Arc::new(Mutex::new(TrackerState::new())),
            capture: Arc::new(Mutex::new(CaptureController::new())),
            lifecycle: Mutex::new(()),
            workers: Mutex::new(None),
        }
    }

    fn route_deps(&self) -> RouteDeps {
        RouteDeps {
            db: self.db.clone(),
            sink: self.sink.clone(),
            connectivity: self.connectivity.clone(),
            sync: self.sync.clone(),
            events: self.events.clone(),
        }
    }

    /// Starts tracking for the given identity.
    ///
    /// Fails with `PermissionDenied`/`ServiceDisabled` before anything is
    /// registered; the state stays `Stopped`. Calling it while already
    /// active is a logged no-op.
    pub async fn start(
        &self,
        subject_id: &str,
        subject_email: &str,
    ) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let state = self.state.lock().await;
            if state.phase != TrackerPhase::Stopped {
                warn!("tracking start requested while {:?}; ignoring", state.phase);
                return Ok(());
            }
        }

        self.state
            .lock()
            .await
            .begin_start(subject_id.to_string(), subject_email.to_string());

        match self.location.permissions().await {
            Ok(permissions) if permissions.granted() => {}
            Ok(_) => return Err(self.fail_start(EngineError::PermissionDenied).await),
            Err(err) => {
                error!("permission check failed: {err:?}");
                return Err(self.fail_start(EngineError::PermissionDenied).await);
            }
        }

        match self.location.services_enabled().await {
            Ok(true) => {}
            Ok(false) => return Err(self.fail_start(EngineError::ServiceDisabled).await),
            Err(err) => {
                error!("location service check failed: {err:?}");
                return Err(self.fail_start(EngineError::ServiceDisabled).await);
            }
        }

        // Persist identity first: the background job needs it to resume
        // after a process restart.
        let identity = PersistedIdentity {
            subject_id: subject_id.to_string(),
            subject_email: subject_email.to_string(),
        };
        if let Err(err) = self.db.save_identity(&identity).await {
            return Err(self.fail_start(EngineError::Storage(err)).await);
        }

        let interval_seconds = match self.sink.fetch_capture_interval(subject_id).await {
            Ok(Some(seconds)) if seconds > 0 => seconds,
            Ok(_) => self.config.default_interval_seconds,
            Err(err) => {
                warn!("capture interval fetch failed, using default: {err}");
                self.config.default_interval_seconds
            }
        };

        self.register_background_job().await;

        let ctx = CaptureContext {
            subject_id: subject_id.to_string(),
            subject_email: subject_email.to_string(),
            device_label: self.config.device_label.clone(),
            min_distance_meters: self.config.min_distance_meters,
            location: self.location.clone(),
            router: SampleRouter {
                deps: self.route_deps(),
            },
            state: self.state.clone(),
        };
        if let Err(err) = self.capture.lock().await.start(ctx, interval_seconds) {
            error!("foreground capture start failed: {err:?}");
        }

        self.spawn_workers().await;

        self.state.lock().await.activate(interval_seconds, Utc::now());
        self.events.emit(Event::Started {
            subject_id: subject_id.to_string(),
        });
        info!("tracking started for {subject_id} (interval {interval_seconds}s)");
        Ok(())
    }

    /// Ends the session. Never fails: network problems during the final
    /// position update are logged, everything else is torn down regardless.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let (subject_id, last_sample) = {
            let mut state = self.state.lock().await;
            if state.phase != TrackerPhase::Active {
                return;
            }
            state.phase = TrackerPhase::Stopping;
            (
                state.subject_id.clone().unwrap_or_default(),
                state.last_sample.clone(),
            )
        };

        // Best-effort final "last known position" update, skipped offline.
        if let Some(sample) = last_sample {
            if self.connectivity.is_online().await {
                if let Err(err) = self
                    .sink
                    .update_latest_position(&subject_id, &sample, false)
                    .await
                {
                    warn!("final position update failed: {err}");
                }
            }
        }

        if let Err(err) = self.capture.lock().await.stop().await {
            error!("capture loop shutdown failed: {err:?}");
        }

        self.halt_workers().await;

        if let Err(err) = self.scheduler.cancel(&self.config.background_job_name).await {
            error!("background job deregistration failed: {err:?}");
        }

        // A straggling background invocation must find no identity and
        // take the no-op path.
        if let Err(err) = self.db.clear_identity().await {
            error!("failed to clear persisted identity: {err:?}");
        }

        self.state.lock().await.reset();
        self.events.emit(Event::Stopped {
            subject_id: subject_id.clone(),
        });
        info!("tracking stopped for {subject_id}");
    }

    pub async fn status(&self) -> TrackerStatus {
        let state = self.state.lock().await.clone();
        let foreground_registered = self.capture.lock().await.is_running();
        let background_registered = self
            .scheduler
            .is_registered(&self.config.background_job_name)
            .await
            .unwrap_or(false);

        let is_active = state.phase == TrackerPhase::Active;
        TrackerStatus {
            phase: state.phase,
            is_active,
            subject_id: state.subject_id,
            interval_seconds: is_active.then_some(state.interval_seconds),
            last_sample: state.last_sample,
            foreground_registered,
            background_registered,
        }
    }

    /// Entry point the host wires into the OS scheduler callback. Safe to
    /// call in a freshly restarted process: identity is re-read from the
    /// durable store and the call no-ops when none is persisted.
    pub async fn background_tick(&self) -> Result<(), EngineError> {
        let deps = self.route_deps();
        let routed =
            background_capture(&deps, &self.location, &self.config.device_label).await?;

        if let Some(sample) = routed {
            let mut state = self.state.lock().await;
            if state.phase == TrackerPhase::Active {
                state.last_sample = Some(sample);
            }
        }
        Ok(())
    }

    /// Typed handle to one offline queue kind.
    pub fn queue<T>(&self, kind: OpKind) -> OfflineQueue<T>
    where
        T: Serialize + DeserializeOwned,
    {
        OfflineQueue::new(kind, self.route_deps())
    }

    /// Drains every queue once, e.g. at app start before any session runs.
    pub async fn flush_pending(&self) {
        self.sync.flush_all().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn last_sample(&self) -> Option<LocationSample> {
        self.state.try_lock().ok().and_then(|state| state.last_sample.clone())
    }

    async fn fail_start(&self, err: EngineError) -> EngineError {
        self.state.lock().await.reset();
        err
    }

    /// Idempotent: an already-registered job is left alone.
    async fn register_background_job(&self) {
        let job_name = &self.config.background_job_name;
        let registered = match self.scheduler.is_registered(job_name).await {
            Ok(registered) => registered,
            Err(err) => {
                warn!("background job registration query failed: {err:?}");
                false
            }
        };
        if registered {
            return;
        }
        let interval = Duration::from_secs(self.config.background_interval_seconds);
        if let Err(err) = self.scheduler.register(job_name, interval).await {
            error!("background job registration failed: {err:?}");
        }
    }

    async fn spawn_workers(&self) {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = self
            .sync
            .clone()
            .spawn_workers(self.config.flush_tick, cancel.clone());
        *workers = Some((cancel, handle));
    }

    async fn halt_workers(&self) {
        if let Some((cancel, handle)) = self.workers.lock().await.take() {
            cancel.cancel();
            if let Err(err) = handle.await {
                error!("sync worker task failed to join: {err}");
            }
        }
    }
}
