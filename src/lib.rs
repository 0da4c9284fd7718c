mod capture;
mod config;
mod connectivity;
mod db;
mod error;
mod events;
mod models;
mod platform;
mod queue;
mod sink;
mod sync;
mod tracker;

#[cfg(test)]
mod testutil;

pub use config::EngineConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use db::{Database, PersistedIdentity};
pub use error::{EngineError, SinkError};
pub use events::Event;
pub use models::{FlushStrategy, LocationSample, OpKind, QueuedOperation};
pub use platform::{JobScheduler, LocationProvider, PermissionSet, Position};
pub use queue::{OfflineQueue, SubmitOutcome};
pub use sink::{HttpRemoteSink, RemoteSink};
pub use sync::{FlushOutcome, SyncEngine};
pub use tracker::{TrackerPhase, TrackerStatus, TrackingEngine};
