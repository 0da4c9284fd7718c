//! Seams to the OS services the engine depends on. The host application
//! supplies concrete implementations; tests supply scripted ones.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSet {
    pub foreground: bool,
    pub background: bool,
}

impl PermissionSet {
    /// Tracking needs both: the background job fires after the app is gone.
    pub fn granted(&self) -> bool {
        self.foreground && self.background
    }
}

/// Access to the device location service.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn permissions(&self) -> Result<PermissionSet>;

    async fn services_enabled(&self) -> Result<bool>;

    async fn current_position(&self) -> Result<Position>;
}

/// A durable job handle registered with the OS task scheduler. Registered
/// jobs outlive the process; the engine re-reads persisted identity on each
/// invocation instead of assuming in-memory state survived.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn is_registered(&self, job_name: &str) -> Result<bool>;

    async fn register(&self, job_name: &str, interval: Duration) -> Result<()>;

    async fn cancel(&self, job_name: &str) -> Result<()>;
}
