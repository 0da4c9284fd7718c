use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LocationSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl Default for TrackerPhase {
    fn default() -> Self {
        TrackerPhase::Stopped
    }
}

/// Single source of truth for whether tracking is running and for whom.
/// Guarded by the engine's state mutex; both capture sources read it.
#[derive(Debug, Clone, Default)]
pub struct TrackerState {
    pub phase: TrackerPhase,
    pub subject_id: Option<String>,
    pub subject_email: Option<String>,
    pub interval_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sample: Option<LocationSample>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_start(&mut self, subject_id: String, subject_email: String) {
        *self = Self {
            phase: TrackerPhase::Starting,
            subject_id: Some(subject_id),
            subject_email: Some(subject_email),
            ..Self::default()
        };
    }

    pub fn activate(&mut self, interval_seconds: u64, started_at: DateTime<Utc>) {
        self.phase = TrackerPhase::Active;
        self.interval_seconds = interval_seconds;
        self.started_at = Some(started_at);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot returned by `TrackingEngine::status()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub phase: TrackerPhase,
    pub is_active: bool,
    pub subject_id: Option<String>,
    pub interval_seconds: Option<u64>,
    pub last_sample: Option<LocationSample>,
    pub foreground_registered: bool,
    pub background_registered: bool,
}
