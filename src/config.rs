use std::time::Duration;

/// Tunables for the capture and sync engine.
///
/// The capture interval itself is not here: it comes from the subject's
/// remote config record at `start()`, with `default_interval_seconds` as
/// the fallback when that record or the network is unavailable.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Human-readable label attached to every sample (e.g. device model).
    pub device_label: String,
    /// Capture interval used when the remote config cannot be read.
    pub default_interval_seconds: u64,
    /// Foreground samples closer than this to the previous one are dropped.
    pub min_distance_meters: f64,
    /// Interval handed to the OS scheduler for the background job.
    pub background_interval_seconds: u64,
    /// Well-known name the background job is registered under.
    pub background_job_name: String,
    /// Endpoint for the connectivity reachability probe.
    pub probe_url: String,
    /// Probe timeout; expiry counts as offline.
    pub probe_timeout: Duration,
    /// Minimum gap between real probes; results are cached in between.
    pub min_probe_gap: Duration,
    /// Cadence of the periodic flush trigger.
    pub flush_tick: Duration,
    /// Request timeout for remote sink calls.
    pub sink_timeout: Duration,
    /// Capacity of the broadcast event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_label: "unknown-device".into(),
            default_interval_seconds: 30,
            min_distance_meters: 10.0,
            background_interval_seconds: 300,
            background_job_name: "fieldtrack-background-capture".into(),
            probe_url: "https://clients3.google.com/generate_204".into(),
            probe_timeout: Duration::from_secs(2),
            min_probe_gap: Duration::from_secs(5),
            flush_tick: Duration::from_secs(60),
            sink_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}
