use thiserror::Error;

/// Failures surfaced by the engine's control API.
///
/// Only `start()` ever returns these to a caller; capture and flush paths
/// degrade to queueing and retry instead of raising.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location services are disabled")]
    ServiceDisabled,

    /// The durable queue itself failed. There is no recovery path for a
    /// broken local store, so this is always propagated.
    #[error("local storage failure")]
    Storage(#[source] anyhow::Error),
}

/// Failures returned by the remote sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport-level failure, including timeouts. Recovered by routing
    /// the operation to the durable queue.
    #[error("network unavailable: {0}")]
    Network(String),

    /// The remote accepted the connection but refused the payload.
    #[error("remote rejected request with status {status}")]
    Rejected { status: u16 },
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Network(err.to_string())
    }
}
