use std::sync::Arc;

use log::{info, warn};

use crate::error::EngineError;
use crate::models::LocationSample;
use crate::platform::LocationProvider;
use crate::queue::RouteDeps;

use super::SampleRouter;

/// One OS-scheduled background invocation. Identity comes from the durable
/// store, not from memory: after the process was evicted and restarted by
/// the scheduler, this is the only identity there is. No persisted identity
/// means no session is running, so the job quietly does nothing.
pub(crate) async fn background_capture(
    deps: &RouteDeps,
    location: &Arc<dyn LocationProvider>,
    device_label: &str,
) -> Result<Option<LocationSample>, EngineError> {
    let identity = match deps.db.load_identity().await.map_err(EngineError::Storage)? {
        Some(identity) => identity,
        None => {
            info!("background capture invoked with no persisted identity; skipping");
            return Ok(None);
        }
    };

    let position = match location.current_position().await {
        Ok(position) => position,
        Err(err) => {
            warn!("background location read failed: {err:?}");
            return Ok(None);
        }
    };

    let sample = LocationSample::new(
        identity.subject_id,
        identity.subject_email,
        position.latitude,
        position.longitude,
        position.accuracy,
        device_label,
    );

    let router = SampleRouter { deps: deps.clone() };
    router.route_sample(&sample).await?;

    Ok(Some(sample))
}
