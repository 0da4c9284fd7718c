use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::LocationSample;
use crate::platform::LocationProvider;
use crate::tracker::TrackerState;

use super::SampleRouter;

const CAPTURE_TIMEOUT_SECS: u64 = 20;

pub(crate) struct CaptureContext {
    pub subject_id: String,
    pub subject_email: String,
    pub device_label: String,
    pub min_distance_meters: f64,
    pub location: Arc<dyn LocationProvider>,
    pub router: SampleRouter,
    pub state: Arc<Mutex<TrackerState>>,
}

/// Foreground capture loop: one sample per tick while the session is
/// active. A failed tick is logged and the loop keeps going; only the
/// cancellation token stops it.
pub(crate) async fn capture_loop(
    ctx: CaptureContext,
    interval_seconds: u64,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fut = perform_capture(&ctx);
                match tokio::time::timeout(Duration::from_secs(CAPTURE_TIMEOUT_SECS), fut).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!("capture failed for {}: {err:?}", ctx.subject_id),
                    Err(_) => warn!(
                        "capture timeout (> {}s) for {}",
                        CAPTURE_TIMEOUT_SECS, ctx.subject_id
                    ),
                }
            }
            _ = cancel_token.cancelled() => {
                info!("capture loop shutting down");
                break;
            }
        }
    }
}

async fn perform_capture(ctx: &CaptureContext) -> Result<()> {
    let position = ctx
        .location
        .current_position()
        .await
        .context("location read failed")?;

    // Minimum-distance filter against the previous accepted sample.
    {
        let state = ctx.state.lock().await;
        if let Some(last) = &state.last_sample {
            let moved = last.distance_meters(position.latitude, position.longitude);
            if moved < ctx.min_distance_meters {
                debug!("skipping sample, moved {moved:.1} m");
                return Ok(());
            }
        }
    }

    let sample = LocationSample::new(
        ctx.subject_id.clone(),
        ctx.subject_email.clone(),
        position.latitude,
        position.longitude,
        position.accuracy,
        ctx.device_label.clone(),
    );

    ctx.router.route_sample(&sample).await?;

    let mut state = ctx.state.lock().await;
    state.last_sample = Some(sample);
    Ok(())
}
