mod background;
mod controller;
mod loop_worker;

pub(crate) use background::background_capture;
pub(crate) use controller::CaptureController;
pub(crate) use loop_worker::CaptureContext;

use log::warn;

use crate::error::EngineError;
use crate::events::Event;
use crate::models::{LocationSample, OpKind, QueuedOperation};
use crate::queue::{route_operation, RouteDeps, SubmitOutcome};

/// Both capture sources route through here, so foreground and background
/// samples follow exactly the same sink-or-queue decision.
#[derive(Clone)]
pub(crate) struct SampleRouter {
    pub deps: RouteDeps,
}

impl SampleRouter {
    pub async fn route_sample(
        &self,
        sample: &LocationSample,
    ) -> Result<SubmitOutcome, EngineError> {
        // The sample id doubles as the operation's idempotency key.
        let op = QueuedOperation::with_id(sample.id, OpKind::Location, sample.clone())
            .into_envelope()
            .map_err(EngineError::Storage)?;

        let outcome = route_operation(&self.deps, &op).await?;

        if outcome == SubmitOutcome::Delivered {
            // Side-channel "last known position" refresh. Not authoritative
            // history, so a failure is logged rather than queued.
            let sink = self.deps.sink.clone();
            let sample = sample.clone();
            tokio::spawn(async move {
                if let Err(err) = sink
                    .update_latest_position(&sample.subject_id, &sample, true)
                    .await
                {
                    warn!("latest position update failed: {err}");
                }
            });
        }

        self.deps.events.emit(Event::Sample(sample.clone()));
        Ok(outcome)
    }
}
