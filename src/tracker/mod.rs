mod controller;
mod state;

pub use controller::TrackingEngine;
pub use state::{TrackerPhase, TrackerState, TrackerStatus};
