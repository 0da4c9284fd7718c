use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// One device location reading. Immutable once created; `id` is the
/// client-generated idempotency key the remote insert dedups on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub id: Uuid,
    pub subject_id: String,
    pub subject_email: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub captured_at: DateTime<Utc>,
    pub device_label: String,
}

impl LocationSample {
    pub fn new(
        subject_id: impl Into<String>,
        subject_email: impl Into<String>,
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        device_label: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            subject_email: subject_email.into(),
            latitude,
            longitude,
            accuracy,
            captured_at: Utc::now(),
            device_label: device_label.into(),
        }
    }

    /// Great-circle distance from this sample to the given coordinates,
    /// used by the foreground minimum-distance filter.
    pub fn distance_meters(&self, latitude: f64, longitude: f64) -> f64 {
        let d_lat = (latitude - self.latitude).to_radians();
        let d_lon = (longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}
