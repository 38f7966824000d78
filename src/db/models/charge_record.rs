use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A user-initiated charge: a timed activity or a fixed free grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRecord {
    pub id: Option<i64>,
    pub activity_type: String,
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub ratio: f32,
    pub created_at: DateTime<Utc>,
}

impl ChargeRecord {
    pub fn new(
        activity_type: impl Into<String>,
        date: NaiveDate,
        duration_minutes: u32,
        ratio: f32,
    ) -> Self {
        Self {
            id: None,
            activity_type: activity_type.into(),
            date,
            duration_minutes,
            ratio,
            created_at: Utc::now(),
        }
    }

    /// Energy granted by this charge: `round(duration × ratio)`.
    pub fn energy_delta(&self) -> i64 {
        charge_energy(self.duration_minutes, self.ratio)
    }
}

pub fn charge_energy(duration_minutes: u32, ratio: f32) -> i64 {
    (f64::from(duration_minutes) * f64::from(ratio)).round() as i64
}
