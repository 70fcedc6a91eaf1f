use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One hourly observation for one point, as written to the extract file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Start of the hour, UTC.
    pub timestamp: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub precip_mm: Option<f64>,
    pub city: String,
    pub state: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Second precision; shared by every row of one fetch.
    pub load_dts_utc: DateTime<Utc>,
}

impl ObservationRow {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}
