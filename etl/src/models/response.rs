use super::{GeoPoint, ObservationRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use common::{Error, Result};
use serde::Deserialize;

/// Format of the `hourly.time` entries returned by the API.
pub const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Deserialize, Clone)]
pub struct HourlyResponse {
    #[serde(default)]
    pub hourly: Option<HourlySeries>,
}

/// Index-aligned hourly series. Every field is optional at the wire level so
/// a missing series surfaces as a typed upstream error instead of a JSON one.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Option<Vec<String>>,
    #[serde(default)]
    pub temperature_2m: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub relative_humidity_2m: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub precipitation: Option<Vec<Option<f64>>>,
}

impl HourlyResponse {
    pub fn into_series(self, point: &GeoPoint) -> Result<HourlySeries> {
        self.hourly.ok_or_else(|| {
            Error::upstream(format!("response for {} has no 'hourly' object", point.label()))
        })
    }
}

impl HourlySeries {
    /// Zips the series index-wise into rows for `point`.
    ///
    /// Every row must fall on `target_date`; all rows share `load_dts_utc`.
    pub fn into_rows(
        self,
        point: &GeoPoint,
        target_date: NaiveDate,
        load_dts_utc: DateTime<Utc>,
    ) -> Result<Vec<ObservationRow>> {
        let label = point.label();
        let missing = |series: &str| {
            Error::upstream(format!("response for {} is missing series '{}'", label, series))
        };

        let time = self.time.ok_or_else(|| missing("time"))?;
        let temperature = self.temperature_2m.ok_or_else(|| missing("temperature_2m"))?;
        let humidity = self
            .relative_humidity_2m
            .ok_or_else(|| missing("relative_humidity_2m"))?;
        let precipitation = self.precipitation.ok_or_else(|| missing("precipitation"))?;

        let expected = time.len();
        for (name, len) in [
            ("temperature_2m", temperature.len()),
            ("relative_humidity_2m", humidity.len()),
            ("precipitation", precipitation.len()),
        ] {
            if len != expected {
                return Err(Error::upstream(format!(
                    "response for {}: series '{}' has {} values, 'time' has {}",
                    label, name, len, expected
                )));
            }
        }

        let mut rows = Vec::with_capacity(expected);
        for (i, raw_time) in time.iter().enumerate() {
            let timestamp = NaiveDateTime::parse_from_str(raw_time, API_TIME_FORMAT).map_err(|e| {
                Error::upstream(format!(
                    "response for {}: invalid timestamp '{}': {}",
                    label, raw_time, e
                ))
            })?;

            if timestamp.date() != target_date {
                return Err(Error::upstream(format!(
                    "response for {}: timestamp {} is outside target date {}",
                    label, raw_time, target_date
                )));
            }

            rows.push(ObservationRow {
                timestamp,
                temperature_c: temperature[i],
                humidity_pct: humidity[i],
                precip_mm: precipitation[i],
                city: point.name.clone(),
                state: point.region.clone(),
                latitude: point.latitude,
                longitude: point.longitude,
                load_dts_utc,
            });
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn warsaw() -> GeoPoint {
        GeoPoint::new("Warsaw", None, 52.23, 21.01)
    }

    fn load_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_rows_follow_source_order() {
        let body = r#"{
            "latitude": 52.23,
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [-1.5, null],
                "relative_humidity_2m": [88, 90],
                "precipitation": [0.0, 0.2]
            }
        }"#;
        let response: HourlyResponse = serde_json::from_str(body).unwrap();
        let target = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let rows = response
            .into_series(&warsaw())
            .unwrap()
            .into_rows(&warsaw(), target, load_ts())
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp.to_string(), "2024-01-01 00:00:00");
        assert_eq!(rows[0].temperature_c, Some(-1.5));
        assert_eq!(rows[1].temperature_c, None);
        assert_eq!(rows[1].humidity_pct, Some(90.0));
        assert_eq!(rows[1].city, "Warsaw");
        assert!(rows.iter().all(|r| r.load_dts_utc == load_ts()));
    }

    #[test]
    fn test_missing_series_is_upstream_error() {
        let body = r#"{"hourly": {"time": ["2024-01-01T00:00"], "temperature_2m": [1.0], "precipitation": [0.0]}}"#;
        let response: HourlyResponse = serde_json::from_str(body).unwrap();
        let target = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = response
            .into_series(&warsaw())
            .unwrap()
            .into_rows(&warsaw(), target, load_ts())
            .unwrap_err();

        assert!(matches!(err, Error::UpstreamFetch(ref msg) if msg.contains("relative_humidity_2m")));
    }

    #[test]
    fn test_missing_hourly_object_is_upstream_error() {
        let response: HourlyResponse = serde_json::from_str(r#"{"error": true}"#).unwrap();
        assert!(matches!(
            response.into_series(&warsaw()),
            Err(Error::UpstreamFetch(_))
        ));
    }

    #[test]
    fn test_misaligned_series_rejected() {
        let series = HourlySeries {
            time: Some(vec!["2024-01-01T00:00".into(), "2024-01-01T01:00".into()]),
            temperature_2m: Some(vec![Some(1.0)]),
            relative_humidity_2m: Some(vec![Some(50.0), Some(51.0)]),
            precipitation: Some(vec![Some(0.0), Some(0.0)]),
        };
        let target = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = series.into_rows(&warsaw(), target, load_ts()).unwrap_err();
        assert!(err.to_string().contains("temperature_2m"));
    }

    #[test]
    fn test_timestamp_outside_target_date_rejected() {
        let series = HourlySeries {
            time: Some(vec!["2024-01-02T00:00".into()]),
            temperature_2m: Some(vec![Some(1.0)]),
            relative_humidity_2m: Some(vec![Some(50.0)]),
            precipitation: Some(vec![Some(0.0)]),
        };
        let target = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        assert!(matches!(
            series.into_rows(&warsaw(), target, load_ts()),
            Err(Error::UpstreamFetch(_))
        ));
    }
}
