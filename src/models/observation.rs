use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One stored cloud-coverage reading for a location at a forecast timestamp.
///
/// `values` carries the coverage as a formatted percentage ("NN.NN%") because
/// that is the shape both the database and the push endpoint expect. At most
/// one observation exists per (city, timestamp); later writes supersede.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageObservation {
    pub city: String,
    pub values: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: NaiveDateTime,
}

impl CoverageObservation {
    pub fn new(
        city: impl Into<String>,
        timestamp: NaiveDateTime,
        coverage_percent: f64,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            values: format!("{coverage_percent:.2}%"),
            kind: kind.into(),
            timestamp,
        }
    }

    pub fn timestamp_str(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn serialize_timestamp<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    fn sample_ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(10, 20, 0)
            .unwrap()
    }

    #[test]
    fn values_are_two_decimal_percent() {
        let obs = CoverageObservation::new("Ramanathapuram", sample_ts(), 42.12345, "adhani_solar");
        assert_eq!(obs.values, "42.12%");
    }

    #[test]
    fn serializes_wire_shape() {
        let obs = CoverageObservation::new("Ramanathapuram", sample_ts(), 7.5, "adhani_solar");
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["timestamp"], "2024-06-15 10:20:00");
        assert_eq!(json["city"], "Ramanathapuram");
        assert_eq!(json["values"], "7.50%");
        assert_eq!(json["type"], "adhani_solar");
    }

    #[test]
    fn round_trips_through_json() {
        let obs = CoverageObservation::new("Ramanathapuram", sample_ts(), 99.999, "adhani_solar");
        let json = serde_json::to_string(&obs).unwrap();
        let back: CoverageObservation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obs);
    }
}
