//! # Reading
//!
//! The single best-known state of the whole device fleet. Every device class writes into
//! its own group of fields; values from other classes are carried along untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::punch::{Hand, PunchType};

/// Latest observed values, serialized with the camelCase names dashboards consume.
///
/// Absent values serialize as `null`. `sos_alert` starts `false` and the event path only
/// ever raises it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Identifier of the device that last reported an identifier.
    pub device_id: Option<String>,
    /// Wire tag of the last applied event (`bleBoxing`, `idle`, ...).
    pub device_type: Option<String>,

    pub heart_rate: Option<i32>,

    pub boxing_hand: Option<Hand>,
    pub boxing_punch_type: Option<PunchType>,
    pub boxing_power: Option<i32>,
    pub boxing_speed: Option<i32>,

    pub cadence_wheel: Option<i32>,

    pub sos_alert: bool,

    pub battery: Option<i32>,
    pub steps: Option<i32>,
    pub calories: Option<i32>,
    pub temperature: Option<f64>,
    pub oxygen: Option<f64>,

    /// Wall-clock time of the last mutation, microsecond precision.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Reading {
    /// The empty state the process starts with.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_reading_serializes_nulls() {
        let value = serde_json::to_value(Reading::new()).unwrap();
        assert_eq!(
            value,
            json!({
                "deviceId": null,
                "deviceType": null,
                "heartRate": null,
                "boxingHand": null,
                "boxingPunchType": null,
                "boxingPower": null,
                "boxingSpeed": null,
                "cadenceWheel": null,
                "sosAlert": false,
                "battery": null,
                "steps": null,
                "calories": null,
                "temperature": null,
                "oxygen": null,
                "lastUpdated": null
            })
        );
    }

    #[test]
    fn test_boxing_labels_serialize_as_strings() {
        let reading = Reading {
            boxing_hand: Some(Hand::Right),
            boxing_punch_type: Some(PunchType::Upcut),
            ..Reading::new()
        };
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["boxingHand"], "Right");
        assert_eq!(value["boxingPunchType"], "Upcut");
    }

    #[test]
    fn test_last_updated_is_iso8601() {
        let ts = DateTime::parse_from_rfc3339("2025-03-01T10:15:30.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let reading = Reading {
            last_updated: Some(ts),
            ..Reading::new()
        };
        let text = serde_json::to_string(&reading).unwrap();
        assert!(text.contains("\"lastUpdated\":\"2025-03-01T10:15:30.123456Z\""), "{}", text);
        let back: Reading = serde_json::from_str(&text).unwrap();
        assert_eq!(back, reading);
    }
}
