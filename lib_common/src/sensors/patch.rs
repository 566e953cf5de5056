//! # Reading Patch
//!
//! Partial reading accepted by the manual injection endpoint. Each known field is tri-state:
//! omitted (keep), `null` (clear) or a value (overwrite). Keys that are not reading fields
//! are collected in `ignored` instead of leaking into the record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::punch::{Hand, PunchType};
use super::reading::Reading;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPatch {
    #[serde(default, deserialize_with = "present")]
    pub device_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub device_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub heart_rate: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub boxing_hand: Option<Option<Hand>>,
    #[serde(default, deserialize_with = "present")]
    pub boxing_punch_type: Option<Option<PunchType>>,
    #[serde(default, deserialize_with = "present")]
    pub boxing_power: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub boxing_speed: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub cadence_wheel: Option<Option<i32>>,
    pub sos_alert: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub battery: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub steps: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub calories: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub oxygen: Option<Option<f64>>,

    /// Everything else the caller sent, `lastUpdated` included.
    #[serde(flatten)]
    pub ignored: BTreeMap<String, Value>,
}

/// Distinguishes an explicit `null` from a missing key.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl ReadingPatch {
    /// Shallow merge over `reading`, then stamp `lastUpdated` with `now`.
    pub fn merge_into(self, reading: &Reading, now: DateTime<Utc>) -> Reading {
        let mut next = reading.clone();
        merge(&mut next.device_id, self.device_id);
        merge(&mut next.device_type, self.device_type);
        merge(&mut next.heart_rate, self.heart_rate);
        merge(&mut next.boxing_hand, self.boxing_hand);
        merge(&mut next.boxing_punch_type, self.boxing_punch_type);
        merge(&mut next.boxing_power, self.boxing_power);
        merge(&mut next.boxing_speed, self.boxing_speed);
        merge(&mut next.cadence_wheel, self.cadence_wheel);
        merge(&mut next.sos_alert, self.sos_alert);
        merge(&mut next.battery, self.battery);
        merge(&mut next.steps, self.steps);
        merge(&mut next.calories, self.calories);
        merge(&mut next.temperature, self.temperature);
        merge(&mut next.oxygen, self.oxygen);
        next.last_updated = Some(now);
        next
    }

    pub fn ignored_keys(&self) -> Vec<&str> {
        self.ignored.keys().map(String::as_str).collect()
    }
}
