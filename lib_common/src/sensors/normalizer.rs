//! # State Normalizer
//!
//! Folds one `DeviceEvent` into the current `Reading`. Pure: the clock is passed in and the
//! caller owns persistence and broadcast.

use chrono::{DateTime, SubsecRound, Utc};

use super::event::{DeviceEvent, HeartRatePayload};
use super::punch::{decode_hand, decode_punch};
use super::reading::Reading;

/// Current wall-clock time at the precision the event log stores.
pub fn stamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Returns the reading that results from applying `event` at time `now`.
///
/// Only the fields owned by the event's device class are overwritten. `deviceType` and
/// `lastUpdated` are refreshed for every event, unknown tags included.
pub fn apply(reading: &Reading, event: &DeviceEvent, now: DateTime<Utc>) -> Reading {
    let mut next = reading.clone();

    match event {
        DeviceEvent::AntHeartRate(p) => apply_heart_rate(&mut next, p, false),
        DeviceEvent::BleHeartRate(p) | DeviceEvent::BleBoxingHeartRate(p) => {
            apply_heart_rate(&mut next, p, true)
        }
        DeviceEvent::BleBoxing(p) => {
            next.boxing_hand = Some(decode_hand(p.hand));
            next.boxing_punch_type = Some(decode_punch(p.hand));
            next.boxing_power = p.power;
            next.boxing_speed = p.speed;
            next.battery = p.battery;
            next.device_id = p.device_id.clone();
        }
        DeviceEvent::BleCadence(p) => {
            next.cadence_wheel = p.wheel;
        }
        DeviceEvent::BleSos(p) => {
            next.sos_alert = true;
            next.device_id = p.device_id.clone();
        }
        DeviceEvent::Idle | DeviceEvent::Unknown(_) => {}
    }

    next.device_type = Some(event.tag().to_string());
    next.last_updated = Some(now);
    next
}

fn apply_heart_rate(next: &mut Reading, p: &HeartRatePayload, ble: bool) {
    next.heart_rate = p.heart_rate;
    next.battery = p.battery;
    next.device_id = p.device_id.clone();
    if ble {
        next.steps = p.steps;
        next.calories = p.calories;
        next.temperature = p.temperature;
        next.oxygen = p.oxygen;
    }
}
