//! # Device Events
//!
//! The upstream microservice publishes `{ "type": "...", "data": { ... } }` envelopes. The
//! `type` picks one of seven known shapes; anything else is kept as `Unknown` so the
//! normalizer can still record it as the last seen device type.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::error::SensorError;

pub const TAG_ANT_HEART_RATE: &str = "antHeartRate";
pub const TAG_BLE_HEART_RATE: &str = "bleHeartRate";
pub const TAG_BLE_BOXING_HEART_RATE: &str = "bleBoxingHeartRate";
pub const TAG_BLE_BOXING: &str = "bleBoxing";
pub const TAG_BLE_CADENCE: &str = "bleCadence";
pub const TAG_BLE_SOS: &str = "bleSOS";
pub const TAG_IDLE: &str = "idle";

/// Raw inbound message before the payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Heart rate monitors, ANT+ or BLE. The BLE variants also report the wellness fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRatePayload {
    #[serde(default, deserialize_with = "opaque_id")]
    pub device_id: Option<String>,
    pub heart_rate: Option<i32>,
    pub battery: Option<i32>,
    pub steps: Option<i32>,
    pub calories: Option<i32>,
    pub temperature: Option<f64>,
    pub oxygen: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxingPayload {
    #[serde(default, deserialize_with = "opaque_id")]
    pub device_id: Option<String>,
    /// Packed hand code: bit 0 hand, bits 1-2 punch type.
    pub hand: u32,
    pub power: Option<i32>,
    pub speed: Option<i32>,
    pub battery: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CadencePayload {
    pub wheel: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosPayload {
    #[serde(default, deserialize_with = "opaque_id")]
    pub device_id: Option<String>,
}

/// A decoded upstream event, one variant per known tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    AntHeartRate(HeartRatePayload),
    BleHeartRate(HeartRatePayload),
    BleBoxingHeartRate(HeartRatePayload),
    BleBoxing(BoxingPayload),
    BleCadence(CadencePayload),
    BleSos(SosPayload),
    Idle,
    /// Tolerated tag nobody knows about; carries the raw tag.
    Unknown(String),
}

impl DeviceEvent {
    /// Parses a message body straight into an event.
    pub fn from_json(text: &str) -> Result<Self, SensorError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(SensorError::Envelope)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, SensorError> {
        let Envelope { kind, data } = envelope;
        // Producers sometimes omit `data` on payload-free events
        let data = if data.is_null() { Value::Object(Map::new()) } else { data };

        let event = match kind.as_str() {
            TAG_ANT_HEART_RATE => DeviceEvent::AntHeartRate(payload(&kind, data)?),
            TAG_BLE_HEART_RATE => DeviceEvent::BleHeartRate(payload(&kind, data)?),
            TAG_BLE_BOXING_HEART_RATE => DeviceEvent::BleBoxingHeartRate(payload(&kind, data)?),
            TAG_BLE_BOXING => DeviceEvent::BleBoxing(payload(&kind, data)?),
            TAG_BLE_CADENCE => DeviceEvent::BleCadence(payload(&kind, data)?),
            TAG_BLE_SOS => DeviceEvent::BleSos(payload(&kind, data)?),
            TAG_IDLE => DeviceEvent::Idle,
            _ => DeviceEvent::Unknown(kind),
        };
        Ok(event)
    }

    /// The wire tag recorded as `deviceType`.
    pub fn tag(&self) -> &str {
        match self {
            DeviceEvent::AntHeartRate(_) => TAG_ANT_HEART_RATE,
            DeviceEvent::BleHeartRate(_) => TAG_BLE_HEART_RATE,
            DeviceEvent::BleBoxingHeartRate(_) => TAG_BLE_BOXING_HEART_RATE,
            DeviceEvent::BleBoxing(_) => TAG_BLE_BOXING,
            DeviceEvent::BleCadence(_) => TAG_BLE_CADENCE,
            DeviceEvent::BleSos(_) => TAG_BLE_SOS,
            DeviceEvent::Idle => TAG_IDLE,
            DeviceEvent::Unknown(tag) => tag,
        }
    }
}

fn payload<T: for<'de> Deserialize<'de>>(tag: &str, data: Value) -> Result<T, SensorError> {
    serde_json::from_value(data).map_err(|source| SensorError::Payload {
        tag: tag.to_string(),
        source,
    })
}

/// Device identifiers are opaque; some firmware sends them as numbers.
fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "device id must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_ble_heart_rate() {
        let event = DeviceEvent::from_json(
            r#"{"type":"bleHeartRate","data":{"deviceId":"HR9","heartRate":88,"battery":51,"steps":0,"oxygen":97.5}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            DeviceEvent::BleHeartRate(HeartRatePayload {
                device_id: Some("HR9".into()),
                heart_rate: Some(88),
                battery: Some(51),
                steps: Some(0),
                calories: None,
                temperature: None,
                oxygen: Some(97.5),
            })
        );
        assert_eq!(event.tag(), "bleHeartRate");
    }

    #[test]
    fn test_parses_boxing_and_numeric_device_id() {
        let event = DeviceEvent::from_json(
            r#"{"type":"bleBoxing","data":{"deviceId":4711,"hand":5,"power":300,"speed":12,"battery":90}}"#,
        )
        .unwrap();
        match event {
            DeviceEvent::BleBoxing(p) => {
                assert_eq!(p.device_id.as_deref(), Some("4711"));
                assert_eq!(p.hand, 5);
                assert_eq!(p.power, Some(300));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_boxing_without_hand_is_rejected() {
        let err = DeviceEvent::from_json(r#"{"type":"bleBoxing","data":{"power":1}}"#).unwrap_err();
        assert!(matches!(err, SensorError::Payload { ref tag, .. } if tag == "bleBoxing"));
    }

    #[test]
    fn test_idle_and_sos_without_data() {
        assert_eq!(DeviceEvent::from_json(r#"{"type":"idle"}"#).unwrap(), DeviceEvent::Idle);
        assert_eq!(
            DeviceEvent::from_json(r#"{"type":"bleSOS","data":null}"#).unwrap(),
            DeviceEvent::BleSos(SosPayload::default())
        );
    }

    #[test]
    fn test_unknown_tag_is_tolerated() {
        let event = DeviceEvent::from_json(r#"{"type":"bogus","data":{"x":1}}"#).unwrap();
        assert_eq!(event, DeviceEvent::Unknown("bogus".into()));
        assert_eq!(event.tag(), "bogus");
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(DeviceEvent::from_json("not json"), Err(SensorError::Envelope(_))));
        assert!(matches!(DeviceEvent::from_json(r#"{"data":{}}"#), Err(SensorError::Envelope(_))));
    }
}
