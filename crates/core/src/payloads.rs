//! Wire payloads exchanged with the relay firmware.
//!
//! Inbound documents are decoded leniently (missing fields fall back to
//! defaults) but atomically: a message either decodes completely or is
//! rejected as a whole, so callers never apply half of a document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::topics::CHANNELS;

pub const DEFAULT_ON_TIME: &str = "07:00";
pub const DEFAULT_OFF_TIME: &str = "22:30";

/// Per-channel relay output, 0 or 1.
pub type RelayStates = [u8; CHANNELS];

/// Per-channel daily timer, index-aligned with the relay channels.
pub type Schedule = [ScheduleEntry; CHANNELS];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(rename = "en")]
    pub enabled: bool,
    #[serde(rename = "on")]
    pub on_time: String,
    #[serde(rename = "off")]
    pub off_time: String,
}

impl Default for ScheduleEntry {
    fn default() -> Self {
        Self {
            enabled: false,
            on_time: DEFAULT_ON_TIME.to_string(),
            off_time: DEFAULT_OFF_TIME.to_string(),
        }
    }
}

pub fn default_schedule() -> Schedule {
    std::array::from_fn(|_| ScheduleEntry::default())
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("unexpected shape: {0}")]
    Shape(&'static str),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e.to_string())
    }
}

/// Fields of a `/state` document that were present and well-formed.
/// `None` means "leave the current value alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub relays: Option<RelayStates>,
    pub schedule: Option<Schedule>,
}

/// Presence is online only for the exact literal `online`.
pub fn decode_status(payload: &[u8]) -> bool {
    payload == b"online"
}

pub fn decode_state_snapshot(payload: &[u8]) -> Result<StateSnapshot, DecodeError> {
    let doc = parse_object(payload)?;
    let mut snapshot = StateSnapshot::default();

    // `states` tolerates trailing elements; only the first four channels exist.
    if let Some(Value::Array(states)) = doc.get("states") {
        if states.len() >= CHANNELS {
            let mut relays = [0u8; CHANNELS];
            for (slot, value) in relays.iter_mut().zip(states.iter()) {
                *slot = coerce_relay(value);
            }
            snapshot.relays = Some(relays);
        }
    }

    // A wrong-length `timer` is skipped without touching the `states` part.
    if let Some(Value::Array(timer)) = doc.get("timer") {
        if timer.len() == CHANNELS {
            snapshot.schedule = decode_entries(timer)?.try_into().ok();
        }
    }

    Ok(snapshot)
}

pub fn decode_schedule_snapshot(payload: &[u8]) -> Result<Schedule, DecodeError> {
    let doc = parse_object(payload)?;
    match doc.get("relays") {
        Some(Value::Array(relays)) if relays.len() == CHANNELS => {
            let entries = decode_entries(relays)?;
            entries
                .try_into()
                .map_err(|_| DecodeError::Shape("relays must have 4 entries"))
        }
        Some(Value::Array(_)) => Err(DecodeError::Shape("relays must have 4 entries")),
        _ => Err(DecodeError::Shape("missing relays array")),
    }
}

/// Relay command body: literal ASCII, not JSON.
pub fn relay_command_payload(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

#[derive(Serialize)]
struct ScheduleSetPayload<'a> {
    relays: &'a [ScheduleEntry],
}

/// The `/sched/set` body always carries all four entries.
pub fn encode_schedule_set(schedule: &Schedule) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ScheduleSetPayload { relays: schedule })
}

fn parse_object(payload: &[u8]) -> Result<serde_json::Map<String, Value>, DecodeError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn decode_entries(values: &[Value]) -> Result<Vec<ScheduleEntry>, DecodeError> {
    values.iter().map(decode_entry).collect()
}

// Scalars carry no fields and decode to the default entry; only null is rejected.
fn decode_entry(value: &Value) -> Result<ScheduleEntry, DecodeError> {
    let obj = match value {
        Value::Object(obj) => obj,
        Value::Null => return Err(DecodeError::Shape("schedule entry is null")),
        _ => return Ok(ScheduleEntry::default()),
    };
    Ok(ScheduleEntry {
        enabled: obj.get("en").map(truthy).unwrap_or(false),
        on_time: non_empty_str(obj.get("on")).unwrap_or(DEFAULT_ON_TIME).to_string(),
        off_time: non_empty_str(obj.get("off")).unwrap_or(DEFAULT_OFF_TIME).to_string(),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// Numeric coercion followed by truthiness: "1" and 1 are on, "abc" and null are off.
fn coerce_relay(value: &Value) -> u8 {
    let on = match value {
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s.parse::<f64>().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false)
        }
        _ => false,
    };
    u8::from(on)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_online_only_for_exact_literal() {
        assert!(decode_status(b"online"));
        for other in ["offline", "", "ONLINE", "online ", "\"online\""] {
            assert!(!decode_status(other.as_bytes()), "{other:?}");
        }
    }

    #[test]
    fn state_without_timer_leaves_schedule_untouched() {
        let snap = decode_state_snapshot(br#"{"states":[1,0,1,0]}"#).unwrap();
        assert_eq!(snap.relays, Some([1, 0, 1, 0]));
        assert_eq!(snap.schedule, None);
    }

    #[test]
    fn state_coerces_mixed_values() {
        let snap = decode_state_snapshot(br#"{"states":["1",true,2,"x",0]}"#).unwrap();
        assert_eq!(snap.relays, Some([1, 1, 1, 0]));
    }

    #[test]
    fn short_states_array_is_ignored() {
        let snap = decode_state_snapshot(br#"{"states":[1,1]}"#).unwrap();
        assert_eq!(snap.relays, None);
    }

    #[test]
    fn timer_entries_get_defaults() {
        let snap = decode_state_snapshot(
            br#"{"states":[0,0,0,0],"timer":[{"en":1,"on":"06:15"},{},{"off":""},{"en":false,"on":"08:00","off":"20:00"}]}"#,
        )
        .unwrap();
        let sched = snap.schedule.unwrap();
        assert!(sched[0].enabled);
        assert_eq!(sched[0].on_time, "06:15");
        assert_eq!(sched[0].off_time, DEFAULT_OFF_TIME);
        assert_eq!(sched[1], ScheduleEntry::default());
        assert_eq!(sched[2].off_time, DEFAULT_OFF_TIME);
        assert_eq!(sched[3].off_time, "20:00");
    }

    #[test]
    fn timer_with_wrong_length_is_skipped() {
        let snap = decode_state_snapshot(br#"{"states":[1,1,1,1],"timer":[{},{},{}]}"#).unwrap();
        assert_eq!(snap.relays, Some([1, 1, 1, 1]));
        assert_eq!(snap.schedule, None);
    }

    #[test]
    fn null_timer_entry_rejects_whole_message() {
        let err = decode_state_snapshot(br#"{"states":[1,1,1,1],"timer":[{},null,{},{}]}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
    }

    #[test]
    fn short_timer_with_null_still_applies_states() {
        let snap = decode_state_snapshot(br#"{"states":[1,0,1,0],"timer":[null]}"#).unwrap();
        assert_eq!(snap.relays, Some([1, 0, 1, 0]));
        assert_eq!(snap.schedule, None);
    }

    #[test]
    fn scalar_timer_entries_decode_to_defaults() {
        let snap = decode_state_snapshot(br#"{"states":[1,0,1,0],"timer":[1,2,3,4]}"#).unwrap();
        assert_eq!(snap.relays, Some([1, 0, 1, 0]));
        assert_eq!(snap.schedule, Some(default_schedule()));
        assert_eq!(
            decode_schedule_snapshot(br#"{"relays":["x",true,0,{"en":1}]}"#).unwrap()[0],
            ScheduleEntry::default()
        );
    }

    #[test]
    fn schedule_requires_exactly_four_entries() {
        assert!(decode_schedule_snapshot(br#"{"relays":[{},{},{}]}"#).is_err());
        assert!(decode_schedule_snapshot(br#"{"relays":[{},{},{},{},{}]}"#).is_err());
        assert!(decode_schedule_snapshot(br#"{"other":[]}"#).is_err());
        assert_eq!(decode_schedule_snapshot(br#"{"relays":[{},{},{},{}]}"#).unwrap(), default_schedule());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(decode_schedule_snapshot(b"{not json"), Err(DecodeError::Json(_))));
        assert_eq!(decode_state_snapshot(b"null"), Err(DecodeError::NotAnObject));
    }

    #[test]
    fn schedule_set_uses_wire_field_names() {
        let mut sched = default_schedule();
        sched[0].on_time = "05:45".to_string();
        let body = encode_schedule_set(&sched).unwrap();
        assert!(body.starts_with(r#"{"relays":[{"en":false,"on":"05:45","off":"22:30"},"#));
        let reparsed = decode_schedule_snapshot(body.as_bytes()).unwrap();
        assert_eq!(reparsed, sched);
    }

    #[test]
    fn relay_command_is_plain_ascii() {
        assert_eq!(relay_command_payload(true), "1");
        assert_eq!(relay_command_payload(false), "0");
    }
}
