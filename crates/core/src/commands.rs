use serde::{Deserialize, Serialize};

/// Which end of a channel's daily timer is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeField {
    On,
    Off,
}

// Commands sent by the panel page over its WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UiCommand {
    Toggle { channel: usize, on: bool },
    SetTime { channel: usize, field: TimeField, value: String }, // "HH:MM"
    SetTimerEnabled { channel: usize, enabled: bool },
    Save { channel: usize },
}

impl UiCommand {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
