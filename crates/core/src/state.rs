//! View state for one panel session and the reducer that drives it.
//!
//! Every change goes through [`PanelController::handle`]; the controller is the
//! only writer, and its output effects are executed by whoever owns the broker
//! link.

use chrono::NaiveTime;
use tracing::debug;

use crate::commands::{TimeField, UiCommand};
use crate::log::ActivityLog;
use crate::payloads::{
    decode_schedule_snapshot, decode_state_snapshot, decode_status, default_schedule,
    encode_schedule_set, relay_command_payload, DecodeError, RelayStates, Schedule,
};
use crate::topics::{DeviceTopics, InboundTopic, CHANNELS};

#[derive(Debug, Clone, PartialEq)]
pub struct PanelState {
    pub connected: bool,
    pub device_online: bool,
    pub relays: RelayStates,
    pub schedule: Schedule,
    pub log: ActivityLog,
    /// Inbound payloads dropped because they failed to decode.
    pub decode_failures: u64,
}

impl PanelState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            connected: false,
            device_online: false,
            relays: [0; CHANNELS],
            schedule: default_schedule(),
            log: ActivityLog::with_capacity(log_capacity),
            decode_failures: 0,
        }
    }
}

impl Default for PanelState {
    fn default() -> Self {
        Self::new(crate::log::DEFAULT_LOG_CAPACITY)
    }
}

/// What a publish was for; only changes how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    RelayCommand,
    ScheduleSave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: String,
    pub kind: PublishKind,
}

/// Side effects requested by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Subscribe(Vec<String>),
    Publish(PublishRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Connecting { url: String, client_id: String },
    Connected,
    Subscribed,
    SubscribeFailed(String),
    Reconnecting,
    Closed,
    TransportError(String),
    Message { topic: String, payload: Vec<u8> },
    Published { topic: String, payload: String },
    PublishFailed { kind: PublishKind, message: String },
    Ui(UiCommand),
}

pub struct PanelController {
    topics: DeviceTopics,
    state: PanelState,
}

impl PanelController {
    pub fn new(topics: DeviceTopics, log_capacity: usize) -> Self {
        Self { topics, state: PanelState::new(log_capacity) }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    pub fn handle(&mut self, event: PanelEvent) -> Vec<Effect> {
        let state = &mut self.state;
        match event {
            PanelEvent::Connecting { url, client_id } => {
                state.log.push(format!("Connecting: {} clientId: {}", url, client_id));
            }
            PanelEvent::Connected => {
                state.connected = true;
                state.log.push("Connected");
                return vec![Effect::Subscribe(self.topics.subscriptions())];
            }
            PanelEvent::Subscribed => {
                state.log.push(format!("Subscribed: {}", self.topics.subscriptions().join(" ")));
            }
            PanelEvent::SubscribeFailed(msg) => {
                state.log.push(format!("Subscribe error: {}", msg));
            }
            PanelEvent::Reconnecting => state.log.push("Reconnecting…"),
            PanelEvent::Closed => {
                state.connected = false;
                state.log.push("Closed");
            }
            PanelEvent::TransportError(msg) => state.log.push(format!("Error: {}", msg)),
            PanelEvent::Message { topic, payload } => self.on_message(&topic, &payload),
            PanelEvent::Published { topic, payload } => {
                state.log.push(format!("TX {} {}", topic, payload));
            }
            PanelEvent::PublishFailed { kind, message } => {
                let prefix = match kind {
                    PublishKind::RelayCommand => "Publish error",
                    PublishKind::ScheduleSave => "Save error",
                };
                state.log.push(format!("{}: {}", prefix, message));
            }
            PanelEvent::Ui(cmd) => return self.on_command(cmd),
        }
        Vec::new()
    }

    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self.state
            .log
            .push(format!("RX {} {}", topic, String::from_utf8_lossy(payload)));

        let result: Result<(), DecodeError> = match self.topics.classify(topic) {
            Some(InboundTopic::Status) => {
                self.state.device_online = decode_status(payload);
                Ok(())
            }
            Some(InboundTopic::State) => decode_state_snapshot(payload).map(|snap| {
                if let Some(relays) = snap.relays {
                    self.state.relays = relays;
                }
                if let Some(schedule) = snap.schedule {
                    self.state.schedule = schedule;
                }
            }),
            Some(InboundTopic::Schedule) => {
                decode_schedule_snapshot(payload).map(|schedule| self.state.schedule = schedule)
            }
            None => Ok(()),
        };

        // Decode failures stay out of the activity log.
        if let Err(err) = result {
            self.state.decode_failures += 1;
            debug!(topic, %err, "dropping undecodable payload");
        }
    }

    fn on_command(&mut self, cmd: UiCommand) -> Vec<Effect> {
        match cmd {
            // The visible state only changes once the device echoes it back.
            UiCommand::Toggle { channel, on } if channel < CHANNELS => {
                vec![Effect::Publish(PublishRequest {
                    topic: self.topics.cmd(channel),
                    payload: relay_command_payload(on).to_string(),
                    kind: PublishKind::RelayCommand,
                })]
            }
            UiCommand::SetTime { channel, field, value } if channel < CHANNELS => {
                match NaiveTime::parse_from_str(&value, "%H:%M") {
                    Ok(time) => {
                        let entry = &mut self.state.schedule[channel];
                        let slot = match field {
                            TimeField::On => &mut entry.on_time,
                            TimeField::Off => &mut entry.off_time,
                        };
                        *slot = time.format("%H:%M").to_string();
                    }
                    Err(_) => self.state.log.push(format!("Rejected time: {}", value)),
                }
                Vec::new()
            }
            UiCommand::SetTimerEnabled { channel, enabled } if channel < CHANNELS => {
                self.state.schedule[channel].enabled = enabled;
                Vec::new()
            }
            // Saving any channel sends the whole table, unsaved edits included.
            UiCommand::Save { channel } if channel < CHANNELS => {
                match encode_schedule_set(&self.state.schedule) {
                    Ok(payload) => vec![Effect::Publish(PublishRequest {
                        topic: self.topics.sched_set.clone(),
                        payload,
                        kind: PublishKind::ScheduleSave,
                    })],
                    Err(e) => {
                        self.state.log.push(format!("Save error: {}", e));
                        Vec::new()
                    }
                }
            }
            other => {
                debug!(?other, "ignoring command for unknown channel");
                Vec::new()
            }
        }
    }
}
