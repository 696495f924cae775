// Topic layout helpers and constants matching the relay firmware

pub const ROOT: &str = "iot/relay";
pub const DEFAULT_DEVICE_ID: &str = "esp32-relay-kr-01";

/// Number of switchable channels on the relay board.
pub const CHANNELS: usize = 4;

pub fn base_topic(device_id: &str) -> String {
    format!("{}/{}", ROOT, device_id)
}

// Device-scoped topics
pub fn status_topic(device_id: &str) -> String { format!("{}/status", base_topic(device_id)) }
pub fn state_topic(device_id: &str) -> String { format!("{}/state", base_topic(device_id)) }
pub fn sched_topic(device_id: &str) -> String { format!("{}/sched", base_topic(device_id)) }
pub fn sched_set_topic(device_id: &str) -> String { format!("{}/sched/set", base_topic(device_id)) }
pub fn cmd_topic(device_id: &str, channel: usize) -> String {
    format!("{}/cmd/{}", base_topic(device_id), channel)
}

/// Inbound topics the panel reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    Status,
    State,
    Schedule,
}

/// Precomputed topic names for one device, so dispatch is a plain string compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub device_id: String,
    pub status: String,
    pub state: String,
    pub sched: String,
    pub sched_set: String,
}

impl DeviceTopics {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            status: status_topic(device_id),
            state: state_topic(device_id),
            sched: sched_topic(device_id),
            sched_set: sched_set_topic(device_id),
        }
    }

    pub fn cmd(&self, channel: usize) -> String {
        cmd_topic(&self.device_id, channel)
    }

    /// The three topics subscribed on every successful connect.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![self.status.clone(), self.state.clone(), self.sched.clone()]
    }

    /// Exact-match dispatch; anything else (including `sched/set`) is `None`.
    pub fn classify(&self, topic: &str) -> Option<InboundTopic> {
        if topic == self.status {
            Some(InboundTopic::Status)
        } else if topic == self.state {
            Some(InboundTopic::State)
        } else if topic == self.sched {
            Some(InboundTopic::Schedule)
        } else {
            None
        }
    }
}

impl Default for DeviceTopics {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_device_scoped_topics() {
        let t = DeviceTopics::new("dev-1");
        assert_eq!(t.status, "iot/relay/dev-1/status");
        assert_eq!(t.state, "iot/relay/dev-1/state");
        assert_eq!(t.sched, "iot/relay/dev-1/sched");
        assert_eq!(t.sched_set, "iot/relay/dev-1/sched/set");
        assert_eq!(t.cmd(2), "iot/relay/dev-1/cmd/2");
        assert_eq!(t.subscriptions().len(), 3);
    }

    #[test]
    fn classifies_only_exact_matches() {
        let t = DeviceTopics::default();
        assert_eq!(t.classify("iot/relay/esp32-relay-kr-01/status"), Some(InboundTopic::Status));
        assert_eq!(t.classify("iot/relay/esp32-relay-kr-01/sched"), Some(InboundTopic::Schedule));
        assert_eq!(t.classify("iot/relay/esp32-relay-kr-01/sched/set"), None);
        assert_eq!(t.classify("iot/relay/other/state"), None);
        assert_eq!(t.classify("iot/relay/esp32-relay-kr-01/state/"), None);
    }
}
