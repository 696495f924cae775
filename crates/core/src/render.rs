use serde::Serialize;

use crate::state::PanelState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayCard {
    pub channel: usize,
    pub title: String,
    pub on: bool,
    pub label: &'static str,
    pub on_time: String,
    pub off_time: String,
    pub timer_enabled: bool,
}

/// Everything the panel page needs to paint itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub banner: String,
    pub connected: bool,
    pub device_online: bool,
    pub relays: Vec<RelayCard>,
    pub log: Vec<String>,
}

pub fn render(state: &PanelState) -> PanelView {
    let link = if state.connected { "Connected to broker" } else { "Connecting…" };
    let device = if state.device_online { "online" } else { "offline" };

    let relays = state
        .relays
        .iter()
        .zip(state.schedule.iter())
        .enumerate()
        .map(|(i, (&relay, entry))| RelayCard {
            channel: i,
            title: format!("Relay {}", i + 1),
            on: relay != 0,
            label: if relay != 0 { "ON" } else { "OFF" },
            on_time: entry.on_time.clone(),
            off_time: entry.off_time.clone(),
            timer_enabled: entry.enabled,
        })
        .collect();

    PanelView {
        banner: format!("{} | Device {}", link, device),
        connected: state.connected,
        device_online: state.device_online,
        relays,
        log: state.log.lines().map(str::to_string).collect(),
    }
}
