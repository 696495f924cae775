use std::sync::Arc;

use prometheus::{IntCounter, IntGauge};

pub struct Metrics {
    pub mqtt_connected: IntGauge,
    pub mqtt_rx_total: IntCounter,
    pub mqtt_tx_total: IntCounter,
    pub ws_clients: IntGauge,
    pub decode_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Arc<Self>> {
        let mqtt_connected = IntGauge::new("relaypanel_mqtt_connected", "Panel sessions with a live broker link")?;
        let mqtt_rx_total = IntCounter::new("relaypanel_mqtt_messages_received_total", "Total MQTT messages received")?;
        let mqtt_tx_total = IntCounter::new("relaypanel_mqtt_messages_published_total", "Total MQTT messages published")?;
        let ws_clients = IntGauge::new("relaypanel_ws_clients", "Number of connected panel WebSocket clients")?;
        let decode_failures_total = IntCounter::new(
            "relaypanel_decode_failures_total",
            "Inbound device payloads dropped because they failed to decode",
        )?;

        // A second instance (tests) keeps working counters; only the first is exported.
        let registry = prometheus::default_registry();
        let _ = registry.register(Box::new(mqtt_connected.clone()));
        let _ = registry.register(Box::new(mqtt_rx_total.clone()));
        let _ = registry.register(Box::new(mqtt_tx_total.clone()));
        let _ = registry.register(Box::new(ws_clients.clone()));
        let _ = registry.register(Box::new(decode_failures_total.clone()));

        Ok(Arc::new(Self { mqtt_connected, mqtt_rx_total, mqtt_tx_total, ws_clients, decode_failures_total }))
    }
}
