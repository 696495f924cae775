use std::env;
use std::time::Duration;

use url::Url;

use crate::error::MqttError;

pub const DEFAULT_BROKER_URL: &str = "wss://broker.hivemq.com:8884/mqtt";

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_url: String,
    pub client_id: String,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub connect_timeout: Duration,
    pub reconnect_period: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            client_id: random_client_id(),
            keep_alive_secs: 30,
            clean_session: true,
            connect_timeout: Duration::from_millis(8000),
            reconnect_period: Duration::from_millis(2000),
        }
    }
}

impl MqttConfig {
    pub fn from_env() -> Self {
        let mut cfg = MqttConfig::default();

        if let Ok(v) = env::var("MQTT_BROKER_URL") {
            if !v.is_empty() {
                cfg.broker_url = v;
            }
        }
        if let Ok(v) = env::var("MQTT_KEEP_ALIVE_SECS") {
            if let Ok(s) = v.parse::<u16>() {
                cfg.keep_alive_secs = s;
            }
        }
        if let Ok(v) = env::var("MQTT_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.connect_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = env::var("MQTT_RECONNECT_PERIOD_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.reconnect_period = Duration::from_millis(ms);
            }
        }

        cfg
    }

    /// Same settings under a fresh client id, so concurrent panels never
    /// kick each other off the broker.
    pub fn for_session(&self) -> Self {
        Self { client_id: random_client_id(), ..self.clone() }
    }

    pub fn broker_endpoint(&self) -> Result<BrokerEndpoint, MqttError> {
        BrokerEndpoint::parse(&self.broker_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerTransport {
    Tcp,
    Ws,
    Wss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub transport: BrokerTransport,
    /// Host name for TCP; the full URL for WebSocket transports.
    pub address: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn parse(raw: &str) -> Result<Self, MqttError> {
        let invalid = |reason: &str| MqttError::InvalidBrokerUrl(format!("{}: {}", raw, reason));
        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?.to_string();

        let (transport, default_port) = match url.scheme() {
            "ws" => (BrokerTransport::Ws, 80),
            "wss" => (BrokerTransport::Wss, 443),
            "mqtt" | "tcp" => (BrokerTransport::Tcp, 1883),
            other => return Err(invalid(&format!("unsupported scheme {}", other))),
        };
        let port = url.port().unwrap_or(default_port);

        let address = match transport {
            BrokerTransport::Tcp => host,
            BrokerTransport::Ws | BrokerTransport::Wss => raw.to_string(),
        };
        Ok(Self { transport, address, port })
    }
}

fn random_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("web-{}", &id[..16])
}
