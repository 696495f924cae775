pub mod config;
pub mod client;
pub mod error;

pub use config::{BrokerEndpoint, BrokerTransport, MqttConfig};
pub use client::{MessagingClient, MqttEvent, MqttService};
pub use error::MqttError;
