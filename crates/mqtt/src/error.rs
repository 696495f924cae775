use rumqttc::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("invalid broker url {0}")]
    InvalidBrokerUrl(String),
    #[error("mqtt client request failed: {0}")]
    Client(#[from] ClientError),
}
