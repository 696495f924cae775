use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS, SubscribeFilter,
    SubscribeReasonCode, Transport,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{BrokerTransport, MqttConfig};
use crate::error::MqttError;

#[derive(Debug, Clone, PartialEq)]
pub enum MqttEvent {
    Connected,
    Subscribed,
    SubscribeFailed(String),
    Publish { topic: String, payload: Vec<u8> },
    Reconnecting,
    Closed,
    Error(String),
}

/// The broker operations a panel session needs. Connection lifecycle and
/// inbound messages arrive separately as [`MqttEvent`]s.
pub trait MessagingClient: Send + Sync {
    /// A fresh receiver; it only sees events sent after this call.
    fn events(&self) -> broadcast::Receiver<MqttEvent>;
    fn subscribe_many(&self, topics: &[String]) -> Result<(), MqttError>;
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError>;
    /// Immediate, best-effort teardown. Never fails.
    fn disconnect(&self);
}

#[derive(Clone)]
pub struct MqttService {
    client: AsyncClient,
    ready: Arc<AtomicBool>,
    events_tx: broadcast::Sender<MqttEvent>,
    broker_url: String,
    client_id: String,
    loop_handle: Arc<JoinHandle<()>>,
}

impl MqttService {
    /// Starts the connection in the background. The returned receiver is
    /// subscribed before the event loop runs, so it sees every event.
    pub fn connect(config: MqttConfig) -> Result<(Self, broadcast::Receiver<MqttEvent>), MqttError> {
        let (client, eventloop) = build_client(&config)?;
        let ready = Arc::new(AtomicBool::new(false));
        let (tx, rx) = broadcast::channel(256);
        let ready_clone = ready.clone();
        let tx_clone = tx.clone();
        let broker_url = config.broker_url.clone();
        let client_id = config.client_id.clone();

        let loop_handle = tokio::spawn(async move {
            run_eventloop(eventloop, ready_clone, tx_clone, config).await;
        });

        let service = Self {
            client,
            ready,
            events_tx: tx,
            broker_url,
            client_id,
            loop_handle: Arc::new(loop_handle),
        };
        Ok((service, rx))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl MessagingClient for MqttService {
    fn events(&self) -> broadcast::Receiver<MqttEvent> {
        self.events_tx.subscribe()
    }

    fn subscribe_many(&self, topics: &[String]) -> Result<(), MqttError> {
        let filters = topics
            .iter()
            .map(|t| SubscribeFilter::new(t.clone(), QoS::AtMostOnce))
            .collect::<Vec<_>>();
        self.client.try_subscribe_many(filters)?;
        Ok(())
    }

    // try_* variants queue without waiting, so a stalled link never blocks the caller.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.client.try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())?;
        Ok(())
    }

    fn disconnect(&self) {
        self.ready.store(false, Ordering::Relaxed);
        if let Err(err) = self.client.try_disconnect() {
            debug!(?err, client_id = %self.client_id, "MQTT disconnect request not queued");
        }
        self.loop_handle.abort();
    }
}

fn build_client(config: &MqttConfig) -> Result<(AsyncClient, EventLoop), MqttError> {
    let endpoint = config.broker_endpoint()?;
    let mut opts = MqttOptions::new(&config.client_id, &endpoint.address, endpoint.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs as u64));
    opts.set_clean_session(config.clean_session);
    match endpoint.transport {
        BrokerTransport::Tcp => {}
        BrokerTransport::Ws => {
            opts.set_transport(Transport::Ws);
        }
        BrokerTransport::Wss => {
            opts.set_transport(Transport::wss_with_default_config());
        }
    }
    // Reasonable channel capacity for requests
    opts.set_request_channel_capacity(64);
    let (client, mut eventloop) = AsyncClient::new(opts, 64);

    // rumqttc bounds TCP/WS setup plus CONNACK with this, in whole seconds.
    let mut network = eventloop.network_options();
    network.set_connection_timeout(connect_timeout_secs(config.connect_timeout));
    eventloop.set_network_options(network);
    Ok((client, eventloop))
}

fn connect_timeout_secs(timeout: Duration) -> u64 {
    let millis = timeout.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

async fn run_eventloop(
    mut eventloop: EventLoop,
    ready: Arc<AtomicBool>,
    events_tx: broadcast::Sender<MqttEvent>,
    config: MqttConfig,
) {
    loop {
        let failure = match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!(client_id = %config.client_id, "MQTT connected");
                ready.store(true, Ordering::Relaxed);
                let _ = events_tx.send(MqttEvent::Connected);
                continue;
            }
            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                let rejected = ack
                    .return_codes
                    .iter()
                    .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                    .count();
                let evt = if rejected == 0 {
                    MqttEvent::Subscribed
                } else {
                    warn!(rejected, "MQTT broker rejected subscriptions");
                    MqttEvent::SubscribeFailed(format!("broker rejected {} subscription(s)", rejected))
                };
                let _ = events_tx.send(evt);
                continue;
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                let topic = p.topic.to_string();
                let payload = p.payload.to_vec();
                let _ = events_tx.send(MqttEvent::Publish { topic, payload });
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                warn!("MQTT disconnect requested");
                ready.store(false, Ordering::Relaxed);
                let _ = events_tx.send(MqttEvent::Closed);
                continue;
            }
            Ok(other) => {
                debug!(?other, "MQTT event");
                continue;
            }
            Err(e) => e.to_string(),
        };

        warn!(error = %failure, "MQTT connection lost; will attempt reconnect");
        ready.store(false, Ordering::Relaxed);
        let _ = events_tx.send(MqttEvent::Error(failure));
        let _ = events_tx.send(MqttEvent::Closed);

        // Fixed retry interval, retried for as long as the session lives.
        sleep(config.reconnect_period).await;
        let _ = events_tx.send(MqttEvent::Reconnecting);
    }
}
