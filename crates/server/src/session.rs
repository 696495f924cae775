//! One panel session per browser tab.
//!
//! The session owns its controller and is the only task that touches it:
//! broker events and browser commands are funneled through a single
//! `select!` loop, and each resulting state is pushed to the page as a
//! rendered view.

use std::collections::VecDeque;
use std::sync::Arc;

use relaypanel_core::{render, Effect, PanelController, PanelEvent, PanelView, UiCommand};
use relaypanel_mqtt::{MessagingClient, MqttEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::metrics::Metrics;

pub struct PanelSession {
    controller: PanelController,
    metrics: Arc<Metrics>,
}

impl PanelSession {
    pub fn new(controller: PanelController, metrics: Arc<Metrics>) -> Self {
        Self { controller, metrics }
    }

    pub fn view(&self) -> PanelView {
        render(self.controller.state())
    }

    /// Runs until the page goes away (command channel closed or view
    /// receiver dropped) or the broker link shuts down, then tears the link down.
    pub async fn run<C: MessagingClient>(
        mut self,
        link: &C,
        mut events: broadcast::Receiver<MqttEvent>,
        mut commands: mpsc::Receiver<UiCommand>,
        views: watch::Sender<PanelView>,
    ) {
        loop {
            tokio::select! {
                evt = events.recv() => match evt {
                    Ok(evt) => self.dispatch(link, panel_event(evt)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "panel session lagged behind MQTT events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.dispatch(link, PanelEvent::Ui(cmd)),
                    None => break,
                },
            }

            if views.send(self.view()).is_err() {
                debug!("panel view receiver dropped");
                break;
            }
        }

        if self.controller.state().connected {
            self.metrics.mqtt_connected.dec();
        }
        link.disconnect();
    }

    /// Feeds one event through the reducer and executes the effects it asks
    /// for. Effect outcomes are fed back in as events of their own.
    pub fn dispatch<C: MessagingClient>(&mut self, link: &C, event: PanelEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            if matches!(event, PanelEvent::Message { .. }) {
                self.metrics.mqtt_rx_total.inc();
            }
            let was_connected = self.controller.state().connected;
            let failures_before = self.controller.state().decode_failures;

            let effects = self.controller.handle(event);

            let state = self.controller.state();
            match (was_connected, state.connected) {
                (false, true) => self.metrics.mqtt_connected.inc(),
                (true, false) => self.metrics.mqtt_connected.dec(),
                _ => {}
            }
            let new_failures = state.decode_failures - failures_before;
            if new_failures > 0 {
                self.metrics.decode_failures_total.inc_by(new_failures);
            }

            for effect in effects {
                match effect {
                    Effect::Subscribe(topics) => {
                        if let Err(e) = link.subscribe_many(&topics) {
                            warn!(?e, "MQTT subscribe failed");
                            queue.push_back(PanelEvent::SubscribeFailed(e.to_string()));
                        }
                    }
                    Effect::Publish(req) => match link.publish(&req.topic, req.payload.as_bytes()) {
                        Ok(()) => {
                            self.metrics.mqtt_tx_total.inc();
                            queue.push_back(PanelEvent::Published { topic: req.topic, payload: req.payload });
                        }
                        Err(e) => {
                            warn!(?e, topic = %req.topic, "MQTT publish failed");
                            queue.push_back(PanelEvent::PublishFailed { kind: req.kind, message: e.to_string() });
                        }
                    },
                }
            }
        }
    }
}

fn panel_event(evt: MqttEvent) -> PanelEvent {
    match evt {
        MqttEvent::Connected => PanelEvent::Connected,
        MqttEvent::Subscribed => PanelEvent::Subscribed,
        MqttEvent::SubscribeFailed(msg) => PanelEvent::SubscribeFailed(msg),
        MqttEvent::Publish { topic, payload } => PanelEvent::Message { topic, payload },
        MqttEvent::Reconnecting => PanelEvent::Reconnecting,
        MqttEvent::Closed => PanelEvent::Closed,
        MqttEvent::Error(msg) => PanelEvent::TransportError(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use relaypanel_core::{DeviceTopics, TimeField};
    use relaypanel_mqtt::MqttError;
    use tokio::time::timeout;

    struct FakeLink {
        events: broadcast::Sender<MqttEvent>,
        subscriptions: Mutex<Vec<Vec<String>>>,
        published: Mutex<Vec<(String, String)>>,
        fail_publish: AtomicBool,
        disconnected: AtomicBool,
    }

    impl FakeLink {
        fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                events,
                subscriptions: Mutex::default(),
                published: Mutex::default(),
                fail_publish: AtomicBool::new(false),
                disconnected: AtomicBool::new(false),
            }
        }
    }

    impl MessagingClient for FakeLink {
        fn events(&self) -> broadcast::Receiver<MqttEvent> {
            self.events.subscribe()
        }

        fn subscribe_many(&self, topics: &[String]) -> Result<(), MqttError> {
            self.subscriptions.lock().unwrap().push(topics.to_vec());
            Ok(())
        }

        fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(MqttError::InvalidBrokerUrl("link down".into()));
            }
            let payload = String::from_utf8_lossy(payload).to_string();
            self.published.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }

        fn disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        link: Arc<FakeLink>,
        events: broadcast::Sender<MqttEvent>,
        commands: mpsc::Sender<UiCommand>,
        views: watch::Receiver<PanelView>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> Harness {
        let link = Arc::new(FakeLink::new());
        let metrics = Metrics::new().unwrap();
        let session = PanelSession::new(PanelController::new(DeviceTopics::new("dev"), 50), metrics);
        // The session listens through the trait, as it would on a live link.
        let events_rx = link.events();
        let events_tx = link.events.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (view_tx, view_rx) = watch::channel(session.view());

        let run_link = link.clone();
        let task = tokio::spawn(async move {
            session.run(&*run_link, events_rx, cmd_rx, view_tx).await;
        });
        Harness { link, events: events_tx, commands: cmd_tx, views: view_rx, task }
    }

    async fn wait_for(views: &mut watch::Receiver<PanelView>, pred: impl Fn(&PanelView) -> bool) -> PanelView {
        timeout(Duration::from_secs(2), async {
            loop {
                {
                    let view = views.borrow_and_update();
                    if pred(&view) {
                        return view.clone();
                    }
                }
                views.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn subscribes_on_connect_and_mirrors_state() {
        let mut h = start();
        h.events.send(MqttEvent::Connected).unwrap();
        let view = wait_for(&mut h.views, |v| v.connected).await;
        assert_eq!(view.banner, "Connected to broker | Device offline");
        assert_eq!(
            h.link.subscriptions.lock().unwrap().clone(),
            vec![vec![
                "iot/relay/dev/status".to_string(),
                "iot/relay/dev/state".to_string(),
                "iot/relay/dev/sched".to_string(),
            ]]
        );

        h.events
            .send(MqttEvent::Publish { topic: "iot/relay/dev/state".into(), payload: br#"{"states":[1,0,1,0]}"#.to_vec() })
            .unwrap();
        let view = wait_for(&mut h.views, |v| v.relays[0].on).await;
        let labels: Vec<_> = view.relays.iter().map(|c| c.label).collect();
        assert_eq!(labels, vec!["ON", "OFF", "ON", "OFF"]);

        drop(h.commands);
        h.task.await.unwrap();
        assert!(h.link.disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn toggle_round_trips_through_the_device() {
        let mut h = start();
        h.commands.send(UiCommand::Toggle { channel: 2, on: true }).await.unwrap();
        let view = wait_for(&mut h.views, |v| v.log.iter().any(|l| l.starts_with("TX"))).await;
        assert_eq!(view.log.last().map(String::as_str), Some("TX iot/relay/dev/cmd/2 1"));
        // Not reflected until the device broadcasts its state.
        assert!(!view.relays[2].on);
        assert_eq!(
            h.link.published.lock().unwrap().clone(),
            vec![("iot/relay/dev/cmd/2".to_string(), "1".to_string())]
        );

        h.events
            .send(MqttEvent::Publish { topic: "iot/relay/dev/state".into(), payload: br#"{"states":[0,0,1,0]}"#.to_vec() })
            .unwrap();
        wait_for(&mut h.views, |v| v.relays[2].on).await;
        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn save_publishes_whole_table() {
        let mut h = start();
        h.commands
            .send(UiCommand::SetTime { channel: 0, field: TimeField::On, value: "06:30".into() })
            .await
            .unwrap();
        h.commands.send(UiCommand::Save { channel: 0 }).await.unwrap();
        wait_for(&mut h.views, |v| v.log.iter().any(|l| l.starts_with("TX"))).await;

        let published = h.link.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        let (topic, body) = &published[0];
        assert_eq!(topic, "iot/relay/dev/sched/set");
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        let relays = json["relays"].as_array().unwrap();
        assert_eq!(relays.len(), 4);
        assert_eq!(relays[0]["on"], "06:30");
        assert_eq!(relays[3]["on"], "07:00");
        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_is_logged_not_fatal() {
        let mut h = start();
        h.link.fail_publish.store(true, Ordering::SeqCst);
        h.commands.send(UiCommand::Save { channel: 1 }).await.unwrap();
        let view = wait_for(&mut h.views, |v| v.log.iter().any(|l| l.starts_with("Save error"))).await;
        assert!(view.log.iter().all(|l| !l.starts_with("TX")));

        h.events.send(MqttEvent::Error("boom".into())).unwrap();
        h.events.send(MqttEvent::Closed).unwrap();
        h.events.send(MqttEvent::Reconnecting).unwrap();
        let view = wait_for(&mut h.views, |v| v.log.iter().any(|l| l == "Reconnecting…")).await;
        assert!(view.log.iter().any(|l| l == "Error: boom"));
        assert!(!view.connected);
        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_leaves_view_unchanged() {
        let mut h = start();
        h.events
            .send(MqttEvent::Publish { topic: "iot/relay/dev/sched".into(), payload: b"{not json".to_vec() })
            .unwrap();
        let view = wait_for(&mut h.views, |v| !v.log.is_empty()).await;
        assert_eq!(view.log, vec!["RX iot/relay/dev/sched {not json".to_string()]);
        assert!(view.relays.iter().all(|c| c.on_time == "07:00" && c.off_time == "22:30"));
        drop(h.commands);
        h.task.await.unwrap();
    }
}
