use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, Json, Router};
use dotenvy::dotenv;
use futures_util::{SinkExt, StreamExt};
use prometheus::{Encoder, TextEncoder};
use relaypanel_core::{DeviceTopics, PanelController, PanelEvent, UiCommand};
use relaypanel_mqtt::{MqttConfig, MqttService};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod metrics;
mod session;

use config::PanelConfig;
use metrics::Metrics;
use session::PanelSession;

#[derive(Clone)]
struct AppState {
    mqtt_config: MqttConfig,
    topics: DeviceTopics,
    log_capacity: usize,
    metrics: Arc<Metrics>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing()?;

    let panel_cfg = PanelConfig::from_env()?;
    let mqtt_config = MqttConfig::from_env();
    // Fail fast on a bad broker URL instead of on the first page load.
    let endpoint = mqtt_config.broker_endpoint()?;
    info!(broker = %mqtt_config.broker_url, transport = ?endpoint.transport, device_id = %panel_cfg.device_id, "Configuring relay panel");

    let state = AppState {
        mqtt_config,
        topics: DeviceTopics::new(&panel_cfg.device_id),
        log_capacity: panel_cfg.log_capacity,
        metrics: Metrics::new().context("failed to register metrics")?,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version))
        .route("/metrics", get(metrics_handler))
        .route("/ws/panel", get(ws_panel));

    let app = match &panel_cfg.app_dir {
        Some(dir) => {
            info!(%dir, "Serving panel page from directory");
            let static_service = ServeDir::new(dir)
                .not_found_service(ServeFile::new(format!("{}/index.html", dir)));
            app.fallback_service(static_service)
        }
        None => app.route("/", get(index_page)),
    };
    let app = app.with_state(state);

    info!(addr = %panel_cfg.http_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(panel_cfg.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", panel_cfg.http_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,axum=info,hyper=info,rumqttc=warn"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(?e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!(?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn healthz() -> &'static str { "ok" }

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(?e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}

async fn index_page() -> Html<&'static str> {
    Html(include_str!("static/index.html"))
}

// ----- Panel WebSocket -----

async fn ws_panel(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| panel_ws_loop(state, socket))
}

/// Lifetime of one browser tab: opens its own broker link, runs the session,
/// and closes the link when the tab disconnects.
async fn panel_ws_loop(state: AppState, socket: WebSocket) {
    state.metrics.ws_clients.inc();

    let mqtt_cfg = state.mqtt_config.for_session();
    let (link, events) = match MqttService::connect(mqtt_cfg) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(?e, "Failed to start MQTT client for panel session");
            let _ = socket.close().await;
            state.metrics.ws_clients.dec();
            return;
        }
    };
    info!(client_id = %link.client_id(), "Panel client connected");

    let mut controller = PanelController::new(state.topics.clone(), state.log_capacity);
    controller.handle(PanelEvent::Connecting {
        url: link.broker_url().to_string(),
        client_id: link.client_id().to_string(),
    });
    let session = PanelSession::new(controller, state.metrics.clone());
    let (view_tx, mut view_rx) = watch::channel(session.view());
    let (cmd_tx, cmd_rx) = mpsc::channel::<UiCommand>(32);
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        loop {
            let text = serde_json::to_string(&*view_rx.borrow_and_update());
            match text {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(?e, "Failed to serialize panel view");
                    break;
                }
            }
            if view_rx.changed().await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match UiCommand::from_json(&text) {
                    Ok(cmd) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(?e, "Ignoring malformed panel command"),
                },
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!(?e, "Panel WebSocket read error");
                    break;
                }
                _ => {}
            }
        }
    });

    session.run(&link, events, cmd_rx, view_tx).await;
    reader.abort();
    let _ = writer.await;

    state.metrics.ws_clients.dec();
    info!(client_id = %link.client_id(), "Panel client disconnected");
}
