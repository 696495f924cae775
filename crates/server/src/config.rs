use std::env;
use std::net::SocketAddr;

use relaypanel_core::log::DEFAULT_LOG_CAPACITY;
use relaypanel_core::DEFAULT_DEVICE_ID;

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub http_addr: SocketAddr,
    pub device_id: String,
    pub log_capacity: usize,
    /// Serve the panel page from this directory instead of the embedded copy.
    pub app_dir: Option<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            app_dir: None,
        }
    }
}

impl PanelConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = PanelConfig::default();

        if let Ok(v) = env::var("RELAYPANEL_HTTP_ADDR") {
            cfg.http_addr = v
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid RELAYPANEL_HTTP_ADDR {:?}: {}", v, e))?;
        }
        if let Ok(v) = env::var("RELAYPANEL_DEVICE_ID") {
            if !v.is_empty() {
                cfg.device_id = v;
            }
        }
        if let Ok(v) = env::var("RELAYPANEL_LOG_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.log_capacity = n;
            }
        }
        if let Ok(v) = env::var("RELAYPANEL_APP_DIR") {
            if !v.is_empty() {
                cfg.app_dir = Some(v);
            }
        }

        Ok(cfg)
    }
}
