use std::time::Duration;

use car_link::codec::{DEFAULT_SPEED, TURNING_SPEED};
use car_link::LinkConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for the daemon
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// IP address of the vehicle's TCP control port
    pub vehicle_host: String,
    /// TCP port of the vehicle's control interface
    pub vehicle_port: u16,
    /// Port the WebSocket server listens on
    pub listen_port: u16,
    /// Keepalive command interval while connected
    pub heartbeat_interval_ms: u64,
    /// Bound on the vehicle TCP connect attempt
    pub connect_timeout_ms: u64,
    /// Minimum gap between consecutive command writes
    pub send_debounce_ms: u64,
    /// Straight-line drive speed
    pub default_speed: i32,
    /// In-place turn speed
    pub turning_speed: i32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            vehicle_host: "192.168.4.1".to_string(),
            vehicle_port: 100,
            listen_port: 3000,
            heartbeat_interval_ms: 1000,
            connect_timeout_ms: 5000,
            send_debounce_ms: 50,
            default_speed: DEFAULT_SPEED,
            turning_speed: TURNING_SPEED,
        }
    }
}

impl DaemonConfig {
    /// Vehicle-side view of the configuration.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            host: self.vehicle_host.clone(),
            port: self.vehicle_port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            send_debounce: Duration::from_millis(self.send_debounce_ms),
        }
    }
}

/// Load daemon configuration from file or fall back to defaults, writing a
/// default file for future runs when none exists.
pub fn load_config(path: &str) -> DaemonConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                info!("loaded configuration from {}", path);
                config
            }
            Err(e) => {
                warn!("error parsing {}: {}. Using defaults.", path, e);
                DaemonConfig::default()
            }
        },
        Err(_) => {
            let default_config = DaemonConfig::default();
            if let Ok(json) = serde_json::to_string_pretty(&default_config) {
                if std::fs::write(path, json).is_ok() {
                    info!("created default configuration file at {}", path);
                }
            }
            default_config
        }
    }
}
