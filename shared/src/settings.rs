// Connection Settings Module
// Retry budgets, failure policies and addressing for one wake cycle

use std::time::Duration;

// Import serde so the firmware can log the active settings as JSON
use serde::Serialize;

use crate::radio::StaticIp;

// Defaults carried over from the field-tested firmware constants
const FAST_CONNECT_RETRIES: u16 = 15; // Polls while joining with the RTC hint
const FAST_CONNECT_POLL_MS: u32 = 50;
const COLD_CONNECT_RETRIES: u16 = 60; // 60 x 100 ms = 6 s full join
const COLD_CONNECT_POLL_MS: u32 = 100;
const MQTT_RETRIES: u8 = 3; // Broker connect attempts per cycle
const MQTT_RETRY_DELAY_MS: u32 = 500; // Constant, no backoff
const SLEEP_DURATION_US: u64 = 10_000_000;

/// What a connect operation does once its retry budget is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectFailurePolicy {
    /// Return `false` and let the caller decide
    #[default]
    ReportFailure,
    /// Record the error in RTC memory and end the cycle with a sleep request
    Sleep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSettings {
    pub fast_connect_retries: u16,
    pub fast_connect_poll_ms: u32,
    pub cold_connect_retries: u16,
    pub cold_connect_poll_ms: u32,
    pub mqtt_retries: u8, // Broker connect attempts; 0 still makes one attempt
    pub mqtt_retry_delay_ms: u32,
    pub sleep_duration_us: u64,
    pub wifi_failure_policy: ConnectFailurePolicy,
    pub mqtt_failure_policy: ConnectFailurePolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            fast_connect_retries: FAST_CONNECT_RETRIES,
            fast_connect_poll_ms: FAST_CONNECT_POLL_MS,
            cold_connect_retries: COLD_CONNECT_RETRIES,
            cold_connect_poll_ms: COLD_CONNECT_POLL_MS,
            mqtt_retries: MQTT_RETRIES,
            mqtt_retry_delay_ms: MQTT_RETRY_DELAY_MS,
            sleep_duration_us: SLEEP_DURATION_US,
            wifi_failure_policy: ConnectFailurePolicy::ReportFailure,
            mqtt_failure_policy: ConnectFailurePolicy::ReportFailure,
        }
    }
}

impl ConnectionSettings {
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_micros(self.sleep_duration_us)
    }
}

/// Network credentials plus the fixed station address
#[derive(Debug, Clone)]
pub struct WifiSettings {
    pub ssid: String,
    pub password: String,
    pub static_ip: StaticIp,
}

/// Everything `MqttSender::new` needs besides the node itself
#[derive(Debug, Clone)]
pub struct SenderSettings {
    pub device_id: u8,
    pub io_user: String,    // Broker account, prefix of every topic
    pub feed: String,       // Data feed of this device
    pub error_feed: String, // Shared diagnostics feed
    pub wifi: WifiSettings,
    pub connection: ConnectionSettings,
}
