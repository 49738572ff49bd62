// Build-time Configuration
// Values come from cfg.toml at the crate root (see cfg.toml.example);
// any key missing there falls back to the default below.

use std::net::Ipv4Addr;

// Import anyhow for error handling following existing patterns
use anyhow::{Context, Result};

use dozer_shared::{
    ConnectFailurePolicy, ConnectionSettings, SenderSettings, StaticIp, WifiSettings,
};

#[toml_cfg::toml_config]
pub struct Config {
    #[default("")]
    wifi_ssid: &'static str,
    #[default("")]
    wifi_pass: &'static str,
    #[default("192.168.1.50")]
    ip_addr: &'static str,
    #[default("192.168.1.1")]
    gateway_addr: &'static str,
    #[default("255.255.255.0")]
    subnet_addr: &'static str,
    #[default("io.adafruit.com")]
    io_server: &'static str,
    #[default(1883)]
    io_port: u16,
    #[default("")]
    io_user: &'static str,
    #[default("")]
    io_key: &'static str,
    #[default("battery")]
    io_feed: &'static str,
    #[default("/feeds/errors")]
    io_error_feed: &'static str,
    #[default(1)]
    device_id: u8,
    #[default(3)]
    conn_retries: u8,
    #[default(500)]
    conn_retry_delay_ms: u32,
    #[default(15)]
    fast_connect_retries: u16,
    #[default(60)]
    cold_connect_retries: u16,
    #[default(10)]
    sleep_secs: u64,
    #[default(false)]
    sleep_on_wifi_failure: bool,
    #[default(false)]
    sleep_on_mqtt_failure: bool,
}

/// `mqtt://host:port` of the broker
pub fn broker_url() -> String {
    format!("mqtt://{}:{}", CONFIG.io_server, CONFIG.io_port)
}

/// Sender settings assembled from the compiled-in configuration
pub fn sender_settings() -> Result<SenderSettings> {
    let static_ip = StaticIp {
        ip: parse_addr("ip_addr", CONFIG.ip_addr)?,
        gateway: parse_addr("gateway_addr", CONFIG.gateway_addr)?,
        subnet: parse_addr("subnet_addr", CONFIG.subnet_addr)?,
    };

    let connection = ConnectionSettings {
        fast_connect_retries: CONFIG.fast_connect_retries,
        cold_connect_retries: CONFIG.cold_connect_retries,
        mqtt_retries: CONFIG.conn_retries,
        mqtt_retry_delay_ms: CONFIG.conn_retry_delay_ms,
        sleep_duration_us: CONFIG.sleep_secs * 1_000_000,
        wifi_failure_policy: failure_policy(CONFIG.sleep_on_wifi_failure),
        mqtt_failure_policy: failure_policy(CONFIG.sleep_on_mqtt_failure),
        ..ConnectionSettings::default()
    };

    Ok(SenderSettings {
        device_id: CONFIG.device_id,
        io_user: CONFIG.io_user.to_string(),
        feed: CONFIG.io_feed.to_string(),
        error_feed: CONFIG.io_error_feed.to_string(),
        wifi: WifiSettings {
            ssid: CONFIG.wifi_ssid.to_string(),
            password: CONFIG.wifi_pass.to_string(),
            static_ip,
        },
        connection,
    })
}

fn parse_addr(key: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .parse()
        .with_context(|| format!("cfg.toml: {} is not an IPv4 address: '{}'", key, value))
}

fn failure_policy(sleep: bool) -> ConnectFailurePolicy {
    if sleep {
        ConnectFailurePolicy::Sleep
    } else {
        ConnectFailurePolicy::ReportFailure
    }
}
