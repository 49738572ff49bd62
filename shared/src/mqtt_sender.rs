// MQTT Sender Module
// Wake-cycle connectivity: fast or cold WiFi join driven by the RTC hint,
// bounded broker connect, publish with sleep-on-failure.
// Single-threaded and blocking; every wait is a counted poll-and-delay loop.

// Import the delay seam used inside the retry loops
use embedded_hal::delay::DelayNs;

// Import the region primitive the RTC record lives in
use embedded_storage::Storage;

// Import logging macros for debug output
use log::{debug, error, info, warn};

use crate::payload::{data_message, error_message, feed_topic, Reading, SignalCode};
use crate::radio::{AccessPoint, Broker, QoS, Radio};
use crate::rtc_memory::{RtcErrorCode, RtcMemory, RtcValue, SleepRequest};
use crate::settings::{ConnectFailurePolicy, ConnectionSettings, SenderSettings, WifiSettings};

// Pause between the steps of the radio reset before a cold join
const RADIO_RESET_PAUSE_MS: u32 = 10;

/// Everything the device owns for one wake cycle.
///
/// Created once by the entry point and lent to `MqttSender`; there is no
/// other instance of the radio, the broker session or the RTC record.
pub struct Node<R, B, S, V, D> {
    pub radio: R,
    pub broker: B,
    pub rtc: RtcMemory<S, V>,
    pub delay: D,
}

impl<R, B, S, V, D> Node<R, B, S, V, D> {
    pub fn new(radio: R, broker: B, rtc: RtcMemory<S, V>, delay: D) -> Self {
        Self {
            radio,
            broker,
            rtc,
            delay,
        }
    }
}

/// Connects the node and publishes on behalf of one device id.
///
/// Connect operations report exhaustion per their `ConnectFailurePolicy`;
/// publish operations always end the cycle on failure. An `Err(SleepRequest)`
/// means the cycle is over and must be propagated to the platform.
pub struct MqttSender<'n, R, B, S, V, D> {
    node: &'n mut Node<R, B, S, V, D>,
    device_id: u8,
    feed: String,       // Full data topic
    error_feed: String, // Full diagnostics topic
    wifi: WifiSettings,
    settings: ConnectionSettings,
}

impl<'n, R, B, S, V, D> MqttSender<'n, R, B, S, V, D>
where
    R: Radio,
    B: Broker,
    S: Storage,
    V: RtcValue,
    D: DelayNs,
{
    pub fn new(node: &'n mut Node<R, B, S, V, D>, settings: &SenderSettings) -> Self {
        let feed = feed_topic(&settings.io_user, &settings.feed);
        let error_feed = feed_topic(&settings.io_user, &settings.error_feed);
        info!(
            "MQTT sender for device {} on '{}' (errors on '{}')",
            settings.device_id, feed, error_feed
        );

        Self {
            node,
            device_id: settings.device_id,
            feed,
            error_feed,
            wifi: settings.wifi.clone(),
            settings: settings.connection.clone(),
        }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    /// Join the network, using the RTC hint when it can be trusted.
    ///
    /// A failed fast join is not fatal: the radio is reset and a cold join
    /// with the larger budget follows. Only the cold join exhausting its
    /// budget is a failure.
    pub fn connect_wifi(&mut self) -> Result<bool, SleepRequest> {
        info!("Connecting with network '{}'", self.wifi.ssid);

        if !self.node.radio.configure_static_ip(&self.wifi.static_ip) {
            warn!("Static IP configuration rejected, joining anyway");
        }

        if let Some(hint) = self.stored_hint() {
            info!("RTC data valid - fast connect on {}", hint);
            self.begin_association(Some(hint));

            let retries = self.settings.fast_connect_retries;
            let poll_ms = self.settings.fast_connect_poll_ms;
            if self.wait_for_association(retries, poll_ms) {
                info!("Fast connect succeeded");
                return Ok(true);
            }

            warn!("Fast connect failed - trying normal connect");
            self.reset_radio();
        } else {
            info!("No usable RTC data - normal connect");
        }

        self.begin_association(None);

        let retries = self.settings.cold_connect_retries;
        let poll_ms = self.settings.cold_connect_poll_ms;
        if self.wait_for_association(retries, poll_ms) {
            info!("Connected with network");
            return Ok(true);
        }

        error!("WiFi connection failed after {} polls", retries);
        self.connect_failed(self.settings.wifi_failure_policy, RtcErrorCode::NoWifi)
    }

    /// Establish the broker session with a bounded number of attempts.
    ///
    /// Every refused attempt disconnects; the constant retry delay is only
    /// spent when another attempt follows.
    pub fn connect_mqtt(&mut self) -> Result<bool, SleepRequest> {
        if self.node.broker.connected() {
            return Ok(true);
        }

        info!("Connecting with MQTT broker");
        let attempts = self.settings.mqtt_retries.max(1);

        for attempt in 1..=attempts {
            match self.node.broker.connect() {
                Ok(()) => {
                    info!("MQTT connected on attempt {}", attempt);
                    return Ok(true);
                }
                Err(e) => {
                    warn!(
                        "MQTT connect attempt {}/{} failed: {} (code {})",
                        attempt,
                        attempts,
                        e,
                        e.code()
                    );
                    self.node.broker.disconnect();

                    if attempt < attempts {
                        debug!("Retrying in {} ms", self.settings.mqtt_retry_delay_ms);
                        self.node.delay.delay_ms(self.settings.mqtt_retry_delay_ms);
                    }
                }
            }
        }

        error!("MQTT connection failed after {} attempts", attempts);
        self.connect_failed(self.settings.mqtt_failure_policy, RtcErrorCode::NoMqtt)
    }

    /// Publish `{device_id}/{code}` on the diagnostics feed (client default QoS)
    pub fn send_error(&mut self, code: SignalCode) -> Result<(), SleepRequest> {
        let msg = error_message(self.device_id, code);

        let published =
            self.node.broker.connected() && self.node.broker.publish(&self.error_feed, &msg, None);

        if !published {
            error!("Error signal sending failed: {}", msg);
            return Err(self.go_to_sleep(RtcErrorCode::PublishFailed));
        }

        info!("Error signal sent: {}", msg);
        Ok(())
    }

    /// Publish `{device_id}:{msg}[:{additional}]` on the data feed with QoS 1
    pub fn send_msg(&mut self, msg: &str, additional: &str) -> Result<(), SleepRequest> {
        let sent = data_message(self.device_id, msg, additional);

        // No implicit reconnect: a dropped session is a failed publish
        let published = self.node.broker.connected()
            && self
                .node
                .broker
                .publish(&self.feed, &sent, Some(QoS::AtLeastOnce));

        if !published {
            error!("Signal sending failed: {}", sent);
            return Err(self.go_to_sleep(RtcErrorCode::PublishFailed));
        }

        info!("Signal sent: {}", sent);
        Ok(())
    }

    /// Encode and publish a reading, persisting it first when `save` is set
    pub fn send_data(&mut self, reading: Reading, save: bool) -> Result<(), SleepRequest> {
        let msg = reading.encode();

        if save {
            let value = V::from_reading(&reading);
            let node = &mut *self.node;
            if !node.rtc.save_with_data(&node.radio, value) {
                warn!("Reading not persisted to RTC memory");
            }
        }

        self.send_msg(&msg, "")
    }

    /// Whether an inbound command addressed to `device_id` is meant for this device
    pub fn compare_id(&self, device_id: u8) -> bool {
        self.device_id == device_id
    }

    /// Record `code` and end the cycle with the configured sleep duration
    pub fn go_to_sleep(&mut self, code: RtcErrorCode) -> SleepRequest {
        let duration = self.settings.sleep_duration();
        let node = &mut *self.node;
        node.rtc.go_deep_sleep(&mut node.radio, code, duration)
    }

    fn stored_hint(&self) -> Option<AccessPoint> {
        self.node
            .rtc
            .valid_data()
            .map(|data| data.access_point())
            .filter(|ap| !ap.is_unset())
    }

    fn begin_association(&mut self, hint: Option<AccessPoint>) {
        let started = self
            .node
            .radio
            .associate(&self.wifi.ssid, &self.wifi.password, hint);
        if !started {
            warn!("Radio refused to start association");
        }
    }

    fn wait_for_association(&mut self, retries: u16, poll_ms: u32) -> bool {
        for _ in 0..retries {
            if self.node.radio.is_associated() {
                return true;
            }
            self.node.delay.delay_ms(poll_ms);
        }
        self.node.radio.is_associated()
    }

    // Disconnect and power-cycle the radio so the cold join starts clean
    fn reset_radio(&mut self) {
        self.node.radio.disassociate();
        self.node.delay.delay_ms(RADIO_RESET_PAUSE_MS);
        self.node.radio.sleep_radio();
        self.node.delay.delay_ms(RADIO_RESET_PAUSE_MS);
        self.node.radio.wake_radio();
        self.node.delay.delay_ms(RADIO_RESET_PAUSE_MS);
    }

    fn connect_failed(
        &mut self,
        policy: ConnectFailurePolicy,
        code: RtcErrorCode,
    ) -> Result<bool, SleepRequest> {
        match policy {
            ConnectFailurePolicy::ReportFailure => Ok(false),
            ConnectFailurePolicy::Sleep => Err(self.go_to_sleep(code)),
        }
    }
}
