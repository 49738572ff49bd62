// MQTT Client Module with Real ESP-IDF Implementation
// Username/key authentication against the telemetry broker (plain TCP)
// Connection state is tracked from the ESP-IDF event callback

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Import raw esp-mqtt bindings to read the CONNACK return code of a refusal
use esp_idf_svc::handle::RawHandle;
use esp_idf_svc::sys::{
    esp, esp_event_base_t, esp_mqtt_client_register_event,
    esp_mqtt_error_type_t_MQTT_ERROR_TYPE_CONNECTION_REFUSED,
    esp_mqtt_event_id_t_MQTT_EVENT_ERROR, esp_mqtt_event_t,
};

// Import ESP-IDF MQTT client functionality
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EventPayload, MqttClientConfiguration, QoS as EspQoS,
};

// Import FreeRTOS delay for blocking waits on broker events
use esp_idf_svc::hal::delay::FreeRtos;

// Import logging macros for debug output with consistent emoji prefixes
use log::{debug, info, warn};

use dozer_shared::{Broker, ConnectError, QoS};

// Broker handshake timing
const CONNECT_TIMEOUT_MS: u32 = 5000;
const PUBACK_TIMEOUT_MS: u32 = 3000;
const EVENT_POLL_MS: u32 = 20;

/// State shared with the ESP-IDF event callback
#[derive(Default)]
struct LinkState {
    connected: AtomicBool,
    failed: AtomicBool,
    refusal: AtomicU32,    // CONNACK return code, 0 when the broker never refused
    last_acked: AtomicU32, // message id of the most recent PUBACK
}

// Raw MQTT_EVENT_ERROR handler. `arg` is the `LinkState` owned by the broker,
// which outlives the client the handler is registered on.
unsafe extern "C" fn on_mqtt_error(
    arg: *mut c_void,
    _base: esp_event_base_t,
    _id: i32,
    data: *mut c_void,
) {
    if arg.is_null() || data.is_null() {
        return;
    }
    let link = &*(arg as *const LinkState);
    let event = &*(data as *const esp_mqtt_event_t);

    if !event.error_handle.is_null() {
        let error = &*event.error_handle;
        if error.error_type == esp_mqtt_error_type_t_MQTT_ERROR_TYPE_CONNECTION_REFUSED {
            link.refusal
                .store(error.connect_return_code as u32, Ordering::SeqCst);
        }
    }
    // Set last so `connect` always sees the refusal code together with the failure
    link.failed.store(true, Ordering::SeqCst);
}

/// Broker session over esp-mqtt.
///
/// The client is created lazily on `connect` and dropped on `disconnect`,
/// so a retry starts from a fresh TCP connection.
pub struct EspBroker {
    url: String,
    client_id: String,
    username: &'static str,
    password: &'static str,
    client: Option<EspMqttClient<'static>>, // Declared before `link`: dropped first
    link: Arc<LinkState>,
}

impl EspBroker {
    pub fn new(
        url: String,
        client_id: String,
        username: &'static str,
        password: &'static str,
    ) -> Self {
        Self {
            url,
            client_id,
            username,
            password,
            client: None,
            link: Arc::new(LinkState::default()),
        }
    }

    fn start_client(&mut self) -> Result<(), ConnectError> {
        let mqtt_config = MqttClientConfiguration {
            client_id: Some(&self.client_id),
            username: Some(self.username),
            password: Some(self.password),
            keep_alive_interval: Some(Duration::from_secs(30)),
            network_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        self.link.connected.store(false, Ordering::SeqCst);
        self.link.failed.store(false, Ordering::SeqCst);
        self.link.refusal.store(0, Ordering::SeqCst);

        let link = self.link.clone();
        let client = EspMqttClient::new_cb(&self.url, &mqtt_config, move |event| {
            match event.payload() {
                EventPayload::Connected(_) => link.connected.store(true, Ordering::SeqCst),
                EventPayload::Disconnected => link.connected.store(false, Ordering::SeqCst),
                EventPayload::Published(id) => link.last_acked.store(id, Ordering::SeqCst),
                EventPayload::Error(e) => warn!("⚠️ MQTT event error: {:?}", e),
                _ => {}
            }
        })
        .map_err(|e| {
            warn!("❌ Failed to create MQTT client: {:?}", e);
            ConnectError::ConnectionFailed
        })?;

        // The CONNACK cannot arrive before the TCP connect that follows client start
        let registered = esp!(unsafe {
            esp_mqtt_client_register_event(
                client.handle(),
                esp_mqtt_event_id_t_MQTT_EVENT_ERROR,
                Some(on_mqtt_error),
                Arc::as_ptr(&self.link) as *mut c_void,
            )
        });
        if let Err(e) = registered {
            warn!("❌ Failed to register MQTT error handler: {:?}", e);
            return Err(ConnectError::ConnectionFailed);
        }

        self.client = Some(client);
        Ok(())
    }

    fn wait_for_ack(&self, id: u32) -> bool {
        for _ in 0..PUBACK_TIMEOUT_MS / EVENT_POLL_MS {
            if self.link.last_acked.load(Ordering::SeqCst) == id {
                return true;
            }
            if !self.link.connected.load(Ordering::SeqCst) {
                return false;
            }
            FreeRtos::delay_ms(EVENT_POLL_MS);
        }
        false
    }
}

impl Broker for EspBroker {
    fn connect(&mut self) -> Result<(), ConnectError> {
        if self.client.is_none() {
            info!("🔗 Connecting to {} as {}", self.url, self.client_id);
            self.start_client()?;
        }

        for _ in 0..CONNECT_TIMEOUT_MS / EVENT_POLL_MS {
            if self.link.connected.load(Ordering::SeqCst) {
                return Ok(());
            }
            if self.link.failed.load(Ordering::SeqCst) {
                let refusal = self.link.refusal.load(Ordering::SeqCst);
                return Err(ConnectError::from_refusal(refusal));
            }
            FreeRtos::delay_ms(EVENT_POLL_MS);
        }

        // TCP is up but no CONNACK arrived in time
        Err(ConnectError::ServerUnavailable)
    }

    fn connected(&self) -> bool {
        self.client.is_some() && self.link.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&mut self) {
        if self.client.take().is_some() {
            debug!("🔌 MQTT client dropped");
        }
        self.link.connected.store(false, Ordering::SeqCst);
    }

    fn publish(&mut self, topic: &str, payload: &str, qos: Option<QoS>) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };

        let esp_qos = match qos {
            Some(QoS::AtLeastOnce) => EspQoS::AtLeastOnce,
            Some(QoS::AtMostOnce) | None => EspQoS::AtMostOnce,
        };

        let id = match client.publish(topic, esp_qos, false, payload.as_bytes()) {
            Ok(id) => id,
            Err(e) => {
                warn!("❌ Publish to {} failed: {:?}", topic, e);
                return false;
            }
        };

        if matches!(esp_qos, EspQoS::AtLeastOnce) && !self.wait_for_ack(id) {
            warn!("❌ No PUBACK for message {} on {}", id, topic);
            return false;
        }

        debug!("📤 Published message {} to {}", id, topic);
        true
    }
}
