// Dozer sensor node firmware
// One wake cycle per boot: join WiFi (fast when the RTC record has a hint),
// connect to the broker, publish the battery reading, then deep sleep.
// Every path out of the cycle ends in deep sleep; a wake is a full reset.

mod battery;
mod config;
mod device_info;
mod mqtt_client;
mod rtc_region;
mod wifi_client;

use std::time::Duration;

// Import ESP-IDF system services
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;

// Import anyhow for error handling following existing patterns
use anyhow::{anyhow, Result};

// Import logging macros
use log::{error, info, warn};

// Import serde_json for the boot snapshot
use serde_json::json;

use dozer_shared::{
    MqttSender, Node, Reading, RtcErrorCode, RtcMemory, SignalCode, SleepRequest,
};

use crate::config::CONFIG;
use crate::mqtt_client::EspBroker;
use crate::rtc_region::RtcSlowMemory;
use crate::wifi_client::EspRadio;

// Representation of the last reading kept in RTC memory
type LastReading = f64;

type Sender<'n> = MqttSender<'n, EspRadio, EspBroker, RtcSlowMemory, LastReading, FreeRtos>;

fn main() {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("🌅 Dozer node {} waking up", CONFIG.device_id);

    let request = match run() {
        Ok(request) => request,
        Err(e) => {
            error!("❌ Wake cycle setup failed: {:?}", e);
            SleepRequest {
                duration: Duration::from_secs(CONFIG.sleep_secs),
                error: RtcErrorCode::Unknown,
            }
        }
    };

    enter_deep_sleep(&request);
}

/// Bring the node up and run one cycle. `Err` only for setup failures
/// before the orchestrator exists.
fn run() -> Result<SleepRequest> {
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let settings = config::sender_settings()?;
    info!("⚙️ Connection settings: {}", json!(settings.connection));

    let region = RtcSlowMemory::take().ok_or_else(|| anyhow!("RTC region already taken"))?;
    let mut rtc: RtcMemory<RtcSlowMemory, LastReading> = RtcMemory::new(region);
    rtc.load();
    report_previous_cycle(&rtc);

    // Sample before the radio starts drawing current
    let battery = battery::read_battery_volts(peripherals.adc1, peripherals.pins.gpio34);

    let radio = EspRadio::new(peripherals.modem, sys_loop)?;
    let broker = EspBroker::new(
        config::broker_url(),
        device_info::mqtt_client_id(settings.device_id),
        CONFIG.io_user,
        CONFIG.io_key,
    );

    let mut node = Node::new(radio, broker, rtc, FreeRtos);
    let mut sender = MqttSender::new(&mut node, &settings);

    let request = match wake_cycle(&mut sender, battery) {
        Ok(request) | Err(request) => request,
    };
    Ok(request)
}

/// Connect, publish, sleep. `Err` is an early exit already carrying its sleep.
fn wake_cycle(sender: &mut Sender<'_>, battery: Result<f32>) -> Result<SleepRequest, SleepRequest> {
    if !sender.connect_wifi()? {
        return Ok(sender.go_to_sleep(RtcErrorCode::NoWifi));
    }

    if !sender.connect_mqtt()? {
        return Ok(sender.go_to_sleep(RtcErrorCode::NoMqtt));
    }

    match battery {
        Ok(volts) => sender.send_data(
            Reading::F32 {
                value: volts,
                decimals: 2,
            },
            true,
        )?,
        Err(e) => {
            warn!("⚠️ Battery reading failed: {:?}", e);
            sender.send_error(SignalCode::ReadingError)?;
        }
    }

    Ok(sender.go_to_sleep(RtcErrorCode::None))
}

fn report_previous_cycle(rtc: &RtcMemory<RtcSlowMemory, LastReading>) {
    info!("📋 MAC {}", device_info::get_device_mac_address());

    let snapshot = json!({
        "valid": rtc.is_valid(),
        "record": rtc.get_data(),
    });
    info!("📋 RTC record: {}", snapshot);

    match rtc.valid_data() {
        Some(previous) if previous.last_error != RtcErrorCode::None => {
            warn!("⚠️ Previous cycle ended with {:?}", previous.last_error);
        }
        Some(_) => {}
        None => info!("📋 No valid RTC record (first boot or corrupted)"),
    }
}

fn enter_deep_sleep(request: &SleepRequest) {
    info!(
        "😴 Deep sleep for {} s ({:?})",
        request.duration.as_secs(),
        request.error
    );
    // Wakes through a full reset; nothing after this call runs
    unsafe { esp_idf_svc::sys::esp_deep_sleep(request.duration_us()) };
}
