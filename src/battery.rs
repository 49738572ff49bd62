// Battery voltage through a 1:2 divider on GPIO34 (ADC1, usable while WiFi runs)

use esp_idf_svc::hal::adc::attenuation::DB_11;
use esp_idf_svc::hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_svc::hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_svc::hal::adc::ADC1;
use esp_idf_svc::hal::gpio::Gpio34;

use anyhow::{bail, Result};
use log::debug;

const ADC_FULL_SCALE: f32 = 4095.0;
const ADC_REFERENCE_VOLTS: f32 = 3.3;
const DIVIDER_RATIO: f32 = 2.0;

// Below this the pin is floating or the divider is disconnected
const MIN_PLAUSIBLE_VOLTS: f32 = 0.5;

/// One oneshot sample of the battery voltage, in volts
pub fn read_battery_volts(adc: ADC1, pin: Gpio34) -> Result<f32> {
    let adc = AdcDriver::new(adc)?;
    let config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let mut channel = AdcChannelDriver::new(&adc, pin, &config)?;

    let raw = adc.read_raw(&mut channel)?;
    let volts = raw_to_volts(raw);
    debug!("Battery ADC raw {} -> {:.2} V", raw, volts);

    if volts < MIN_PLAUSIBLE_VOLTS {
        bail!("implausible battery voltage {:.2} V (raw {})", volts, raw);
    }
    Ok(volts)
}

fn raw_to_volts(raw: u16) -> f32 {
    f32::from(raw) / ADC_FULL_SCALE * ADC_REFERENCE_VOLTS * DIVIDER_RATIO
}
