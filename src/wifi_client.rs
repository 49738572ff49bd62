// Import ESP-IDF event loop for handling system events
// The event loop manages WiFi connection events, IP assignment, etc.
use esp_idf_svc::eventloop::EspSystemEventLoop;

// Import peripheral trait for hardware access
use esp_idf_svc::hal::peripheral::Peripheral;

// Import network interface types used to pin a static address on the station
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};

// Import ESP-IDF error type and the raw AP info call
use esp_idf_svc::sys::{esp, esp_wifi_sta_get_ap_info, wifi_ap_record_t, EspError};

// Import low-level WiFi driver
use esp_idf_svc::wifi::EspWifi;

// Import WiFi and IPv4 configuration types
// - AuthMethod: WiFi security types (WPA2, WPA3, etc.)
// - ClientConfiguration: WiFi station mode config, including channel/BSSID pinning
// - ipv4::*: fixed address settings (no DHCP)
use embedded_svc::ipv4::{
    ClientConfiguration as IpClientConfiguration, ClientSettings, Configuration as IpConfiguration,
    Mask, Subnet,
};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

// Import logging macros
use log::{debug, info, warn};

use dozer_shared::{AccessPoint, Radio, StaticIp};

/// WiFi station on the ESP32 radio.
///
/// Non-blocking: `associate` starts the join and the orchestrator polls
/// `is_associated`, so the retry budget stays in one place.
pub struct EspRadio {
    wifi: EspWifi<'static>, // ESP-IDF WiFi driver
}

impl EspRadio {
    pub fn new(
        modem: impl Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
        sys_loop: EspSystemEventLoop,
    ) -> Result<Self, EspError> {
        info!("Initializing WiFi station");

        // No NVS: the RTC record is the only thing remembered about the network
        let wifi = EspWifi::new(modem, sys_loop, None)?;

        Ok(Self { wifi })
    }

    fn client_configuration(
        ssid: &str,
        password: &str,
        hint: Option<AccessPoint>,
    ) -> Option<ClientConfiguration> {
        Some(ClientConfiguration {
            ssid: ssid.try_into().ok()?,
            password: password.try_into().ok()?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            channel: hint.map(|ap| ap.channel),
            bssid: hint.map(|ap| ap.bssid),
            ..Default::default()
        })
    }
}

impl Radio for EspRadio {
    fn configure_static_ip(&mut self, ip: &StaticIp) -> bool {
        let conf = NetifConfiguration {
            ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                ClientSettings {
                    ip: ip.ip,
                    subnet: Subnet {
                        gateway: ip.gateway,
                        mask: Mask(ip.prefix_len()),
                    },
                    dns: None,
                    secondary_dns: None,
                },
            ))),
            ..NetifConfiguration::wifi_default_client()
        };

        let swapped =
            EspNetif::new_with_conf(&conf).and_then(|netif| self.wifi.swap_netif_sta(netif));

        match swapped {
            Ok(_) => {
                debug!("Static IP {}/{} via {}", ip.ip, ip.prefix_len(), ip.gateway);
                true
            }
            Err(e) => {
                warn!("Failed to apply static IP: {:?}", e);
                false
            }
        }
    }

    fn associate(&mut self, ssid: &str, password: &str, hint: Option<AccessPoint>) -> bool {
        let Some(client) = Self::client_configuration(ssid, password, hint) else {
            warn!("SSID or password too long for the WiFi driver");
            return false;
        };

        if let Err(e) = self.wifi.set_configuration(&Configuration::Client(client)) {
            warn!("Failed to set WiFi configuration: {:?}", e);
            return false;
        }

        if !self.wifi.is_started().unwrap_or(false) {
            if let Err(e) = self.wifi.start() {
                warn!("Failed to start WiFi: {:?}", e);
                return false;
            }
        }

        match self.wifi.connect() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to begin association: {:?}", e);
                false
            }
        }
    }

    fn is_associated(&mut self) -> bool {
        // Connected and the netif is up; with a fixed address that follows immediately
        self.wifi.is_up().unwrap_or(false)
    }

    fn disassociate(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            debug!("WiFi disconnect: {:?}", e);
        }
    }

    fn sleep_radio(&mut self) {
        if let Err(e) = self.wifi.stop() {
            debug!("WiFi stop: {:?}", e);
        }
    }

    fn wake_radio(&mut self) {
        if let Err(e) = self.wifi.start() {
            warn!("Failed to restart WiFi: {:?}", e);
        }
    }

    fn access_point(&self) -> Option<AccessPoint> {
        let mut record = wifi_ap_record_t::default();
        esp!(unsafe { esp_wifi_sta_get_ap_info(&mut record) }).ok()?;
        Some(AccessPoint::new(record.primary, record.bssid))
    }
}
