/// Read the factory MAC address burned into eFuse
fn factory_mac() -> [u8; 6] {
    // Get the default MAC address which is unique for each ESP32
    let mut mac = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Get the device MAC address in standard format
pub fn get_device_mac_address() -> String {
    let mac = factory_mac();
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// MQTT client id for this node.
///
/// Includes the MAC tail so two nodes flashed with the same device id do not
/// take over each other's broker session.
pub fn mqtt_client_id(device_id: u8) -> String {
    let mac = factory_mac();
    format!(
        "dozer-{}-{:02X}{:02X}{:02X}",
        device_id, mac[3], mac[4], mac[5]
    )
}
