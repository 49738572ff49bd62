// Radio and Broker Capabilities
// The orchestrator only sees these two traits; the firmware implements them
// on top of EspWifi and EspMqttClient, the tests on top of scripted mocks.

// Import formatting traits for log-friendly Display impls
use std::fmt;

// Import standard library IPv4 address type
use std::net::Ipv4Addr;

/// Channel and BSSID of the access point the station is associated with.
///
/// Persisted in RTC memory so the next wake can skip the full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPoint {
    pub channel: u8,    // Primary WiFi channel
    pub bssid: [u8; 6], // Hardware address of the access point
}

impl AccessPoint {
    pub fn new(channel: u8, bssid: [u8; 6]) -> Self {
        Self { channel, bssid }
    }

    /// All-zero hint, saved when the radio was not associated
    pub fn is_unset(&self) -> bool {
        self.channel == 0 && self.bssid == [0u8; 6]
    }
}

impl fmt::Display for AccessPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bssid;
        write!(
            f,
            "channel {} bssid {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.channel, b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Fixed station addressing. DHCP is never used, it costs too much time per wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIp {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

impl StaticIp {
    /// Subnet mask as a prefix length (255.255.255.0 -> 24)
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.subnet).count_ones() as u8
    }
}

/// WiFi station as seen by the orchestrator.
///
/// `associate` only starts the join; completion is observed by polling
/// `is_associated` inside the caller's bounded wait.
pub trait Radio {
    /// Apply static IP/gateway/subnet to the station interface
    fn configure_static_ip(&mut self, ip: &StaticIp) -> bool;

    /// Begin joining `ssid`. With a hint the join is pinned to that channel and BSSID.
    fn associate(&mut self, ssid: &str, password: &str, hint: Option<AccessPoint>) -> bool;

    fn is_associated(&mut self) -> bool;

    fn disassociate(&mut self);

    /// Power the radio down (modem sleep)
    fn sleep_radio(&mut self);

    fn wake_radio(&mut self);

    /// Access point of the current association, `None` when not associated
    fn access_point(&self) -> Option<AccessPoint>;
}

/// MQTT delivery guarantee requested for a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,  // QoS 0
    AtLeastOnce, // QoS 1
}

/// Why a broker session could not be established.
///
/// Codes follow the MQTT CONNACK return codes; `-1` is a local transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    WrongProtocol,
    IdRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    RateLimited,
    ConnectionFailed,
}

impl ConnectError {
    /// Non-zero status code; `0` is reserved for a successful connect
    pub fn code(self) -> i8 {
        match self {
            ConnectError::WrongProtocol => 1,
            ConnectError::IdRejected => 2,
            ConnectError::ServerUnavailable => 3,
            ConnectError::BadCredentials => 4,
            ConnectError::NotAuthorized => 5,
            ConnectError::RateLimited => 6,
            ConnectError::ConnectionFailed => -1,
        }
    }

    /// Map a raw connect status back to an error. `0` means connected and yields `None`.
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(ConnectError::WrongProtocol),
            2 => Some(ConnectError::IdRejected),
            3 => Some(ConnectError::ServerUnavailable),
            4 => Some(ConnectError::BadCredentials),
            5 => Some(ConnectError::NotAuthorized),
            6 => Some(ConnectError::RateLimited),
            _ => Some(ConnectError::ConnectionFailed),
        }
    }

    /// Error for a failed handshake given the broker's CONNACK return code.
    ///
    /// `0` (no CONNACK refusal seen) and codes outside the table mean the
    /// transport failed before the broker answered.
    pub fn from_refusal(return_code: u32) -> Self {
        i8::try_from(return_code)
            .ok()
            .and_then(Self::from_code)
            .unwrap_or(ConnectError::ConnectionFailed)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ConnectError::WrongProtocol => "The Server does not support the level of the MQTT protocol requested",
            ConnectError::IdRejected => "The Client identifier is correct UTF-8 but not allowed by the Server",
            ConnectError::ServerUnavailable => "The MQTT service is unavailable",
            ConnectError::BadCredentials => "The data in the user name or password is malformed",
            ConnectError::NotAuthorized => "Not authorized to connect",
            ConnectError::RateLimited => "Exceeded reconnect rate limit. Please try again later.",
            ConnectError::ConnectionFailed => "Connection failed",
        };
        f.write_str(reason)
    }
}

impl std::error::Error for ConnectError {}

/// MQTT session as seen by the orchestrator
pub trait Broker {
    /// Establish the session. Returns immediately once the broker accepted or refused.
    fn connect(&mut self) -> Result<(), ConnectError>;

    fn connected(&self) -> bool;

    fn disconnect(&mut self);

    /// `qos: None` leaves the client default (QoS 0)
    fn publish(&mut self, topic: &str, payload: &str, qos: Option<QoS>) -> bool;
}
