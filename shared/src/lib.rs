// Dozer shared core
// Everything a wake cycle needs that does not touch ESP-IDF directly:
// the RTC record, the connect/publish orchestration and the wire format.
// The firmware crate plugs the real radio, broker and RTC region in.

pub mod mqtt_sender;
pub mod payload;
pub mod radio;
pub mod rtc_memory;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use mqtt_sender::{MqttSender, Node};
pub use payload::{Reading, SignalCode};
pub use radio::{AccessPoint, Broker, ConnectError, QoS, Radio, StaticIp};
pub use rtc_memory::{RtcData, RtcErrorCode, RtcMemory, RtcValue, SleepRequest};
pub use settings::{ConnectFailurePolicy, ConnectionSettings, SenderSettings, WifiSettings};
