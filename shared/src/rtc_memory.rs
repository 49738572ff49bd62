// RTC Memory Module
// Integrity-checked record that survives deep sleep (battery-backed RTC slow memory)
// One fixed slot, last write wins. Validity is derived from the CRC on every load,
// never stored.

use std::time::Duration;

// Import CRC engine; the bitwise variant keeps the flash footprint at zero tables
use crc::{Crc, NoTable, CRC_32_MPEG_2};

// Import the region primitive the record is read from and written to
use embedded_storage::Storage;

use log::{debug, info, warn};
use serde::Serialize;

use crate::payload::Reading;
use crate::radio::{AccessPoint, Radio};

// Record layout (little-endian):
// [0..4] crc32 | [4] channel | [5..11] bssid | [11] last_error | [12..20] last_data
pub const RTC_RECORD_SIZE: usize = 20;
const CRC_LEN: usize = 4; // Leading bytes holding the stored CRC itself

/// Sleep length used when nothing else is configured (10 s)
pub const DEFAULT_SLEEP: Duration = Duration::from_micros(10_000_000);

/// Poly 0x04C11DB7, init 0xFFFFFFFF, MSB first, no final XOR
const RTC_CRC: Crc<u32, NoTable> = Crc::<u32, NoTable>::new(&CRC_32_MPEG_2);

/// CRC over `data`, as stored in the first four bytes of the record
pub fn calculate_crc32(data: &[u8]) -> u32 {
    RTC_CRC.checksum(data)
}

/// Connectivity failure recorded locally before going to sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum RtcErrorCode {
    #[default]
    None = 0,
    NoWifi,
    NoDeviceId,
    NoMqtt,
    SubscribeFailed,
    PublishFailed,
    Unknown,
}

impl From<u8> for RtcErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0 => RtcErrorCode::None,
            1 => RtcErrorCode::NoWifi,
            2 => RtcErrorCode::NoDeviceId,
            3 => RtcErrorCode::NoMqtt,
            4 => RtcErrorCode::SubscribeFailed,
            5 => RtcErrorCode::PublishFailed,
            _ => RtcErrorCode::Unknown,
        }
    }
}

/// On-slot representation of the last published value.
///
/// Every reading is narrowed or widened into this one 8-byte type, so the
/// record keeps a single fixed size whichever representation a build picks.
pub trait RtcValue: Copy + Default + PartialEq + std::fmt::Debug + Serialize {
    fn from_reading(reading: &Reading) -> Self;
    fn to_rtc_bytes(self) -> [u8; 8];
    fn from_rtc_bytes(bytes: [u8; 8]) -> Self;
}

macro_rules! impl_rtc_value {
    ($ty:ty, $convert:ident) => {
        impl RtcValue for $ty {
            fn from_reading(reading: &Reading) -> Self {
                reading.$convert()
            }

            fn to_rtc_bytes(self) -> [u8; 8] {
                self.to_le_bytes()
            }

            fn from_rtc_bytes(bytes: [u8; 8]) -> Self {
                <$ty>::from_le_bytes(bytes)
            }
        }
    };
}

impl_rtc_value!(u64, as_u64);
impl_rtc_value!(i64, as_i64);
impl_rtc_value!(f64, as_f64);

/// The record kept across sleep cycles
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RtcData<V = f64> {
    pub crc32: u32,               // Covers every byte after itself
    pub channel: u8,              // Channel of the last association
    pub bssid: [u8; 6],           // Access point of the last association
    pub last_error: RtcErrorCode, // Why the previous cycle went to sleep
    pub last_data: V,             // Last reading persisted with a publish
}

impl<V: RtcValue> RtcData<V> {
    pub fn access_point(&self) -> AccessPoint {
        AccessPoint::new(self.channel, self.bssid)
    }

    fn to_bytes(self) -> [u8; RTC_RECORD_SIZE] {
        let mut bytes = [0u8; RTC_RECORD_SIZE];
        bytes[0..4].copy_from_slice(&self.crc32.to_le_bytes());
        bytes[4] = self.channel;
        bytes[5..11].copy_from_slice(&self.bssid);
        bytes[11] = self.last_error as u8;
        bytes[12..20].copy_from_slice(&self.last_data.to_rtc_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; RTC_RECORD_SIZE]) -> Self {
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&bytes[0..4]);
        let mut bssid = [0u8; 6];
        bssid.copy_from_slice(&bytes[5..11]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[12..20]);

        Self {
            crc32: u32::from_le_bytes(crc),
            channel: bytes[4],
            bssid,
            last_error: RtcErrorCode::from(bytes[11]),
            last_data: V::from_rtc_bytes(value),
        }
    }
}

/// End of the wake cycle: the platform must enter deep sleep for `duration`.
///
/// Returned instead of sleeping inside the library; nothing in the cycle may
/// run after it is produced.
#[must_use = "the wake cycle is over, hand this to the platform sleep call"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepRequest {
    pub duration: Duration,
    pub error: RtcErrorCode,
}

impl SleepRequest {
    pub fn duration_us(&self) -> u64 {
        self.duration.as_micros() as u64
    }
}

/// The single RTC record of the device and the region it lives in
pub struct RtcMemory<S, V = f64> {
    region: S,
    data: RtcData<V>,
    is_valid: bool,
}

impl<S: Storage, V: RtcValue> RtcMemory<S, V> {
    /// Wrap the region. Nothing is read until `load`.
    pub fn new(region: S) -> Self {
        Self {
            region,
            data: RtcData::default(),
            is_valid: false,
        }
    }

    /// Read the record and check its CRC.
    ///
    /// On a failed read or a CRC mismatch the in-memory record is reset to
    /// zero and `is_valid` stays false.
    pub fn load(&mut self) {
        debug!("Reading RTC memory");
        self.is_valid = false;

        if self.region.capacity() < RTC_RECORD_SIZE {
            warn!(
                "RTC region too small: {} bytes (need {})",
                self.region.capacity(),
                RTC_RECORD_SIZE
            );
            self.data = RtcData::default();
            return;
        }

        let mut bytes = [0u8; RTC_RECORD_SIZE];
        if self.region.read(0, &mut bytes).is_err() {
            warn!("RTC memory read failed");
            self.data = RtcData::default();
            return;
        }

        let record = RtcData::from_bytes(&bytes);
        let crc = calculate_crc32(&bytes[CRC_LEN..]);

        if crc == record.crc32 {
            self.data = record;
            self.is_valid = true;
        } else {
            info!(
                "RTC memory not valid (stored crc {:08X}, computed {:08X})",
                record.crc32, crc
            );
            self.data = RtcData::default();
        }
    }

    /// Capture the current association, recompute the CRC and write the record
    pub fn save<R: Radio>(&mut self, radio: &R) -> bool {
        debug!("Saving to RTC memory");

        let ap = radio.access_point().unwrap_or_default();
        self.data.channel = ap.channel;
        self.data.bssid = ap.bssid;

        let mut bytes = self.data.to_bytes();
        self.data.crc32 = calculate_crc32(&bytes[CRC_LEN..]);
        bytes[..CRC_LEN].copy_from_slice(&self.data.crc32.to_le_bytes());

        match self.region.write(0, &bytes) {
            Ok(()) => true,
            Err(_) => {
                warn!("RTC memory write failed");
                false
            }
        }
    }

    /// Set the last value, then `save`
    pub fn save_with_data<R: Radio>(&mut self, radio: &R, value: V) -> bool {
        self.data.last_data = value;
        self.save(radio)
    }

    /// Record `error`, save best-effort and take the radio down.
    ///
    /// The returned request is the end of the wake cycle.
    pub fn go_deep_sleep<R: Radio>(
        &mut self,
        radio: &mut R,
        error: RtcErrorCode,
        duration: Duration,
    ) -> SleepRequest {
        info!("Going to sleep: {}us ({:?})", duration.as_micros(), error);

        self.data.last_error = error;
        if !self.save(radio) {
            warn!("Sleeping without a saved RTC record");
        }

        radio.disassociate();
        radio.sleep_radio();

        SleepRequest { duration, error }
    }

    /// Snapshot of the in-memory record, zeroed unless `is_valid`
    pub fn get_data(&self) -> RtcData<V> {
        self.data
    }

    /// The record, only when the last load passed the CRC check
    pub fn valid_data(&self) -> Option<RtcData<V>> {
        self.is_valid.then_some(self.data)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemRegion, MockRadio};

    const AP: AccessPoint = AccessPoint {
        channel: 6,
        bssid: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
    };

    fn associated_radio() -> MockRadio {
        let mut radio = MockRadio::default();
        radio.script_association(Some(0));
        radio.associate("net", "pass", None);
        assert!(radio.is_associated());
        radio.ap = AP;
        radio
    }

    #[test]
    fn crc_matches_mpeg2_check_value() {
        assert_eq!(calculate_crc32(b"123456789"), 0x0376_E6E7);
        assert_eq!(calculate_crc32(b"123456789"), calculate_crc32(b"123456789"));
    }

    #[test]
    fn crc_detects_every_single_bit_flip() {
        let data = *b"sensor node rtc!";
        let reference = calculate_crc32(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data;
                flipped[byte] ^= 1 << bit;
                assert_ne!(calculate_crc32(&flipped), reference, "byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn first_boot_zeroed_region_is_invalid() {
        let mut rtc: RtcMemory<_, f64> = RtcMemory::new(MemRegion::new(RTC_RECORD_SIZE));
        rtc.load();
        assert!(!rtc.is_valid());
        assert!(rtc.valid_data().is_none());
    }

    #[test]
    fn failed_or_short_read_is_invalid() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        let mut rtc: RtcMemory<_, f64> = RtcMemory::new(region.clone());
        assert!(rtc.save(&associated_radio()));

        region.set_fail_reads(true);
        rtc.load();
        assert!(!rtc.is_valid());

        let mut short: RtcMemory<_, f64> = RtcMemory::new(MemRegion::new(RTC_RECORD_SIZE - 4));
        short.load();
        assert!(!short.is_valid());
    }

    #[test]
    fn save_then_load_round_trips() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        let mut rtc: RtcMemory<_, f64> = RtcMemory::new(region.clone());
        assert!(rtc.save_with_data(&associated_radio(), 21.75));
        let saved = rtc.get_data();

        let mut reloaded: RtcMemory<_, f64> = RtcMemory::new(region);
        reloaded.load();
        assert!(reloaded.is_valid());
        assert_eq!(reloaded.get_data(), saved);
        assert_eq!(reloaded.get_data().access_point(), AP);
        assert_eq!(reloaded.get_data().last_data, 21.75);
    }

    #[test]
    fn any_bit_flip_in_saved_region_invalidates() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        let mut rtc: RtcMemory<_, u64> = RtcMemory::new(region.clone());
        assert!(rtc.save_with_data(&associated_radio(), 1234));
        let pristine = region.bytes();

        for byte in 0..RTC_RECORD_SIZE {
            for bit in 0..8 {
                let mut corrupted = pristine.clone();
                corrupted[byte] ^= 1 << bit;
                region.set_bytes(&corrupted);

                let mut reloaded: RtcMemory<_, u64> = RtcMemory::new(region.clone());
                reloaded.load();
                assert!(!reloaded.is_valid(), "byte {} bit {}", byte, bit);
                assert_eq!(reloaded.get_data(), RtcData::default());
            }
        }
    }

    #[test]
    fn save_while_not_associated_stores_empty_hint() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        let mut rtc: RtcMemory<_, i64> = RtcMemory::new(region.clone());
        assert!(rtc.save(&MockRadio::default()));

        let mut reloaded: RtcMemory<_, i64> = RtcMemory::new(region);
        reloaded.load();
        assert!(reloaded.is_valid());
        assert!(reloaded.get_data().access_point().is_unset());
    }

    #[test]
    fn write_failure_is_reported() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        region.set_fail_writes(true);
        let mut rtc: RtcMemory<_, f64> = RtcMemory::new(region);
        assert!(!rtc.save(&associated_radio()));
    }

    #[test]
    fn go_deep_sleep_records_error_and_shuts_radio() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        let mut rtc: RtcMemory<_, f64> = RtcMemory::new(region.clone());
        let mut radio = associated_radio();

        let request = rtc.go_deep_sleep(&mut radio, RtcErrorCode::NoMqtt, DEFAULT_SLEEP);
        assert_eq!(request.error, RtcErrorCode::NoMqtt);
        assert_eq!(request.duration_us(), 10_000_000);
        assert_eq!(radio.disassociations, 1);
        assert_eq!(radio.sleeps, 1);

        let mut reloaded: RtcMemory<_, f64> = RtcMemory::new(region);
        reloaded.load();
        assert!(reloaded.is_valid());
        assert_eq!(reloaded.get_data().last_error, RtcErrorCode::NoMqtt);
        assert_eq!(reloaded.get_data().access_point(), AP);
    }

    #[test]
    fn go_deep_sleep_still_sleeps_when_save_fails() {
        let region = MemRegion::new(RTC_RECORD_SIZE);
        region.set_fail_writes(true);
        let mut rtc: RtcMemory<_, f64> = RtcMemory::new(region);
        let mut radio = associated_radio();

        let request = rtc.go_deep_sleep(&mut radio, RtcErrorCode::PublishFailed, DEFAULT_SLEEP);
        assert_eq!(request.error, RtcErrorCode::PublishFailed);
        assert_eq!(radio.sleeps, 1);
    }

    #[test]
    fn unknown_error_byte_decodes_as_unknown() {
        assert_eq!(RtcErrorCode::from(5), RtcErrorCode::PublishFailed);
        assert_eq!(RtcErrorCode::from(42), RtcErrorCode::Unknown);
    }
}
