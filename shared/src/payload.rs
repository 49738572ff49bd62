// Payload Module
// Text wire format for readings and diagnostic signals, plus feed topic naming

/// Feeds starting with this segment are already fully qualified below the user
pub const RESERVED_FEED_PREFIX: &str = "/feeds/";

/// A single reading, tagged with its wire type.
///
/// The encoded form is `{value}{tag}_`, e.g. `23.50f_` or `1024&17u16_`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    U16Pair(u16, u16),
    U32(u32),
    I32(i32),
    I64(i64),
    U64(u64),
    F32 { value: f32, decimals: u8 },
    F64 { value: f64, decimals: u16 },
}

impl Reading {
    /// Short suffix telling the receiver how to parse the value
    pub fn type_tag(&self) -> &'static str {
        match self {
            Reading::U16Pair(..) => "u16",
            Reading::U32(_) => "u32",
            Reading::I32(_) => "i",
            Reading::I64(_) => "ll",
            Reading::U64(_) => "u64",
            Reading::F32 { .. } => "f",
            Reading::F64 { .. } => "d",
        }
    }

    pub fn encode(&self) -> String {
        let value = match *self {
            Reading::U16Pair(first, second) => format!("{}&{}", first, second),
            Reading::U32(v) => v.to_string(),
            Reading::I32(v) => v.to_string(),
            Reading::I64(v) => v.to_string(),
            Reading::U64(v) => v.to_string(),
            Reading::F32 { value, decimals } => format!("{:.*}", decimals as usize, value),
            Reading::F64 { value, decimals } => format!("{:.*}", decimals as usize, value),
        };
        format!("{}{}_", value, self.type_tag())
    }

    // Narrowing/widening into the RTC slot representation. Plain `as` casts:
    // floats truncate toward zero and saturate, signed values wrap into u64.

    pub fn as_u64(&self) -> u64 {
        match *self {
            Reading::U16Pair(first, second) => pack_u16_pair(first, second) as u64,
            Reading::U32(v) => v as u64,
            Reading::I32(v) => v as u64,
            Reading::I64(v) => v as u64,
            Reading::U64(v) => v,
            Reading::F32 { value, .. } => value as u64,
            Reading::F64 { value, .. } => value as u64,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Reading::U16Pair(first, second) => pack_u16_pair(first, second) as i64,
            Reading::U32(v) => v as i64,
            Reading::I32(v) => v as i64,
            Reading::I64(v) => v,
            Reading::U64(v) => v as i64,
            Reading::F32 { value, .. } => value as i64,
            Reading::F64 { value, .. } => value as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Reading::U16Pair(first, second) => pack_u16_pair(first, second) as f64,
            Reading::U32(v) => v as f64,
            Reading::I32(v) => v as f64,
            Reading::I64(v) => v as f64,
            Reading::U64(v) => v as f64,
            Reading::F32 { value, .. } => value as f64,
            Reading::F64 { value, .. } => value,
        }
    }
}

/// Two 16-bit readings in one 32-bit slot, first value in the high half
pub fn pack_u16_pair(first: u16, second: u16) -> u32 {
    ((first as u32) << 16) | second as u32
}

/// Message-level problems reported to the broker on the diagnostics feed.
///
/// Separate from `RtcErrorCode`, which records connectivity failures locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignalCode {
    NoError = 0,
    BadPayload,     // Incorrect data in payload
    BadPayloadSize, // Incorrect number of variables
    BadDeviceId,    // Command addressed to another device
    ReadingError,   // Sensor could not be read
    UnknownError,
}

/// `{device_id}:{msg}` with `:{additional}` appended when present
pub fn data_message(device_id: u8, msg: &str, additional: &str) -> String {
    let mut sent = format!("{}:{}", device_id, msg);
    if !additional.is_empty() {
        sent.push(':');
        sent.push_str(additional);
    }
    sent
}

/// `{device_id}/{signal code as integer}`
pub fn error_message(device_id: u8, code: SignalCode) -> String {
    format!("{}/{}", device_id, code as u8)
}

/// Full topic for a feed owned by `user`
pub fn feed_topic(user: &str, feed: &str) -> String {
    if feed.starts_with(RESERVED_FEED_PREFIX) {
        return format!("{}{}", user, feed);
    }
    format!("{}/{}", user, feed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_every_wire_type_with_its_tag() {
        assert_eq!(Reading::U16Pair(1024, 17).encode(), "1024&17u16_");
        assert_eq!(Reading::U32(4_000_000_000).encode(), "4000000000u32_");
        assert_eq!(Reading::I32(-12).encode(), "-12i_");
        assert_eq!(Reading::I64(-9_000_000_000).encode(), "-9000000000ll_");
        assert_eq!(Reading::U64(u64::MAX).encode(), "18446744073709551615u64_");
        assert_eq!(Reading::F64 { value: 1.23456, decimals: 3 }.encode(), "1.235d_");
    }

    #[test]
    fn float_reading_honors_decimal_count() {
        let reading = Reading::F32 { value: 23.5, decimals: 2 };
        assert_eq!(reading.encode(), "23.50f_");
        assert!(reading.encode().ends_with("f_"));
    }

    #[test]
    fn conversions_truncate_like_casts() {
        let reading = Reading::F32 { value: 23.5, decimals: 2 };
        assert_eq!(reading.as_u64(), 23);
        assert_eq!(reading.as_i64(), 23);
        assert_eq!(reading.as_f64(), 23.5);

        let negative = Reading::F64 { value: -4.9, decimals: 1 };
        assert_eq!(negative.as_i64(), -4);
        assert_eq!(negative.as_u64(), 0);

        assert_eq!(Reading::I32(-1).as_u64(), u64::MAX);
        assert_eq!(Reading::U16Pair(1, 2).as_u64(), 0x0001_0002);
    }

    #[test]
    fn data_message_appends_additional_only_when_present() {
        assert_eq!(data_message(7, "23.50f_", ""), "7:23.50f_");
        assert_eq!(data_message(7, "23.50f_", "calib"), "7:23.50f_:calib");
    }

    #[test]
    fn error_message_uses_numeric_code() {
        assert_eq!(error_message(3, SignalCode::ReadingError), "3/4");
        assert_eq!(error_message(3, SignalCode::NoError), "3/0");
    }

    #[test]
    fn feed_topic_respects_reserved_prefix() {
        assert_eq!(feed_topic("alice", "battery"), "alice/battery");
        assert_eq!(feed_topic("alice", "/feeds/errors"), "alice/feeds/errors");
    }
}
