// RTC Slow Memory Region
// The only memory that keeps its content through deep sleep; lost when the
// battery is removed. Exposed through embedded-storage so the shared RTC
// store never touches the hardware directly.

use std::ptr::addr_of_mut;
use std::sync::atomic::{AtomicBool, Ordering};

// Import the region traits the shared RtcMemory is generic over
use embedded_storage::{ReadStorage, Storage};

use dozer_shared::rtc_memory::RTC_RECORD_SIZE;

/// Bytes reserved in RTC slow memory for the record
pub const RTC_REGION_SIZE: usize = 32;

const _: () = assert!(RTC_RECORD_SIZE <= RTC_REGION_SIZE);

// Zeroed at power-on, retained through deep sleep
#[link_section = ".rtc.data"]
static mut RTC_REGION: [u8; RTC_REGION_SIZE] = [0; RTC_REGION_SIZE];

static TAKEN: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub enum RtcRegionError {
    OutOfBounds { offset: u32, len: usize },
}

/// Owner of the RTC slow memory slot. At most one exists per boot.
pub struct RtcSlowMemory {
    _private: (),
}

impl RtcSlowMemory {
    /// Hand out the region once; later calls get `None`
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { _private: () })
    }

    fn range(offset: u32, len: usize) -> Result<std::ops::Range<usize>, RtcRegionError> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= RTC_REGION_SIZE => Ok(start..end),
            _ => Err(RtcRegionError::OutOfBounds { offset, len }),
        }
    }
}

impl ReadStorage for RtcSlowMemory {
    type Error = RtcRegionError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len())?;
        // SAFETY: `take` guarantees a single owner and the firmware is single-threaded
        let region = unsafe { &*addr_of_mut!(RTC_REGION) };
        bytes.copy_from_slice(&region[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        RTC_REGION_SIZE
    }
}

impl Storage for RtcSlowMemory {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len())?;
        // SAFETY: as in `read`; `&mut self` makes this the only live access
        let region = unsafe { &mut *addr_of_mut!(RTC_REGION) };
        region[range].copy_from_slice(bytes);
        Ok(())
    }
}
