use serde::{Deserialize, Serialize};

/// Flat error taxonomy reported in the status field of every reply.
///
/// Success is `Ok(())`; the numeric codes keep the values used on the
/// original wire where `0` meant success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BusError {
    Timeout = 2,
    BadArguments = 3,
    Unknown = 4,
    NoMemory = 5,
    NoMoreBuses = 6,
    PinInUse = 7,
    DeviceExists = 8,
    DeviceNotFound = 9,
    DeviceNotAcknowledged = 10,
    /// Command not implemented for this bus family.
    NotUsed = 11,
    /// Received data failed its checksum (1-Wire and I2C only).
    BadCrc = 12,
}

impl BusError {
    pub const fn code(&self) -> u8 {
        *self as u8
    }
}

/// Numeric status for a reply; `0` on success.
pub fn status_code(status: &Result<(), BusError>) -> u8 {
    match status {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::Timeout => write!(f, "Bus transaction timed out"),
            BusError::BadArguments => write!(f, "Bad arguments"),
            BusError::Unknown => write!(f, "Unknown bus error"),
            BusError::NoMemory => write!(f, "Out of memory"),
            BusError::NoMoreBuses => write!(f, "No free bus controller"),
            BusError::PinInUse => write!(f, "Pin already reserved"),
            BusError::DeviceExists => write!(f, "Device already attached"),
            BusError::DeviceNotFound => write!(f, "Device not found"),
            BusError::DeviceNotAcknowledged => {
                write!(f, "Device did not acknowledge")
            }
            BusError::NotUsed => {
                write!(f, "Command not supported on this bus")
            }
            BusError::BadCrc => write!(f, "CRC check failed"),
        }
    }
}
