use serde::{Deserialize, Serialize};

/// Per-device traffic and error counters.
///
/// Counters only grow; they disappear with the device entry on detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Statistics {
    pub bytes_sent: u32,
    pub bytes_received: u32,
    pub timeouts: u16,
    pub crc_errors: u16,
    pub other_errors: u16,
    /// Framing bytes added to `bytes_sent` per transaction (SPI command and
    /// address phases).
    pub framing_correction: u8,
}

/// Payload of a `Stats` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatsReport {
    pub statistics: Statistics,
    /// Family specific identity: 1-Wire ROM code (natural order, big
    /// endian), I2C address or SPI chip-select pin.
    pub identity: u64,
}
